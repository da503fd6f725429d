//! Balance Core — wire messages, error signals, subject naming, and service metadata.

pub mod messages;
pub mod service_info;
pub mod signal;
pub mod subject;

pub use messages::{BalanceRequest, BalanceResponse, DecodeError};
pub use service_info::{
    ConfigError, EndpointConfig, EndpointInfo, EndpointStats, ServiceConfig, ServiceInfo,
};
pub use signal::ErrorSignal;
pub use subject::{endpoint_subject, notification_subject, subject_matches};
