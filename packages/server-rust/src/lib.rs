//! Balance Server — customer balance lookups served over a message bus.

pub mod bus;
pub mod context;
pub mod service;
pub mod shutdown;
pub mod storage;
pub mod traits;

pub use bus::{BusError, MemoryBus, MessageBus, Reply, Request, RequestHandler};
pub use context::CallContext;
pub use service::{start_service, DeliveryMode, RunningService, ServiceSettings};
pub use traits::{BalanceStore, LookupError};
