use balance_core::ServiceConfig;

/// How the notification publish and the direct reply relate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum DeliveryMode {
    /// Publish first; a publish failure replaces the reply with an error.
    #[default]
    Coupled,
    /// Reply first; the publish follows and its failure is only logged.
    Independent,
}

/// Settings for the balance service and its single endpoint.
///
/// Supplied by the bootstrap routine; read-only once the service starts.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Service name, used as the registration identity.
    pub name: String,
    /// Semantic version reported in service info.
    pub version: String,
    /// Human-readable service description.
    pub description: String,
    /// Endpoint group; the endpoint subject is `<group>.<endpoint>`.
    pub group: String,
    /// Endpoint name within the group.
    pub endpoint: String,
    /// Human-readable endpoint description, stored as endpoint metadata.
    pub endpoint_description: String,
    /// Payload format label, stored as endpoint metadata.
    pub payload_format: String,
    /// Table holding customer balances.
    pub table_name: String,
    /// Upper bound for a request when the requester supplies no deadline.
    pub default_request_timeout_ms: u64,
    /// Maximum number of requests processed at once before shedding load.
    pub max_concurrent_requests: u32,
    pub delivery_mode: DeliveryMode,
}

impl ServiceSettings {
    #[must_use]
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig::new(&self.name, &self.version, &self.description)
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "customer".to_string(),
            version: "0.0.1".to_string(),
            description: "customer service".to_string(),
            group: "customer".to_string(),
            endpoint: "balance".to_string(),
            endpoint_description: "Retrieve a customer balance".to_string(),
            payload_format: "application/json".to_string(),
            table_name: "balances".to_string(),
            default_request_timeout_ms: 30_000,
            max_concurrent_requests: 1000,
            delivery_mode: DeliveryMode::Coupled,
        }
    }
}
