use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use balance_core::subject::DEFAULT_QUEUE_GROUP;
use balance_core::{
    endpoint_subject, ConfigError, EndpointConfig, EndpointInfo, EndpointStats, ServiceConfig,
    ServiceInfo,
};
use parking_lot::{Mutex, RwLock};
use tracing::info;

use super::config::DeliveryMode;
use crate::bus::{BusError, MessageBus, RequestHandler};
use crate::traits::BalanceStore;

// ---------------------------------------------------------------------------
// ServiceContext
// ---------------------------------------------------------------------------

/// Immutable state shared by every invocation of the balance handler.
///
/// Built once after registration assigns the service id; never mutated.
/// Independent instances can coexist, each bound to its own endpoint.
pub struct ServiceContext {
    pub bus: Arc<dyn MessageBus>,
    pub store: Arc<dyn BalanceStore>,
    pub table_name: String,
    pub service_id: String,
    pub delivery_mode: DeliveryMode,
}

impl std::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext")
            .field("table_name", &self.table_name)
            .field("service_id", &self.service_id)
            .field("delivery_mode", &self.delivery_mode)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// RegistrationError
// ---------------------------------------------------------------------------

/// Startup failures. Never retried internally.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("table name must not be empty")]
    MissingTable,
    #[error("endpoint {subject:?} is already registered on this service")]
    DuplicateEndpoint { subject: String },
    #[error("bus rejected endpoint registration: {0}")]
    Bus(#[from] BusError),
}

// ---------------------------------------------------------------------------
// EndpointStatsTracker
// ---------------------------------------------------------------------------

/// Lock-free request counters for one endpoint.
#[derive(Debug)]
pub struct EndpointStatsTracker {
    name: String,
    subject: String,
    num_requests: AtomicU64,
    num_errors: AtomicU64,
    processing_time_us: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl EndpointStatsTracker {
    #[must_use]
    pub fn new(name: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subject: subject.into(),
            num_requests: AtomicU64::new(0),
            num_errors: AtomicU64::new(0),
            processing_time_us: AtomicU64::new(0),
            last_error: Mutex::new(None),
        }
    }

    /// Record one finished request. `error` is the reported error, if any.
    pub fn record(&self, elapsed: Duration, error: Option<String>) {
        self.num_requests.fetch_add(1, Ordering::Relaxed);
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.processing_time_us.fetch_add(micros, Ordering::Relaxed);
        if let Some(error) = error {
            self.num_errors.fetch_add(1, Ordering::Relaxed);
            *self.last_error.lock() = Some(error);
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> EndpointStats {
        let num_requests = self.num_requests.load(Ordering::Relaxed);
        let processing_time_us = self.processing_time_us.load(Ordering::Relaxed);
        EndpointStats {
            name: self.name.clone(),
            subject: self.subject.clone(),
            num_requests,
            num_errors: self.num_errors.load(Ordering::Relaxed),
            last_error: self.last_error.lock().clone(),
            processing_time_us,
            average_processing_time_us: processing_time_us.checked_div(num_requests).unwrap_or(0),
        }
    }
}

// ---------------------------------------------------------------------------
// MicroService
// ---------------------------------------------------------------------------

struct RegisteredEndpoint {
    info: EndpointInfo,
    stats: Arc<EndpointStatsTracker>,
}

/// A named, versioned service registered on the bus.
///
/// Endpoints are added under groups; each one is subscribed on the bus at
/// `<group>.<endpoint>` in the shared queue group and gets its own stats.
pub struct MicroService {
    id: String,
    config: ServiceConfig,
    bus: Arc<dyn MessageBus>,
    endpoints: RwLock<Vec<RegisteredEndpoint>>,
}

impl MicroService {
    /// Validate `config` and assign a fresh service id.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Config`] if the name or version is invalid.
    pub fn add_service(
        bus: Arc<dyn MessageBus>,
        config: ServiceConfig,
    ) -> Result<Self, RegistrationError> {
        config.validate()?;
        let id = uuid::Uuid::new_v4().simple().to_string();
        info!(
            service = %config.name,
            version = %config.version,
            service_id = %id,
            "service created"
        );
        Ok(Self {
            id,
            config,
            bus,
            endpoints: RwLock::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Scope for adding endpoints under `name`.
    #[must_use]
    pub fn add_group<'a>(&'a self, name: &'a str) -> ServiceGroup<'a> {
        ServiceGroup {
            service: self,
            name,
        }
    }

    /// Register one endpoint and subscribe it on the bus.
    ///
    /// `make_handler` receives the endpoint's stats tracker so the handler
    /// can record each request it serves.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint config is invalid, the subject is
    /// already registered on this service, or the bus refuses it.
    pub async fn add_endpoint<F>(
        &self,
        endpoint: EndpointConfig,
        make_handler: F,
    ) -> Result<EndpointInfo, RegistrationError>
    where
        F: FnOnce(Arc<EndpointStatsTracker>) -> Arc<dyn RequestHandler>,
    {
        endpoint.validate()?;
        let subject = endpoint_subject(endpoint.group.as_deref(), &endpoint.name);
        if self
            .endpoints
            .read()
            .iter()
            .any(|registered| registered.info.subject == subject)
        {
            return Err(RegistrationError::DuplicateEndpoint { subject });
        }

        let stats = Arc::new(EndpointStatsTracker::new(&endpoint.name, &subject));
        let handler = make_handler(Arc::clone(&stats));
        self.bus
            .add_endpoint(&subject, DEFAULT_QUEUE_GROUP, handler)
            .await?;

        let info = EndpointInfo {
            name: endpoint.name,
            subject,
            queue_group: DEFAULT_QUEUE_GROUP.to_string(),
            metadata: endpoint.metadata,
        };
        info!(service_id = %self.id, subject = %info.subject, "endpoint added");
        self.endpoints.write().push(RegisteredEndpoint {
            info: info.clone(),
            stats,
        });
        Ok(info)
    }

    /// Introspection snapshot of the service and its endpoints.
    #[must_use]
    pub fn info(&self) -> ServiceInfo {
        ServiceInfo {
            id: self.id.clone(),
            name: self.config.name.clone(),
            version: self.config.version.clone(),
            description: self.config.description.clone(),
            metadata: self.config.metadata.clone(),
            endpoints: self
                .endpoints
                .read()
                .iter()
                .map(|registered| registered.info.clone())
                .collect(),
        }
    }

    /// Per-endpoint request counters, in registration order.
    #[must_use]
    pub fn stats(&self) -> Vec<EndpointStats> {
        self.endpoints
            .read()
            .iter()
            .map(|registered| registered.stats.snapshot())
            .collect()
    }

    /// Unsubscribe every endpoint from the bus.
    ///
    /// # Errors
    ///
    /// Returns the first bus error; remaining endpoints are still removed.
    pub async fn stop(&self) -> Result<(), BusError> {
        let subjects: Vec<String> = self
            .endpoints
            .read()
            .iter()
            .map(|registered| registered.info.subject.clone())
            .collect();

        let mut first_error = None;
        for subject in subjects {
            if let Err(e) = self.bus.remove_endpoint(&subject, DEFAULT_QUEUE_GROUP).await {
                first_error.get_or_insert(e);
            }
        }
        info!(service_id = %self.id, "service stopped");
        first_error.map_or(Ok(()), Err)
    }
}

/// Endpoints registered through a group share its subject prefix.
pub struct ServiceGroup<'a> {
    service: &'a MicroService,
    name: &'a str,
}

impl ServiceGroup<'_> {
    /// Register `name` under this group with descriptive `metadata`.
    ///
    /// # Errors
    ///
    /// See [`MicroService::add_endpoint`].
    pub async fn add_endpoint<F>(
        &self,
        name: &str,
        metadata: BTreeMap<String, String>,
        make_handler: F,
    ) -> Result<EndpointInfo, RegistrationError>
    where
        F: FnOnce(Arc<EndpointStatsTracker>) -> Arc<dyn RequestHandler>,
    {
        let mut endpoint = EndpointConfig::new(Some(self.name), name);
        endpoint.metadata = metadata;
        self.service.add_endpoint(endpoint, make_handler).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
