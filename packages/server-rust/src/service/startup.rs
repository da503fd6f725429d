//! Service bootstrap: registration, endpoint wiring, and shutdown.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use balance_core::{EndpointStats, ServiceInfo};
use tracing::{info, warn};

use super::config::ServiceSettings;
use super::dispatch::EndpointDispatcher;
use super::domain::BalanceHandler;
use super::middleware::build_operation_pipeline;
use super::registry::{MicroService, RegistrationError, ServiceContext};
use super::router::EndpointRouter;
use crate::bus::MessageBus;
use crate::shutdown::ShutdownController;
use crate::traits::BalanceStore;

/// Register the customer service on `bus` and start serving balance
/// queries against `store`.
///
/// On return the endpoint is subscribed and accepting requests.
///
/// # Errors
///
/// Returns [`RegistrationError`] if the settings are invalid or the bus
/// refuses the registration. Nothing is left subscribed in that case.
pub async fn start_service(
    bus: Arc<dyn MessageBus>,
    store: Arc<dyn BalanceStore>,
    settings: ServiceSettings,
) -> Result<RunningService, RegistrationError> {
    if settings.table_name.is_empty() {
        return Err(RegistrationError::MissingTable);
    }

    let service = MicroService::add_service(Arc::clone(&bus), settings.service_config())?;
    let context = Arc::new(ServiceContext {
        bus: Arc::clone(&bus),
        store,
        table_name: settings.table_name.clone(),
        service_id: service.id().to_string(),
        delivery_mode: settings.delivery_mode,
    });

    let mut router = EndpointRouter::new();
    router.register(&settings.endpoint, BalanceHandler::new(Arc::clone(&context)));
    let pipeline = build_operation_pipeline(router, &settings);

    let shutdown = Arc::new(ShutdownController::new());
    let metadata = BTreeMap::from([
        (
            "description".to_string(),
            settings.endpoint_description.clone(),
        ),
        ("format".to_string(), settings.payload_format.clone()),
    ]);
    let default_timeout = Duration::from_millis(settings.default_request_timeout_ms);

    let endpoint = service
        .add_group(&settings.group)
        .add_endpoint(&settings.endpoint, metadata, |stats| {
            Arc::new(EndpointDispatcher::new(
                &settings.endpoint,
                pipeline,
                Arc::clone(&bus),
                Arc::clone(&shutdown),
                stats,
                default_timeout,
            ))
        })
        .await?;

    shutdown.set_ready();
    info!(
        service_id = %context.service_id,
        subject = %endpoint.subject,
        table = %context.table_name,
        delivery_mode = ?context.delivery_mode,
        "balance service ready"
    );

    Ok(RunningService {
        service,
        context,
        shutdown,
        endpoint_subject: endpoint.subject,
    })
}

/// Handle to a started service.
pub struct RunningService {
    service: MicroService,
    context: Arc<ServiceContext>,
    shutdown: Arc<ShutdownController>,
    endpoint_subject: String,
}

impl RunningService {
    #[must_use]
    pub fn service_id(&self) -> &str {
        self.service.id()
    }

    #[must_use]
    pub fn info(&self) -> ServiceInfo {
        self.service.info()
    }

    #[must_use]
    pub fn stats(&self) -> Vec<EndpointStats> {
        self.service.stats()
    }

    #[must_use]
    pub fn shutdown_controller(&self) -> &Arc<ShutdownController> {
        &self.shutdown
    }

    /// Subject the balance endpoint listens on.
    #[must_use]
    pub fn endpoint_subject(&self) -> &str {
        &self.endpoint_subject
    }

    /// Stop admitting requests, wait up to `drain_timeout` for in-flight
    /// ones, then unsubscribe from the bus.
    ///
    /// Returns whether every in-flight request finished in time.
    pub async fn shutdown(self, drain_timeout: Duration) -> bool {
        self.shutdown.trigger_shutdown();
        let drained = self.shutdown.wait_for_drain(drain_timeout).await;
        if !drained {
            warn!(
                service_id = %self.context.service_id,
                in_flight = self.shutdown.in_flight_count(),
                "drain timed out"
            );
        }
        if let Err(e) = self.service.stop().await {
            warn!(service_id = %self.context.service_id, error = %e, "endpoint removal failed");
        }
        drained
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
