//! Bridges bus requests into the endpoint pipeline.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tower::ServiceExt;
use tracing::{debug, warn};

use super::middleware::OperationPipeline;
use super::operation::{Operation, OperationContext, OperationError};
use super::registry::EndpointStatsTracker;
use crate::bus::{BusError, MessageBus, Request, RequestHandler};
use crate::shutdown::ShutdownController;

/// Request handler registered on the bus for one endpoint.
///
/// Turns each inbound [`Request`] into an [`Operation`], drives it through
/// the pipeline, and sends exactly one reply: the response body on success
/// or the error signal on failure.
pub struct EndpointDispatcher {
    endpoint: String,
    pipeline: OperationPipeline,
    bus: Arc<dyn MessageBus>,
    shutdown: Arc<ShutdownController>,
    stats: Arc<EndpointStatsTracker>,
    default_timeout: Duration,
    next_call_id: AtomicU64,
}

impl EndpointDispatcher {
    #[must_use]
    pub fn new(
        endpoint: impl Into<String>,
        pipeline: OperationPipeline,
        bus: Arc<dyn MessageBus>,
        shutdown: Arc<ShutdownController>,
        stats: Arc<EndpointStatsTracker>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            pipeline,
            bus,
            shutdown,
            stats,
            default_timeout,
            next_call_id: AtomicU64::new(1),
        }
    }

    fn operation_for(&self, request: &Request) -> Operation {
        let call = request.context().with_timeout(self.default_timeout);
        let timeout = call.remaining().unwrap_or(self.default_timeout);
        let call_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        let call_id = self.next_call_id.fetch_add(1, Ordering::Relaxed);
        Operation::new(
            OperationContext::new(call_id, &self.endpoint, call, call_timeout_ms),
            request.data().clone(),
        )
    }

    async fn publish_deferred(&self, subject: &str, payload: bytes::Bytes) {
        if let Err(e) = self.bus.publish(subject, payload).await {
            metrics::counter!("balance_deferred_publish_failures_total").increment(1);
            warn!(subject, error = %e, "deferred notification publish failed");
        }
    }
}

#[async_trait]
impl RequestHandler for EndpointDispatcher {
    async fn handle(&self, request: Request) {
        let _guard = self.shutdown.in_flight_guard();
        let started = Instant::now();

        let outcome = if self.shutdown.is_accepting() {
            let op = self.operation_for(&request);
            debug!(call_id = op.ctx().call_id, subject = request.subject(), "dispatching");
            self.pipeline.clone().oneshot(op).await
        } else {
            Err(OperationError::ShuttingDown)
        };

        let (sent, error) = match outcome {
            Ok(response) => {
                let sent = request.respond(response.payload.clone()).await;
                if let Some(subject) = response.deferred_publish {
                    self.publish_deferred(&subject, response.payload).await;
                }
                (sent, None)
            }
            Err(e) => {
                let signal = e.to_signal();
                let text = signal.to_string();
                (request.error(signal).await, Some(text))
            }
        };

        self.stats.record(started.elapsed(), error);
        if let Err(e) = sent {
            match e {
                BusError::ReplyDropped => {
                    debug!(endpoint = %self.endpoint, "requester gone before reply");
                }
                other => warn!(endpoint = %self.endpoint, error = %other, "reply failed"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::bus::{MemoryBus, Reply};
    use crate::context::CallContext;
    use crate::service::config::ServiceSettings;
    use crate::service::middleware::build_operation_pipeline;
    use crate::service::middleware::test_support::DelayedService;
    use crate::service::router::EndpointRouter;

    fn dispatcher(
        bus: Arc<MemoryBus>,
        shutdown: Arc<ShutdownController>,
        delay_ms: u64,
    ) -> (EndpointDispatcher, Arc<EndpointStatsTracker>) {
        let mut router = EndpointRouter::new();
        router.register("balance", DelayedService { delay_ms });
        let pipeline = build_operation_pipeline(router, &ServiceSettings::default());
        let stats = Arc::new(EndpointStatsTracker::new("balance", "customer.balance"));
        let dispatcher = EndpointDispatcher::new(
            "balance",
            pipeline,
            bus,
            shutdown,
            Arc::clone(&stats),
            Duration::from_millis(100),
        );
        (dispatcher, stats)
    }

    fn ready_controller() -> Arc<ShutdownController> {
        let controller = Arc::new(ShutdownController::new());
        controller.set_ready();
        controller
    }

    #[tokio::test]
    async fn replies_with_pipeline_response() {
        let bus = Arc::new(MemoryBus::new());
        let (dispatcher, stats) = dispatcher(bus, ready_controller(), 0);

        let (request, rx) =
            Request::channel("customer.balance", Bytes::new(), CallContext::background());
        dispatcher.handle(request).await;

        assert_eq!(rx.await.unwrap(), Reply::Data(Bytes::new()));
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.num_requests, 1);
        assert_eq!(snapshot.num_errors, 0);
    }

    #[tokio::test]
    async fn rejects_while_not_accepting() {
        let bus = Arc::new(MemoryBus::new());
        let controller = Arc::new(ShutdownController::new());
        let (dispatcher, stats) = dispatcher(bus, Arc::clone(&controller), 0);

        let (request, rx) =
            Request::channel("customer.balance", Bytes::new(), CallContext::background());
        dispatcher.handle(request).await;

        let reply = rx.await.unwrap();
        let signal = reply.error().unwrap();
        assert_eq!(signal.code, "500");
        assert_eq!(signal.description, "INTERNAL_ERROR - shutting down");
        assert_eq!(stats.snapshot().num_errors, 1);
        assert_eq!(controller.in_flight_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn default_timeout_bounds_slow_handlers() {
        let bus = Arc::new(MemoryBus::new());
        let (dispatcher, stats) = dispatcher(bus, ready_controller(), 10_000);

        let (request, rx) =
            Request::channel("customer.balance", Bytes::new(), CallContext::background());
        dispatcher.handle(request).await;

        let reply = rx.await.unwrap();
        assert_eq!(reply.error().unwrap().description, "INTERNAL_ERROR - timeout");
        assert!(stats.snapshot().last_error.unwrap().contains("timeout"));
    }

    #[tokio::test]
    async fn requester_gone_is_tolerated() {
        let bus = Arc::new(MemoryBus::new());
        let controller = ready_controller();
        let (dispatcher, stats) = dispatcher(bus, Arc::clone(&controller), 0);

        let (request, rx) =
            Request::channel("customer.balance", Bytes::new(), CallContext::background());
        drop(rx);
        dispatcher.handle(request).await;

        assert_eq!(stats.snapshot().num_requests, 1);
        assert_eq!(controller.in_flight_count(), 0);
    }
}
