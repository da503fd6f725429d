//! Pipeline composition: combines all middleware layers into a single service stack.

use tower::util::BoxCloneSyncService;
use tower::ServiceBuilder;

use super::load_shed::LoadShedLayer;
use super::metrics::MetricsLayer;
use super::timeout::TimeoutLayer;
use crate::service::config::ServiceSettings;
use crate::service::operation::{Operation, OperationError, OperationResponse};
use crate::service::router::EndpointRouter;

/// Type-erased, cloneable endpoint pipeline shared by concurrent requests.
pub type OperationPipeline = BoxCloneSyncService<Operation, OperationResponse, OperationError>;

/// Build the request pipeline by wrapping the `EndpointRouter` with middleware layers.
///
/// Layer order (outermost to innermost):
/// 1. `LoadShedLayer` -- reject when overloaded (fail fast before doing any work)
/// 2. `TimeoutLayer` -- enforce per-request timeouts
/// 3. `MetricsLayer` -- record timing and outcome (closest to the actual handler)
#[must_use]
pub fn build_operation_pipeline(
    router: EndpointRouter,
    settings: &ServiceSettings,
) -> OperationPipeline {
    BoxCloneSyncService::new(
        ServiceBuilder::new()
            .layer(LoadShedLayer::new(settings.max_concurrent_requests))
            .layer(TimeoutLayer)
            .layer(MetricsLayer)
            .service(router),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tower::ServiceExt;

    use super::*;
    use crate::service::middleware::test_support::{make_op, DelayedService};

    #[tokio::test]
    async fn pipeline_routes_through_all_layers() {
        let mut router = EndpointRouter::new();
        router.register("balance", DelayedService { delay_ms: 0 });

        let settings = ServiceSettings {
            max_concurrent_requests: 100,
            ..ServiceSettings::default()
        };

        let svc = build_operation_pipeline(router, &settings);
        let resp = svc.oneshot(make_op("balance", 5000)).await.unwrap();
        assert!(resp.payload.is_empty());
    }

    #[tokio::test]
    async fn pipeline_times_out_slow_handler() {
        let mut router = EndpointRouter::new();
        router.register("balance", DelayedService { delay_ms: 500 });

        let svc = build_operation_pipeline(router, &ServiceSettings::default());
        let err = svc.oneshot(make_op("balance", 20)).await.unwrap_err();
        assert!(matches!(err, OperationError::Timeout { timeout_ms: 20 }));
    }

    #[tokio::test]
    async fn pipeline_reports_unknown_endpoint() {
        let svc = build_operation_pipeline(EndpointRouter::new(), &ServiceSettings::default());
        let err = svc.oneshot(make_op("balance", 5000)).await.unwrap_err();
        assert!(matches!(err, OperationError::UnknownEndpoint { .. }));
    }
}
