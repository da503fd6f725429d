//! Tower middleware layers for the endpoint pipeline.
//!
//! - [`timeout`]: Per-request timeout enforcement
//! - [`metrics`]: Request timing and outcome counting
//! - [`load_shed`]: Semaphore-based concurrency limiting
//! - [`pipeline`]: Composes all layers into a single service stack

pub mod load_shed;
pub mod metrics;
pub mod pipeline;
pub mod timeout;

pub use load_shed::LoadShedLayer;
pub use metrics::MetricsLayer;
pub use pipeline::{build_operation_pipeline, OperationPipeline};
pub use timeout::TimeoutLayer;

#[cfg(test)]
pub(crate) mod test_support {
    use std::future::Future;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;

    use bytes::Bytes;
    use tower::Service;

    use crate::context::CallContext;
    use crate::service::operation::{
        Operation, OperationContext, OperationError, OperationResponse,
    };

    /// Replies with an empty body after a configurable delay.
    #[derive(Clone)]
    pub struct DelayedService {
        pub delay_ms: u64,
    }

    impl Service<Operation> for DelayedService {
        type Response = OperationResponse;
        type Error = OperationError;
        type Future =
            Pin<Box<dyn Future<Output = Result<OperationResponse, OperationError>> + Send>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _op: Operation) -> Self::Future {
            let delay = self.delay_ms;
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok(OperationResponse::reply(Bytes::new()))
            })
        }
    }

    pub fn make_op(endpoint: &str, timeout_ms: u64) -> Operation {
        Operation::new(
            OperationContext::new(42, endpoint, CallContext::background(), timeout_ms),
            Bytes::new(),
        )
    }
}
