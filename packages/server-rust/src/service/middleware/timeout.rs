//! Timeout middleware for endpoint requests.
//!
//! Rejects operations that exceed their `call_timeout_ms` with
//! `OperationError::Timeout` and cancels the operation's call context so
//! in-flight collaborator calls stop as well.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tower::{Layer, Service};

use crate::service::operation::{Operation, OperationError, OperationResponse};

// ---------------------------------------------------------------------------
// TimeoutLayer
// ---------------------------------------------------------------------------

/// Tower layer that wraps services with per-request timeout enforcement.
///
/// The timeout is read from each operation's `ctx.call_timeout_ms` field,
/// which the dispatcher derives from the requester's deadline.
#[derive(Debug, Clone)]
pub struct TimeoutLayer;

impl<S> Layer<S> for TimeoutLayer {
    type Service = TimeoutService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimeoutService { inner }
    }
}

// ---------------------------------------------------------------------------
// TimeoutService
// ---------------------------------------------------------------------------

/// Service wrapper that enforces per-request timeouts.
#[derive(Debug, Clone)]
pub struct TimeoutService<S> {
    inner: S,
}

impl<S> Service<Operation> for TimeoutService<S>
where
    S: Service<Operation, Response = OperationResponse, Error = OperationError> + Send,
    S::Future: Send + 'static,
{
    type Response = OperationResponse;
    type Error = OperationError;
    type Future = Pin<Box<dyn Future<Output = Result<OperationResponse, OperationError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, op: Operation) -> Self::Future {
        let timeout_ms = op.ctx().call_timeout_ms;
        let call = op.ctx().call.clone();
        let fut = self.inner.call(op);
        Box::pin(async move {
            let duration = Duration::from_millis(timeout_ms);
            if let Ok(result) = tokio::time::timeout(duration, fut).await {
                result
            } else {
                call.cancel();
                Err(OperationError::Timeout { timeout_ms })
            }
        })
    }
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
    async fn completes_within_timeout() {
        let svc = TimeoutLayer.layer(DelayedService { delay_ms: 10 });
        let resp = svc.oneshot(make_op("balance", 1000)).await.unwrap();
        assert!(resp.payload.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn exceeds_timeout_returns_error_and_cancels_call() {
        let svc = TimeoutLayer.layer(DelayedService { delay_ms: 200 });
        let op = make_op("balance", 50);
        let call = op.ctx().call.clone();

        let err = svc.oneshot(op).await.unwrap_err();
        assert!(matches!(err, OperationError::Timeout { timeout_ms: 50 }));
        assert!(call.is_cancelled());
    }
}
