//! Load-shedding middleware for endpoint requests.
//!
//! Rejects requests when more than `max_concurrent_requests` are already
//! being processed, with `OperationError::Overloaded`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::Semaphore;
use tower::{Layer, Service};

use crate::service::operation::{Operation, OperationError, OperationResponse};

// ---------------------------------------------------------------------------
// LoadShedLayer
// ---------------------------------------------------------------------------

/// Tower layer that limits concurrent requests via a semaphore.
///
/// When all permits are taken, incoming requests are rejected immediately
/// rather than queued. Clones of the layer share one permit pool.
#[derive(Debug, Clone)]
pub struct LoadShedLayer {
    semaphore: Arc<Semaphore>,
}

impl LoadShedLayer {
    #[must_use]
    pub fn new(max_concurrent: u32) -> Self {
        let permits = usize::try_from(max_concurrent).unwrap_or(usize::MAX);
        Self {
            semaphore: Arc::new(Semaphore::new(permits)),
        }
    }
}

impl<S> Layer<S> for LoadShedLayer {
    type Service = LoadShedService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoadShedService {
            inner,
            semaphore: Arc::clone(&self.semaphore),
        }
    }
}

// ---------------------------------------------------------------------------
// LoadShedService
// ---------------------------------------------------------------------------

/// Service wrapper that enforces the concurrency limit.
#[derive(Debug, Clone)]
pub struct LoadShedService<S> {
    inner: S,
    semaphore: Arc<Semaphore>,
}

impl<S> Service<Operation> for LoadShedService<S>
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
        let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() else {
            tracing::warn!(
                endpoint = %op.ctx().endpoint,
                "request shed: concurrency limit reached"
            );
            return Box::pin(async { Err(OperationError::Overloaded) });
        };

        let fut = self.inner.call(op);
        Box::pin(async move {
            let result = fut.await;
            drop(permit);
            result
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tower::ServiceExt;

    use super::*;
    use crate::service::middleware::test_support::{make_op, DelayedService};

    #[tokio::test]
    async fn allows_requests_under_limit() {
        let layer = LoadShedLayer::new(10);
        let svc = layer.layer(DelayedService { delay_ms: 1 });
        assert!(svc.oneshot(make_op("balance", 5000)).await.is_ok());
        assert_eq!(layer.semaphore.available_permits(), 10);
    }

    #[tokio::test]
    async fn rejects_when_overloaded() {
        let layer = LoadShedLayer::new(1);
        let mut svc = layer.layer(DelayedService { delay_ms: 500 });

        let in_flight = svc.call(make_op("balance", 5000));
        let handle = tokio::spawn(in_flight);
        assert_eq!(layer.semaphore.available_permits(), 0);

        let err = svc.call(make_op("balance", 5000)).await.unwrap_err();
        assert!(matches!(err, OperationError::Overloaded));

        handle.await.unwrap().unwrap();
        assert_eq!(layer.semaphore.available_permits(), 1);
    }

    #[tokio::test]
    async fn permit_released_after_failure() {
        let layer = LoadShedLayer::new(1);
        let svc = crate::service::middleware::TimeoutLayer
            .layer(DelayedService { delay_ms: 100 });
        let svc = layer.layer(svc);

        let err = svc.clone().oneshot(make_op("balance", 5)).await.unwrap_err();
        assert!(matches!(err, OperationError::Timeout { .. }));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(layer.semaphore.available_permits(), 1);
    }
}
