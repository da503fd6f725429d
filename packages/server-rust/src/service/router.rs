//! Endpoint routing: dispatches `Operation` to the handler registered for its endpoint.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tower::util::BoxCloneSyncService;
use tower::{Service, ServiceExt};

use super::operation::{Operation, OperationError, OperationResponse};

type BoxedHandler = BoxCloneSyncService<Operation, OperationResponse, OperationError>;

// ---------------------------------------------------------------------------
// EndpointRouter
// ---------------------------------------------------------------------------

/// Table from endpoint name to handler service.
///
/// Each handler is a `tower::Service<Operation>` that can be exercised in
/// isolation from the bus. Operations addressed to an unregistered endpoint
/// fail with `OperationError::UnknownEndpoint`.
#[derive(Clone, Default)]
pub struct EndpointRouter {
    handlers: HashMap<String, BoxedHandler>,
}

impl EndpointRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for `endpoint`, replacing any previous one.
    pub fn register<S>(&mut self, endpoint: impl Into<String>, handler: S)
    where
        S: Service<Operation, Response = OperationResponse, Error = OperationError>
            + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
    {
        self.handlers
            .insert(endpoint.into(), BoxCloneSyncService::new(handler));
    }
}

impl Service<Operation> for EndpointRouter {
    type Response = OperationResponse;
    type Error = OperationError;
    type Future = Pin<Box<dyn Future<Output = Result<OperationResponse, OperationError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Readiness is checked per handler in `call` via `oneshot`.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, op: Operation) -> Self::Future {
        match self.handlers.get(&op.ctx().endpoint) {
            Some(handler) => Box::pin(handler.clone().oneshot(op)),
            None => {
                let name = op.ctx.endpoint;
                Box::pin(async move { Err(OperationError::UnknownEndpoint { name }) })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
