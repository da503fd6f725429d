//! Operation types flowing through the endpoint pipeline.

use balance_core::signal::{descriptions, LOOKUP_FAILURE_BODY};
use balance_core::{DecodeError, ErrorSignal};
use bytes::Bytes;

use crate::bus::BusError;
use crate::context::CallContext;
use crate::traits::LookupError;

/// Context carried with every operation through the pipeline.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub call_id: u64,
    /// Name of the endpoint the operation is routed to.
    pub endpoint: String,
    /// Cancellation context handed to collaborator calls.
    pub call: CallContext,
    /// Overall budget for the operation, enforced by the timeout layer.
    pub call_timeout_ms: u64,
}

impl OperationContext {
    #[must_use]
    pub fn new(
        call_id: u64,
        endpoint: impl Into<String>,
        call: CallContext,
        call_timeout_ms: u64,
    ) -> Self {
        Self {
            call_id,
            endpoint: endpoint.into(),
            call,
            call_timeout_ms,
        }
    }
}

/// One inbound request body addressed to an endpoint.
#[derive(Debug)]
pub struct Operation {
    pub ctx: OperationContext,
    pub payload: Bytes,
}

impl Operation {
    #[must_use]
    pub fn new(ctx: OperationContext, payload: Bytes) -> Self {
        Self { ctx, payload }
    }

    #[must_use]
    pub fn ctx(&self) -> &OperationContext {
        &self.ctx
    }
}

/// Successful outcome of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResponse {
    /// Body of the direct reply.
    pub payload: Bytes,
    /// Subject to broadcast `payload` on after the reply has been sent.
    pub deferred_publish: Option<String>,
}

impl OperationResponse {
    #[must_use]
    pub fn reply(payload: Bytes) -> Self {
        Self {
            payload,
            deferred_publish: None,
        }
    }

    #[must_use]
    pub fn reply_then_publish(payload: Bytes, subject: String) -> Self {
        Self {
            payload,
            deferred_publish: Some(subject),
        }
    }
}

/// Errors returned by operation handlers and middleware.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error("malformed request: {0}")]
    BadRequest(#[from] DecodeError),
    #[error("balance lookup failed: {0}")]
    Lookup(#[from] LookupError),
    #[error("response encoding failed: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("notification publish failed: {0}")]
    Publish(#[source] BusError),
    #[error("unknown endpoint: {name}")]
    UnknownEndpoint { name: String },
    #[error("operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("server overloaded, try again later")]
    Overloaded,
    #[error("service is shutting down")]
    ShuttingDown,
}

impl OperationError {
    /// The error reply sent to the requester.
    ///
    /// Decode and encode failures carry the raw error text. Lookup failures
    /// carry a fixed body so backend detail never reaches the caller.
    #[must_use]
    pub fn to_signal(&self) -> ErrorSignal {
        match self {
            Self::BadRequest(e) => ErrorSignal::bad_request(&e.to_string()),
            Self::Lookup(_) => {
                ErrorSignal::internal(descriptions::RETRIEVE_BALANCE, LOOKUP_FAILURE_BODY)
            }
            Self::Encode(e) => ErrorSignal::internal(descriptions::ENCODE_JSON, &e.to_string()),
            Self::Publish(e) => ErrorSignal::internal(descriptions::PUBLISH, &e.to_string()),
            Self::UnknownEndpoint { .. } => {
                ErrorSignal::internal(descriptions::UNKNOWN_ENDPOINT, &self.to_string())
            }
            Self::Timeout { .. } => ErrorSignal::internal(descriptions::TIMEOUT, &self.to_string()),
            Self::Overloaded => ErrorSignal::internal(descriptions::OVERLOADED, &self.to_string()),
            Self::ShuttingDown => {
                ErrorSignal::internal(descriptions::SHUTTING_DOWN, &self.to_string())
            }
        }
    }

    /// Whether the requester, not the service, is at fault.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::BadRequest(_))
    }
}
