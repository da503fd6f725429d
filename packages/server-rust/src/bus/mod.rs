//! Message bus seam.
//!
//! The bus provides endpoint registration with synchronous request delivery,
//! fire-and-forget publish, and a reply primitive tied to each request. The
//! service only depends on the [`MessageBus`] and [`RequestHandler`] traits;
//! [`MemoryBus`] is the in-process substrate used by tests and the binary.

pub mod memory;
pub mod message;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

pub use memory::{MemoryBus, Subscription};
pub use message::{Message, Reply, Request, Responder};

/// Errors surfaced by bus operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    #[error("connection closed")]
    Closed,
    #[error("invalid subject {0:?}")]
    InvalidSubject(String),
    #[error("subject {subject:?} already has a handler in queue group {queue_group:?}")]
    SubjectInUse { subject: String, queue_group: String },
    #[error("no responders available for {0:?}")]
    NoResponders(String),
    #[error("request timed out")]
    Timeout,
    #[error("reply already sent or requester gone")]
    ReplyDropped,
    #[error("publish failed: {0}")]
    Publish(String),
}

/// Receives requests delivered to a registered endpoint subject.
///
/// The bus may invoke `handle` concurrently for simultaneous requests.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, request: Request);
}

/// Messaging substrate used by the service.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Route requests arriving on `subject` to `handler`, subscribed under
    /// `queue_group`. Registering a subject that is already taken fails with
    /// [`BusError::SubjectInUse`].
    async fn add_endpoint(
        &self,
        subject: &str,
        queue_group: &str,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<(), BusError>;

    /// Stop routing `subject` to handlers registered under `queue_group`.
    async fn remove_endpoint(&self, subject: &str, queue_group: &str) -> Result<(), BusError>;

    /// Broadcast `payload` on `subject` to every matching subscriber.
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), BusError>;
}
