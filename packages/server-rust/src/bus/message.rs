//! Request, reply, and broadcast message types exchanged over the bus.

use async_trait::async_trait;
use balance_core::ErrorSignal;
use bytes::Bytes;
use tokio::sync::oneshot;

use super::BusError;
use crate::context::CallContext;

/// What a requester receives back: a body or an error signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Data(Bytes),
    Error(ErrorSignal),
}

impl Reply {
    #[must_use]
    pub fn data(&self) -> Option<&Bytes> {
        match self {
            Self::Data(data) => Some(data),
            Self::Error(_) => None,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&ErrorSignal> {
        match self {
            Self::Data(_) => None,
            Self::Error(signal) => Some(signal),
        }
    }
}

/// A broadcast received by a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    pub payload: Bytes,
}

/// Reply channel back to the originator of one request.
#[async_trait]
pub trait Responder: Send {
    async fn send(self: Box<Self>, reply: Reply) -> Result<(), BusError>;
}

struct OneshotResponder(oneshot::Sender<Reply>);

#[async_trait]
impl Responder for OneshotResponder {
    async fn send(self: Box<Self>, reply: Reply) -> Result<(), BusError> {
        self.0.send(reply).map_err(|_| BusError::ReplyDropped)
    }
}

/// One inbound request delivered to an endpoint.
///
/// Replying consumes the request, so each request is answered at most once.
/// Dropping it without replying leaves the requester to time out.
pub struct Request {
    subject: String,
    payload: Bytes,
    ctx: CallContext,
    responder: Box<dyn Responder>,
}

impl Request {
    #[must_use]
    pub fn new(
        subject: impl Into<String>,
        payload: Bytes,
        ctx: CallContext,
        responder: Box<dyn Responder>,
    ) -> Self {
        Self {
            subject: subject.into(),
            payload,
            ctx,
            responder,
        }
    }

    /// Builds a request answered through an in-process channel.
    #[must_use]
    pub fn channel(
        subject: impl Into<String>,
        payload: Bytes,
        ctx: CallContext,
    ) -> (Self, oneshot::Receiver<Reply>) {
        let (tx, rx) = oneshot::channel();
        let request = Self::new(subject, payload, ctx, Box::new(OneshotResponder(tx)));
        (request, rx)
    }

    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    #[must_use]
    pub fn data(&self) -> &Bytes {
        &self.payload
    }

    /// The requester's cancellation context.
    #[must_use]
    pub fn context(&self) -> &CallContext {
        &self.ctx
    }

    /// Send `payload` back as the successful reply.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::ReplyDropped`] if the requester is gone.
    pub async fn respond(self, payload: Bytes) -> Result<(), BusError> {
        self.responder.send(Reply::Data(payload)).await
    }

    /// Send an error signal back in place of a reply body.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::ReplyDropped`] if the requester is gone.
    pub async fn error(self, signal: ErrorSignal) -> Result<(), BusError> {
        self.responder.send(Reply::Error(signal)).await
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("subject", &self.subject)
            .field("payload_len", &self.payload.len())
            .field("ctx", &self.ctx)
            .finish_non_exhaustive()
    }
}
