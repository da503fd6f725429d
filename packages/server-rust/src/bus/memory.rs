//! In-process [`MessageBus`] implementation.
//!
//! Endpoints are kept in a [`DashMap`] keyed by subject; each request is
//! handed to its handler on a fresh task so concurrent requests never
//! serialize behind one another. Subscriptions are unbounded channels matched
//! against published subjects with wildcard support.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use balance_core::subject::{is_valid_subject, subject_matches};
use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::message::{Message, Reply, Request};
use super::{BusError, MessageBus, RequestHandler};
use crate::context::CallContext;

struct EndpointEntry {
    queue_group: String,
    handler: Arc<dyn RequestHandler>,
}

struct SubscriberEntry {
    pattern: String,
    tx: mpsc::UnboundedSender<Message>,
}

/// Receiving side of a [`MemoryBus::subscribe`] call.
///
/// Yields every message published on a subject matching the pattern, in
/// publish order. Ends when the bus is closed.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Message>,
}

impl Subscription {
    /// Wait for the next message, or `None` once the bus is closed.
    pub async fn next(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    /// Take a message if one is already queued.
    pub fn try_next(&mut self) -> Option<Message> {
        self.rx.try_recv().ok()
    }
}

/// In-process request/reply and pub/sub substrate.
pub struct MemoryBus {
    endpoints: DashMap<String, EndpointEntry>,
    subscribers: RwLock<Vec<SubscriberEntry>>,
    closed: AtomicBool,
}

impl MemoryBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            endpoints: DashMap::new(),
            subscribers: RwLock::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Subscribe to every subject matching `pattern` (`*` and `>` allowed).
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Closed`] after [`close`](Self::close).
    pub fn subscribe(&self, pattern: &str) -> Result<Subscription, BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }
        if pattern.is_empty() || pattern.split('.').any(str::is_empty) {
            return Err(BusError::InvalidSubject(pattern.to_string()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.write().push(SubscriberEntry {
            pattern: pattern.to_string(),
            tx,
        });
        Ok(Subscription { rx })
    }

    /// Send a request to the endpoint on `subject` and wait up to `timeout`
    /// for its reply.
    ///
    /// The handler sees a cancellation context bounded by `timeout`; it is
    /// cancelled when the requester stops waiting.
    ///
    /// # Errors
    ///
    /// - [`BusError::Closed`] after [`close`](Self::close)
    /// - [`BusError::NoResponders`] when nothing is registered on `subject`
    /// - [`BusError::Timeout`] when no reply arrives in time, or the handler
    ///   finished without replying
    pub async fn request(
        &self,
        subject: &str,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Reply, BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }
        let handler = self
            .endpoints
            .get(subject)
            .map(|entry| Arc::clone(&entry.handler))
            .ok_or_else(|| BusError::NoResponders(subject.to_string()))?;

        let ctx = CallContext::new(Some(Instant::now() + timeout), CancellationToken::new());
        let cancel = ctx.cancellation_token().clone();
        let (request, rx) = Request::channel(subject, payload, ctx);

        trace!(subject, "dispatching request");
        tokio::spawn(async move { handler.handle(request).await });

        let outcome = tokio::time::timeout(timeout, rx).await;
        match outcome {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(BusError::Timeout),
            Err(_elapsed) => {
                cancel.cancel();
                Err(BusError::Timeout)
            }
        }
    }

    /// Closes the bus: further publishes and requests fail with
    /// [`BusError::Closed`] and all subscriptions end.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.subscribers.write().clear();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Whether a handler is registered on `subject`.
    #[must_use]
    pub fn has_endpoint(&self, subject: &str) -> bool {
        self.endpoints.contains_key(subject)
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn add_endpoint(
        &self,
        subject: &str,
        queue_group: &str,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<(), BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }
        if !is_valid_subject(subject) {
            return Err(BusError::InvalidSubject(subject.to_string()));
        }
        match self.endpoints.entry(subject.to_string()) {
            Entry::Occupied(existing) => Err(BusError::SubjectInUse {
                subject: subject.to_string(),
                queue_group: existing.get().queue_group.clone(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(EndpointEntry {
                    queue_group: queue_group.to_string(),
                    handler,
                });
                debug!(subject, queue_group, "endpoint registered on bus");
                Ok(())
            }
        }
    }

    async fn remove_endpoint(&self, subject: &str, queue_group: &str) -> Result<(), BusError> {
        self.endpoints
            .remove_if(subject, |_, entry| entry.queue_group == queue_group);
        Ok(())
    }

    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }
        // Only an empty subject is refused; any other text is delivered to
        // the subscribers whose patterns match it.
        if subject.is_empty() {
            return Err(BusError::InvalidSubject(subject.to_string()));
        }

        let mut subscribers = self.subscribers.write();
        subscribers.retain(|sub| {
            if !subject_matches(&sub.pattern, subject) {
                return !sub.tx.is_closed();
            }
            sub.tx
                .send(Message {
                    subject: subject.to_string(),
                    payload: payload.clone(),
                })
                .is_ok()
        });
        trace!(subject, subscribers = subscribers.len(), "published");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Echoes the request payload back.
    struct Echo;

    #[async_trait]
    impl RequestHandler for Echo {
        async fn handle(&self, request: Request) {
            let payload = request.data().clone();
            let _ = request.respond(payload).await;
        }
    }

    /// Never replies; records whether it observed cancellation.
    struct Silent {
        saw_cancel: Arc<AtomicBool>,
    }

    #[async_trait]
    impl RequestHandler for Silent {
        async fn handle(&self, request: Request) {
            request.context().cancellation_token().cancelled().await;
            self.saw_cancel.store(true, Ordering::SeqCst);
        }
    }

    /// Drops the request without replying.
    struct Dropper;

    #[async_trait]
    impl RequestHandler for Dropper {
        async fn handle(&self, _request: Request) {}
    }

    #[tokio::test]
    async fn request_reaches_registered_endpoint() {
        let bus = MemoryBus::new();
        bus.add_endpoint("customer.balance", "q", Arc::new(Echo))
            .await
            .unwrap();
        assert!(bus.has_endpoint("customer.balance"));

        let reply = bus
            .request("customer.balance", Bytes::from_static(b"hi"), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(reply, Reply::Data(Bytes::from_static(b"hi")));
    }

    #[tokio::test]
    async fn request_without_endpoint_has_no_responders() {
        let bus = MemoryBus::new();
        let err = bus
            .request("customer.balance", Bytes::new(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err, BusError::NoResponders("customer.balance".to_string()));
    }

    #[tokio::test]
    async fn duplicate_endpoint_is_rejected() {
        let bus = MemoryBus::new();
        bus.add_endpoint("customer.balance", "q", Arc::new(Echo))
            .await
            .unwrap();
        let err = bus
            .add_endpoint("customer.balance", "q", Arc::new(Echo))
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::SubjectInUse { .. }));
    }

    #[tokio::test]
    async fn remove_endpoint_frees_subject() {
        let bus = MemoryBus::new();
        bus.add_endpoint("a.b", "q", Arc::new(Echo)).await.unwrap();
        bus.remove_endpoint("a.b", "other").await.unwrap();
        assert!(bus.has_endpoint("a.b"));
        bus.remove_endpoint("a.b", "q").await.unwrap();
        assert!(!bus.has_endpoint("a.b"));
    }

    #[tokio::test]
    async fn invalid_subjects_are_rejected() {
        let bus = MemoryBus::new();
        let err = bus
            .add_endpoint("customer..balance", "q", Arc::new(Echo))
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::InvalidSubject(_)));
        let err = bus.publish("", Bytes::new()).await.unwrap_err();
        assert!(matches!(err, BusError::InvalidSubject(_)));
        assert!(bus.subscribe("").is_err());
    }

    #[tokio::test]
    async fn publish_accepts_free_form_customer_tokens() {
        let bus = MemoryBus::new();
        let mut sub = bus.subscribe("customer.balance.>").unwrap();

        for subject in [
            "customer.balance.cust 42",
            "customer.balance.x.",
            "customer.balance.*",
        ] {
            bus.publish(subject, Bytes::from_static(b"1")).await.unwrap();
            assert_eq!(sub.try_next().unwrap().subject, subject);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn silent_handler_times_out_and_is_cancelled() {
        let bus = MemoryBus::new();
        let saw_cancel = Arc::new(AtomicBool::new(false));
        bus.add_endpoint(
            "slow",
            "q",
            Arc::new(Silent {
                saw_cancel: Arc::clone(&saw_cancel),
            }),
        )
        .await
        .unwrap();

        let err = bus
            .request("slow", Bytes::new(), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert_eq!(err, BusError::Timeout);

        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(saw_cancel.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn handler_dropping_request_is_a_timeout() {
        let bus = MemoryBus::new();
        bus.add_endpoint("drop", "q", Arc::new(Dropper)).await.unwrap();
        let err = bus
            .request("drop", Bytes::new(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err, BusError::Timeout);
    }

    #[tokio::test]
    async fn publish_fans_out_to_matching_subscribers() {
        let bus = MemoryBus::new();
        let mut exact = bus.subscribe("customer.balance.c1").unwrap();
        let mut wildcard = bus.subscribe("customer.balance.>").unwrap();
        let mut other = bus.subscribe("customer.balance.c2").unwrap();

        bus.publish("customer.balance.c1", Bytes::from_static(b"x"))
            .await
            .unwrap();

        assert_eq!(exact.next().await.unwrap().payload, Bytes::from_static(b"x"));
        let msg = wildcard.next().await.unwrap();
        assert_eq!(msg.subject, "customer.balance.c1");
        assert!(other.try_next().is_none());
    }

    #[tokio::test]
    async fn dropped_subscriptions_are_pruned() {
        let bus = MemoryBus::new();
        let sub = bus.subscribe("a.>").unwrap();
        assert_eq!(bus.subscribers.read().len(), 1);
        drop(sub);
        bus.publish("a.b", Bytes::new()).await.unwrap();
        assert!(bus.subscribers.read().is_empty());
    }

    #[tokio::test]
    async fn closed_bus_rejects_publish_and_ends_subscriptions() {
        let bus = MemoryBus::new();
        let mut sub = bus.subscribe("a.>").unwrap();
        bus.close();

        assert!(bus.is_closed());
        assert_eq!(
            bus.publish("a.b", Bytes::new()).await.unwrap_err(),
            BusError::Closed
        );
        assert!(sub.next().await.is_none());
        assert!(matches!(bus.subscribe("a.>"), Err(BusError::Closed)));
    }
}
