//! The `balance` endpoint: decode, look up, encode, notify, reply.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use balance_core::{notification_subject, BalanceRequest, BalanceResponse};
use tower::Service;
use tracing::{debug, warn};

use crate::service::config::DeliveryMode;
use crate::service::operation::{Operation, OperationError, OperationResponse};
use crate::service::registry::ServiceContext;
use crate::traits::LookupError;

/// Serves balance queries for one table.
///
/// Each call is independent; the handler keeps no per-request state, so the
/// bus may drive any number of calls concurrently.
#[derive(Debug, Clone)]
pub struct BalanceHandler {
    ctx: Arc<ServiceContext>,
}

impl BalanceHandler {
    #[must_use]
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }

    async fn handle(
        ctx: Arc<ServiceContext>,
        op: Operation,
    ) -> Result<OperationResponse, OperationError> {
        debug!(
            service_id = %ctx.service_id,
            call_id = op.ctx.call_id,
            "handling balance request"
        );
        let request = BalanceRequest::decode(&op.payload).inspect_err(|e| {
            debug!(service_id = %ctx.service_id, error = %e, "rejecting malformed request");
        })?;
        let customer_id = request.customer_id;

        let call = &op.ctx.call;
        let balance = call
            .run(ctx.store.get_balance(call, &ctx.table_name, &customer_id))
            .await
            .map_err(LookupError::from)
            .and_then(|lookup| lookup)
            .inspect_err(|e| {
                warn!(
                    service_id = %ctx.service_id,
                    table = %ctx.table_name,
                    customer_id = %customer_id,
                    error = %e,
                    "balance lookup failed"
                );
            })?;

        let payload = BalanceResponse { balance }
            .encode()
            .map_err(OperationError::Encode)?;
        let subject = notification_subject(&customer_id);

        match ctx.delivery_mode {
            DeliveryMode::Coupled => {
                ctx.bus
                    .publish(&subject, payload.clone())
                    .await
                    .map_err(|e| {
                        warn!(
                            service_id = %ctx.service_id,
                            subject = %subject,
                            error = %e,
                            "notification publish failed"
                        );
                        OperationError::Publish(e)
                    })?;
                Ok(OperationResponse::reply(payload))
            }
            DeliveryMode::Independent => {
                Ok(OperationResponse::reply_then_publish(payload, subject))
            }
        }
    }
}

impl Service<Operation> for BalanceHandler {
    type Response = OperationResponse;
    type Error = OperationError;
    type Future = Pin<Box<dyn Future<Output = Result<OperationResponse, OperationError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, op: Operation) -> Self::Future {
        let ctx = Arc::clone(&self.ctx);
        Box::pin(Self::handle(ctx, op))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
