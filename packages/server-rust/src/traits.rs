use async_trait::async_trait;

use crate::context::{CallContext, Interrupted};

/// Failure modes of a balance lookup.
///
/// Callers reporting to a requester must not distinguish between these; the
/// variants exist for logging only.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("no balance recorded for customer {customer_id:?} in table {table:?}")]
    NotFound { table: String, customer_id: String },
    #[error("backend error: {0}")]
    Backend(#[from] anyhow::Error),
    #[error("lookup cancelled")]
    Cancelled,
    #[error("lookup deadline exceeded")]
    DeadlineExceeded,
}

impl From<Interrupted> for LookupError {
    fn from(value: Interrupted) -> Self {
        match value {
            Interrupted::Cancelled => Self::Cancelled,
            Interrupted::DeadlineExceeded => Self::DeadlineExceeded,
        }
    }
}

/// Keyed store holding one integer balance per customer per table.
/// Implementations: in-memory (`DashMap`), redb (persistent).
#[async_trait]
pub trait BalanceStore: Send + Sync {
    /// Resolve the balance recorded for `customer_id` in `table`.
    ///
    /// A single attempt is made. Implementations may observe `ctx` to stop
    /// early; callers bound the call with `ctx` regardless.
    async fn get_balance(
        &self,
        ctx: &CallContext,
        table: &str,
        customer_id: &str,
    ) -> Result<i64, LookupError>;
}
