//! In-memory [`BalanceStore`] implementation backed by [`DashMap`].
//!
//! Concurrent reads need no external locking. Intended for tests and for
//! running the service without a persistent backend.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::context::CallContext;
use crate::traits::{BalanceStore, LookupError};

/// In-memory balances keyed by `(table, customer_id)`.
pub struct MemoryBalanceStore {
    entries: DashMap<(String, String), i64>,
}

impl MemoryBalanceStore {
    /// Creates a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Insert or replace a balance. Returns the previous balance if any.
    pub fn set_balance(&self, table: &str, customer_id: &str, balance: i64) -> Option<i64> {
        self.entries
            .insert((table.to_string(), customer_id.to_string()), balance)
    }

    /// Remove a balance, returning it if it was present.
    pub fn remove(&self, table: &str, customer_id: &str) -> Option<i64> {
        self.entries
            .remove(&(table.to_string(), customer_id.to_string()))
            .map(|(_, balance)| balance)
    }

    /// Return the number of recorded balances across all tables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MemoryBalanceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BalanceStore for MemoryBalanceStore {
    async fn get_balance(
        &self,
        _ctx: &CallContext,
        table: &str,
        customer_id: &str,
    ) -> Result<i64, LookupError> {
        self.entries
            .get(&(table.to_string(), customer_id.to_string()))
            .map(|entry| *entry.value())
            .ok_or_else(|| LookupError::NotFound {
                table: table.to_string(),
                customer_id: customer_id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_remove_round_trip() {
        let store = MemoryBalanceStore::new();
        let ctx = CallContext::background();

        assert!(store.set_balance("balances", "cust-42", 1500).is_none());
        assert_eq!(
            store.get_balance(&ctx, "balances", "cust-42").await.unwrap(),
            1500
        );

        assert_eq!(store.set_balance("balances", "cust-42", 1600), Some(1500));
        assert_eq!(store.remove("balances", "cust-42"), Some(1600));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn missing_customer_is_not_found() {
        let store = MemoryBalanceStore::new();
        let err = store
            .get_balance(&CallContext::background(), "balances", "ghost")
            .await
            .unwrap_err();
        assert!(matches!(err, LookupError::NotFound { customer_id, .. } if customer_id == "ghost"));
    }

    #[tokio::test]
    async fn tables_are_isolated() {
        let store = MemoryBalanceStore::new();
        let ctx = CallContext::background();
        store.set_balance("eu", "c1", 10);
        store.set_balance("us", "c1", 20);

        assert_eq!(store.len(), 2);
        assert_eq!(store.get_balance(&ctx, "eu", "c1").await.unwrap(), 10);
        assert_eq!(store.get_balance(&ctx, "us", "c1").await.unwrap(), 20);
        assert!(store.get_balance(&ctx, "apac", "c1").await.is_err());
    }
}
