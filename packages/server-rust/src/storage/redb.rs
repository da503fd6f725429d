//! Persistent [`BalanceStore`] backed by an embedded redb database.
//!
//! Each logical table maps to one redb table of `customer_id -> i64`. redb
//! calls block, so they run on the blocking thread pool.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition, TableError};
use tracing::debug;

use crate::context::CallContext;
use crate::traits::{BalanceStore, LookupError};

fn table_def(name: &str) -> TableDefinition<'_, &'static str, i64> {
    TableDefinition::new(name)
}

/// Balance store persisted in a single redb file.
#[derive(Clone)]
pub struct RedbBalanceStore {
    db: Arc<Database>,
}

impl RedbBalanceStore {
    /// Opens the database at `path`, creating it if necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or is not a redb database.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let db = Database::create(path)
            .with_context(|| format!("opening balance database at {}", path.display()))?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Insert or replace a balance in a single write transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the write transaction fails to open or commit.
    pub async fn set_balance(
        &self,
        table: &str,
        customer_id: &str,
        balance: i64,
    ) -> anyhow::Result<Option<i64>> {
        let db = Arc::clone(&self.db);
        let table = table.to_string();
        let customer_id = customer_id.to_string();
        tokio::task::spawn_blocking(move || -> anyhow::Result<Option<i64>> {
            let txn = db.begin_write()?;
            let previous = {
                let mut t = txn.open_table(table_def(&table))?;
                let previous = t.insert(customer_id.as_str(), balance)?;
                previous.map(|guard| guard.value())
            };
            txn.commit()?;
            Ok(previous)
        })
        .await?
    }

    fn read_balance(db: &Database, table: &str, customer_id: &str) -> Result<i64, LookupError> {
        let not_found = || LookupError::NotFound {
            table: table.to_string(),
            customer_id: customer_id.to_string(),
        };

        let txn = db.begin_read().map_err(anyhow::Error::from)?;
        let t = match txn.open_table(table_def(table)) {
            Ok(t) => t,
            Err(TableError::TableDoesNotExist(_)) => return Err(not_found()),
            Err(e) => return Err(anyhow::Error::from(e).into()),
        };
        let value = t.get(customer_id).map_err(anyhow::Error::from)?;
        value.map(|guard| guard.value()).ok_or_else(not_found)
    }
}

#[async_trait]
impl BalanceStore for RedbBalanceStore {
    async fn get_balance(
        &self,
        ctx: &CallContext,
        table: &str,
        customer_id: &str,
    ) -> Result<i64, LookupError> {
        let db = Arc::clone(&self.db);
        let table_name = table.to_string();
        let id = customer_id.to_string();
        let read = tokio::task::spawn_blocking(move || Self::read_balance(&db, &table_name, &id));

        let joined = ctx.run(read).await?;
        let balance = joined.map_err(anyhow::Error::from)??;
        debug!(table, customer_id, balance, "balance read from redb");
        Ok(balance)
    }
}
