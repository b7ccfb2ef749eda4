//! Transactions: short-lived executors vending child builders.
//!
//! ```no_run
//! # use trellis_db::{Database, Value};
//! # use indexmap::IndexMap;
//! # async fn run(db: &Database) -> Result<(), trellis_db::DbError> {
//! let tx = db.begin().await?;
//!
//! let mut data = IndexMap::new();
//! data.insert("name".to_string(), Value::from("ada"));
//! tx.builder().table("users").exec_insert(data).await?;
//!
//! tx.commit().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use crate::builder::QueryBuilder;
use crate::error::DbError;
use crate::grammar::Grammar;
use crate::mysql::TxExecutor;
use crate::scanner::ScannerCache;

/// An open database transaction.
///
/// Every successful begin must be followed by exactly one of
/// [`commit`](Self::commit) or [`rollback`](Self::rollback); both
/// consume the transaction. Builders created from it afterwards fail
/// with [`DbError::TransactionClosed`].
pub struct Transaction {
    executor: Arc<TxExecutor>,
    grammar: Arc<dyn Grammar>,
    scanner: Arc<ScannerCache>,
}

impl Transaction {
    pub(crate) fn new(
        executor: Arc<TxExecutor>,
        grammar: Arc<dyn Grammar>,
        scanner: Arc<ScannerCache>,
    ) -> Self {
        Self {
            executor,
            grammar,
            scanner,
        }
    }

    /// Starts a query builder bound to this transaction.
    #[must_use]
    pub fn builder(&self) -> QueryBuilder {
        QueryBuilder::new(
            self.executor.clone(),
            self.grammar.clone(),
            self.scanner.clone(),
        )
    }

    /// Commits the transaction.
    pub async fn commit(self) -> Result<(), DbError> {
        let tx = self.executor.take().await.ok_or(DbError::TransactionClosed)?;
        tx.commit().await?;
        Ok(())
    }

    /// Rolls the transaction back.
    pub async fn rollback(self) -> Result<(), DbError> {
        let tx = self.executor.take().await.ok_or(DbError::TransactionClosed)?;
        tx.rollback().await?;
        Ok(())
    }
}
