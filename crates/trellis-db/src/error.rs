//! Data-layer errors.

use thiserror::Error;

use crate::record::ScanError;

/// Errors crossing the builder/scanner boundary.
///
/// Driver errors are surfaced unchanged; they are not retried here.
#[derive(Error, Debug)]
pub enum DbError {
    /// `first` found no matching row.
    #[error("record not found")]
    NotFound,

    /// The transaction was already committed or rolled back.
    #[error("transaction is closed")]
    TransactionClosed,

    /// Row-to-record materialization failed.
    #[error("scan failed: {0}")]
    Scan(#[from] ScanError),

    /// Underlying driver failure, surfaced unchanged.
    #[error(transparent)]
    Driver(#[from] sqlx::Error),
}

impl DbError {
    /// Returns `true` for the distinguished empty-result error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}
