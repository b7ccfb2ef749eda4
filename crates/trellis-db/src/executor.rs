//! The executor abstraction.
//!
//! The builder compiles SQL and runs it through an [`Executor`] without
//! knowing whether the other side is the pooled connection or an open
//! transaction.

use futures_util::future::BoxFuture;

use crate::error::DbError;
use crate::value::{ExecResult, Row, Value};

/// An opaque handle compiled SQL runs through.
pub trait Executor: Send + Sync {
    /// Runs a read statement, returning the result rows.
    fn query<'a>(
        &'a self,
        sql: &'a str,
        args: &'a [Value],
    ) -> BoxFuture<'a, Result<Vec<Row>, DbError>>;

    /// Runs a write statement, returning its outcome.
    fn exec<'a>(
        &'a self,
        sql: &'a str,
        args: &'a [Value],
    ) -> BoxFuture<'a, Result<ExecResult, DbError>>;
}
