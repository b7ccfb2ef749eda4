//! The fluent query builder.
//!
//! A builder accumulates table, columns, WHERE clauses, ordering,
//! limit, and offset, then compiles through its [`Grammar`] and runs
//! through its [`Executor`]. Builders are single-use per request and
//! not thread-safe by design; terminal operations consume them.
//!
//! # Example
//!
//! ```no_run
//! # use trellis_db::{Database, Record};
//! #[derive(Debug, Default, Record)]
//! struct User {
//!     id: i64,
//!     name: String,
//!     email: String,
//! }
//!
//! # async fn run(db: &Database) -> Result<(), trellis_db::DbError> {
//! let user: User = db
//!     .builder()
//!     .table("users")
//!     .where_("id", "=", 42_i64)
//!     .first()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use indexmap::IndexMap;
use std::sync::Arc;

use crate::clause::{BoolOp, Direction, OrderClause, WhereClause};
use crate::error::DbError;
use crate::executor::Executor;
use crate::grammar::Grammar;
use crate::record::Record;
use crate::scanner::ScannerCache;
use crate::value::{ExecResult, Value};

/// Fluent accumulator of one query's state.
pub struct QueryBuilder {
    executor: Arc<dyn Executor>,
    grammar: Arc<dyn Grammar>,
    scanner: Arc<ScannerCache>,
    pub(crate) table: String,
    pub(crate) columns: Vec<String>,
    pub(crate) wheres: Vec<WhereClause>,
    pub(crate) orders: Vec<OrderClause>,
    pub(crate) limit: u64,
    pub(crate) offset: u64,
}

impl QueryBuilder {
    /// Creates a builder with default state: all columns, no clauses,
    /// no limit or offset.
    #[must_use]
    pub fn new(
        executor: Arc<dyn Executor>,
        grammar: Arc<dyn Grammar>,
        scanner: Arc<ScannerCache>,
    ) -> Self {
        Self {
            executor,
            grammar,
            scanner,
            table: String::new(),
            columns: vec!["*".to_string()],
            wheres: Vec::new(),
            orders: Vec::new(),
            limit: 0,
            offset: 0,
        }
    }

    /// Sets the target table.
    #[must_use]
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Replaces the selected columns.
    #[must_use]
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Adds an AND-joined WHERE clause.
    #[must_use]
    pub fn where_<V: Into<Value>>(
        mut self,
        column: impl Into<String>,
        operator: impl Into<String>,
        value: V,
    ) -> Self {
        self.wheres.push(WhereClause {
            column: column.into(),
            operator: operator.into(),
            value: value.into(),
            boolean: BoolOp::And,
        });
        self
    }

    /// Adds an OR-joined WHERE clause.
    #[must_use]
    pub fn or_where<V: Into<Value>>(
        mut self,
        column: impl Into<String>,
        operator: impl Into<String>,
        value: V,
    ) -> Self {
        self.wheres.push(WhereClause {
            column: column.into(),
            operator: operator.into(),
            value: value.into(),
            boolean: BoolOp::Or,
        });
        self
    }

    /// Adds an ORDER BY clause.
    ///
    /// The direction is normalised here as a second layer of defence:
    /// even a caller bug cannot put anything but `ASC` or `DESC` into
    /// the SQL.
    #[must_use]
    pub fn order_by(mut self, column: impl Into<String>, direction: &str) -> Self {
        self.orders.push(OrderClause {
            column: column.into(),
            direction: Direction::parse(direction),
        });
        self
    }

    /// Caps the number of returned rows. Zero means no limit.
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// Skips the first `offset` rows. Zero means no offset.
    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Compiles the SELECT without executing it.
    #[must_use]
    pub fn to_sql(&self) -> (String, Vec<Value>) {
        self.grammar.compile_select(self)
    }

    /// Runs the SELECT and scans every row into `T`.
    pub async fn get<T: Record>(self) -> Result<Vec<T>, DbError> {
        let (sql, args) = self.to_sql();
        let rows = self.executor.query(&sql, &args).await?;
        let mut records = Vec::with_capacity(rows.len());
        self.scanner.scan_slice(&rows, &mut records)?;
        Ok(records)
    }

    /// Runs the SELECT with `LIMIT 1` and scans the single row.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] when the result set is empty.
    pub async fn first<T: Record>(mut self) -> Result<T, DbError> {
        self.limit = 1;
        let (sql, args) = self.to_sql();
        let rows = self.executor.query(&sql, &args).await?;
        let row = rows.first().ok_or(DbError::NotFound)?;
        let mut record = T::default();
        self.scanner.scan_struct(row, &mut record)?;
        Ok(record)
    }

    /// Compiles and executes an INSERT of `data` into the table.
    pub async fn exec_insert(self, data: IndexMap<String, Value>) -> Result<ExecResult, DbError> {
        let (sql, args) = self.grammar.compile_insert(&self.table, &data);
        self.executor.exec(&sql, &args).await
    }

    /// Compiles and executes an UPDATE of `data`, constrained by the
    /// accumulated WHERE clauses.
    pub async fn exec_update(self, data: IndexMap<String, Value>) -> Result<ExecResult, DbError> {
        let (sql, args) = self.grammar.compile_update(&self.table, &data, &self.wheres);
        self.executor.exec(&sql, &args).await
    }

    /// Compiles and executes a DELETE constrained by the accumulated
    /// WHERE clauses.
    pub async fn exec_delete(self) -> Result<ExecResult, DbError> {
        let (sql, args) = self.grammar.compile_delete(&self.table, &self.wheres);
        self.executor.exec(&sql, &args).await
    }
}
