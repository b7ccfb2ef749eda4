//! The sqlx-backed MySQL executor and its transactional sibling.
//!
//! Arguments cross into the driver as bound parameters only; result
//! rows come back as the crate's own [`Row`] model so the scanner and
//! builder stay driver-agnostic.

use futures_util::future::BoxFuture;
use sqlx::mysql::{MySql, MySqlArguments, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column as _, Row as _, TypeInfo as _};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::DbError;
use crate::executor::Executor;
use crate::value::{ExecResult, Row, Value};

fn bind_all<'q>(sql: &'q str, args: &'q [Value]) -> Query<'q, MySql, MySqlArguments> {
    let mut query = sqlx::query(sql);
    for value in args {
        query = match value {
            Value::Null => query.bind(None::<String>),
            Value::Bool(v) => query.bind(*v),
            Value::Int(v) => query.bind(*v),
            Value::Float(v) => query.bind(*v),
            Value::Text(v) => query.bind(v.clone()),
            Value::Bytes(v) => query.bind(v.clone()),
            Value::DateTime(v) => query.bind(*v),
        };
    }
    query
}

fn decode_row(row: &MySqlRow, columns: &Arc<Vec<String>>) -> Result<Row, DbError> {
    let mut values = Vec::with_capacity(columns.len());
    for (index, column) in row.columns().iter().enumerate() {
        let type_name = column.type_info().name();
        let value = match type_name {
            "BOOLEAN" => row
                .try_get::<Option<bool>, _>(index)?
                .map_or(Value::Null, Value::Bool),
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => row
                .try_get::<Option<i64>, _>(index)?
                .map_or(Value::Null, Value::Int),
            "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
            | "BIGINT UNSIGNED" => row
                .try_get::<Option<u64>, _>(index)?
                .map_or(Value::Null, |v| Value::Int(v as i64)),
            "FLOAT" => row
                .try_get::<Option<f32>, _>(index)?
                .map_or(Value::Null, |v| Value::Float(f64::from(v))),
            "DOUBLE" => row
                .try_get::<Option<f64>, _>(index)?
                .map_or(Value::Null, Value::Float),
            "DATETIME" => row
                .try_get::<Option<chrono::NaiveDateTime>, _>(index)?
                .map_or(Value::Null, |v| Value::DateTime(v.and_utc())),
            "TIMESTAMP" => row
                .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index)?
                .map_or(Value::Null, Value::DateTime),
            "VARBINARY" | "BINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => row
                .try_get::<Option<Vec<u8>>, _>(index)?
                .map_or(Value::Null, Value::Bytes),
            _ => row
                .try_get::<Option<String>, _>(index)?
                .map_or(Value::Null, Value::Text),
        };
        values.push(value);
    }
    Ok(Row::new(Arc::clone(columns), values))
}

fn decode_rows(rows: &[MySqlRow]) -> Result<Vec<Row>, DbError> {
    let columns: Arc<Vec<String>> = Arc::new(
        rows.first()
            .map(|row| {
                row.columns()
                    .iter()
                    .map(|c| c.name().to_string())
                    .collect()
            })
            .unwrap_or_default(),
    );
    rows.iter().map(|row| decode_row(row, &columns)).collect()
}

/// The pooled MySQL executor.
pub struct MySqlExecutor {
    pool: MySqlPool,
}

impl MySqlExecutor {
    /// Connects a pool to the DSN.
    pub async fn connect(dsn: &str) -> Result<Self, DbError> {
        let pool = MySqlPoolOptions::new()
            .max_connections(10)
            .connect(dsn)
            .await?;
        Ok(Self { pool })
    }

    /// The underlying pool.
    #[must_use]
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Closes the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl Executor for MySqlExecutor {
    fn query<'a>(
        &'a self,
        sql: &'a str,
        args: &'a [Value],
    ) -> BoxFuture<'a, Result<Vec<Row>, DbError>> {
        Box::pin(async move {
            let rows = bind_all(sql, args).fetch_all(&self.pool).await?;
            decode_rows(&rows)
        })
    }

    fn exec<'a>(
        &'a self,
        sql: &'a str,
        args: &'a [Value],
    ) -> BoxFuture<'a, Result<ExecResult, DbError>> {
        Box::pin(async move {
            let result = bind_all(sql, args).execute(&self.pool).await?;
            Ok(ExecResult {
                last_insert_id: result.last_insert_id(),
                rows_affected: result.rows_affected(),
            })
        })
    }
}

/// Executor over one open transaction.
///
/// Statements serialize on the transaction's connection; once the
/// transaction is taken for commit or rollback, further statements
/// fail with [`DbError::TransactionClosed`].
pub struct TxExecutor {
    tx: Mutex<Option<sqlx::Transaction<'static, MySql>>>,
}

impl TxExecutor {
    pub(crate) fn new(tx: sqlx::Transaction<'static, MySql>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
        }
    }

    pub(crate) async fn take(&self) -> Option<sqlx::Transaction<'static, MySql>> {
        self.tx.lock().await.take()
    }
}

impl Executor for TxExecutor {
    fn query<'a>(
        &'a self,
        sql: &'a str,
        args: &'a [Value],
    ) -> BoxFuture<'a, Result<Vec<Row>, DbError>> {
        Box::pin(async move {
            let mut guard = self.tx.lock().await;
            let tx = guard.as_mut().ok_or(DbError::TransactionClosed)?;
            let rows = bind_all(sql, args).fetch_all(&mut **tx).await?;
            decode_rows(&rows)
        })
    }

    fn exec<'a>(
        &'a self,
        sql: &'a str,
        args: &'a [Value],
    ) -> BoxFuture<'a, Result<ExecResult, DbError>> {
        Box::pin(async move {
            let mut guard = self.tx.lock().await;
            let tx = guard.as_mut().ok_or(DbError::TransactionClosed)?;
            let result = bind_all(sql, args).execute(&mut **tx).await?;
            Ok(ExecResult {
                last_insert_id: result.last_insert_id(),
                rows_affected: result.rows_affected(),
            })
        })
    }
}
