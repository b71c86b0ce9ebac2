//! Storage interface shared by the thread assembler and the vote coordinator.
//!
//! Two engines sit behind [`Database`]: a local SQL engine driven through
//! sea-orm ([`sql::SqlDatabase`]) and a remote libSQL server spoken to over
//! HTTP ([`remote::RemoteDatabase`]). Callers only ever see rows addressed by
//! column name and convert them into typed records right away.

pub mod remote;
pub mod sql;

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sea_orm::QueryResult;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sea_orm::DbErr),
    #[error("remote database request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("remote database returned an error: {0}")]
    Remote(String),
    #[error("column `{0}` is missing or has an unsupported type")]
    Column(String),
    #[error("column `{column}` holds an unexpected value: {reason}")]
    Decode { column: String, reason: String },
    #[error("transaction already finished")]
    Finished,
}

/// How many rows the caller wants back from a statement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchMode {
    None,
    One,
    All,
}

/// A bound parameter or a decoded column value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// One result row. Values are looked up by column name.
pub struct Row(RowInner);

enum RowInner {
    Sql(QueryResult),
    Values(HashMap<String, Value>),
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            RowInner::Sql(row) => f.debug_tuple("Row").field(row).finish(),
            RowInner::Values(values) => f.debug_tuple("Row").field(values).finish(),
        }
    }
}

impl Row {
    pub(crate) fn from_sql(row: QueryResult) -> Self {
        Row(RowInner::Sql(row))
    }

    pub(crate) fn from_values(values: HashMap<String, Value>) -> Self {
        Row(RowInner::Values(values))
    }

    pub fn get(&self, col: &str) -> Result<Value, StoreError> {
        match &self.0 {
            RowInner::Sql(row) => sql::decode_column(row, col),
            RowInner::Values(values) => values
                .get(col)
                .cloned()
                .ok_or_else(|| StoreError::Column(col.to_string())),
        }
    }

    pub fn get_opt_i64(&self, col: &str) -> Result<Option<i64>, StoreError> {
        match self.get(col)? {
            Value::Null => Ok(None),
            Value::Integer(v) => Ok(Some(v)),
            Value::Real(v) if v.fract() == 0.0 => Ok(Some(v as i64)),
            Value::Text(s) => s
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|e| decode_error(col, e)),
            other => Err(decode_error(col, format!("{:?} is not an integer", other))),
        }
    }

    pub fn get_i64(&self, col: &str) -> Result<i64, StoreError> {
        self.get_opt_i64(col)?
            .ok_or_else(|| decode_error(col, "unexpected null"))
    }

    pub fn get_opt_string(&self, col: &str) -> Result<Option<String>, StoreError> {
        match self.get(col)? {
            Value::Null => Ok(None),
            Value::Text(s) => Ok(Some(s)),
            Value::Integer(v) => Ok(Some(v.to_string())),
            Value::Real(v) => Ok(Some(v.to_string())),
            Value::Blob(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| decode_error(col, e)),
        }
    }

    pub fn get_string(&self, col: &str) -> Result<String, StoreError> {
        self.get_opt_string(col)?
            .ok_or_else(|| decode_error(col, "unexpected null"))
    }

    pub fn get_bool(&self, col: &str) -> Result<bool, StoreError> {
        Ok(self.get_opt_i64(col)?.unwrap_or(0) != 0)
    }

    pub fn get_opt_datetime(&self, col: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        match self.get_opt_string(col)? {
            None => Ok(None),
            Some(raw) => parse_db_datetime(&raw)
                .map(|dt| Some(DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc)))
                .ok_or_else(|| decode_error(col, format!("`{}` is not a timestamp", raw))),
        }
    }
}

fn decode_error(col: &str, reason: impl fmt::Display) -> StoreError {
    StoreError::Decode {
        column: col.to_string(),
        reason: reason.to_string(),
    }
}

/// Format used when writing timestamps, compatible with `CURRENT_TIMESTAMP`.
pub const DB_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

pub fn format_db_datetime(dt: DateTime<Utc>) -> String {
    dt.format(DB_DATETIME_FORMAT).to_string()
}

pub(crate) fn parse_db_datetime(input: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M:%S").ok())
        .or_else(|| NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S%.f").ok())
        .or_else(|| DateTime::parse_from_rfc3339(input).ok().map(|dt| dt.naive_utc()))
}

#[derive(Debug, Default)]
pub struct QueryOutput {
    pub rows: Vec<Row>,
    pub rows_affected: u64,
    pub last_insert_id: Option<i64>,
}

impl QueryOutput {
    pub fn into_first(self) -> Option<Row> {
        self.rows.into_iter().next()
    }
}

#[async_trait]
pub trait Database: Send + Sync {
    async fn execute(
        &self,
        sql: &str,
        params: Vec<Value>,
        fetch: FetchMode,
    ) -> Result<QueryOutput, StoreError>;

    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError>;

    /// Short engine name for logs.
    fn name(&self) -> &'static str;
}

#[async_trait]
pub trait Transaction: Send {
    async fn execute(
        &mut self,
        sql: &str,
        params: Vec<Value>,
        fetch: FetchMode,
    ) -> Result<QueryOutput, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Statements of a SQL script, comments and blank lines removed.
pub fn split_sql(input: &str) -> Vec<String> {
    let mut buf = String::new();
    for line in input.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("--") || trimmed.is_empty() {
            continue;
        }
        buf.push_str(line);
        buf.push('\n');
    }
    buf.split(';')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
pub mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    pub async fn memory_db() -> sql::SqlDatabase {
        let db = sql::SqlDatabase::connect_memory()
            .await
            .expect("in-memory sqlite");
        crate::db::init_schema(&db).await.expect("schema");
        db
    }

    pub async fn insert_user(db: &dyn Database, username: &str) -> i64 {
        db.execute(
            "INSERT INTO users (username, password_hash) VALUES (?, ?)",
            vec![username.into(), "x".into()],
            FetchMode::None,
        )
        .await
        .expect("insert user")
        .last_insert_id
        .expect("user id")
    }

    /// A pooled SQLite file in a fresh temp dir. Keep the dir alive for the test.
    pub async fn file_db() -> (tempfile::TempDir, sql::SqlDatabase) {
        let dir = tempfile::tempdir().expect("temp dir");
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("comments.db").display());
        let db = sql::SqlDatabase::connect(&url).await.expect("file sqlite");
        crate::db::init_schema(&db).await.expect("schema");
        (dir, db)
    }

    /// Passes every call through to `inner` and counts them.
    pub struct CountingDb<D> {
        inner: D,
        calls: AtomicUsize,
    }

    impl<D: Database> CountingDb<D> {
        pub fn new(inner: D) -> Self {
            Self {
                inner,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl<D: Database> Database for CountingDb<D> {
        async fn execute(
            &self,
            sql: &str,
            params: Vec<Value>,
            fetch: FetchMode,
        ) -> Result<QueryOutput, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.execute(sql, params, fetch).await
        }

        async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.begin().await
        }

        fn name(&self) -> &'static str {
            self.inner.name()
        }
    }

    /// Fails every call and counts how often it was reached.
    #[derive(Clone, Default)]
    pub struct UnreachableDb {
        pub calls: Arc<AtomicUsize>,
    }

    impl UnreachableDb {
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Database for UnreachableDb {
        async fn execute(
            &self,
            _sql: &str,
            _params: Vec<Value>,
            _fetch: FetchMode,
        ) -> Result<QueryOutput, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Remote("store must not be reached".to_string()))
        }

        async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Remote("store must not be reached".to_string()))
        }

        fn name(&self) -> &'static str {
            "unreachable"
        }
    }
}
