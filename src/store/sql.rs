use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database as SeaDatabase, DatabaseBackend, DatabaseConnection,
    DatabaseTransaction, QueryResult, Statement, TransactionTrait,
};

use super::{Database, FetchMode, QueryOutput, Row, StoreError, Transaction, Value};

/// Local SQL engine. SQLite in practice; any sea-orm backend accepts the statements.
#[derive(Clone)]
pub struct SqlDatabase {
    conn: DatabaseConnection,
}

impl SqlDatabase {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let mut opt = ConnectOptions::new(url.to_string());
        opt.sqlx_logging(false);
        let conn = SeaDatabase::connect(opt).await?;
        Ok(Self { conn })
    }

    /// A single-connection in-memory SQLite database; every pooled
    /// connection to `:memory:` would otherwise see its own empty schema.
    #[cfg(test)]
    pub async fn connect_memory() -> Result<Self, StoreError> {
        let mut opt = ConnectOptions::new("sqlite::memory:".to_string());
        opt.max_connections(1).min_connections(1).sqlx_logging(false);
        let conn = SeaDatabase::connect(opt).await?;
        Ok(Self { conn })
    }

    pub fn backend(&self) -> DatabaseBackend {
        self.conn.get_database_backend()
    }
}

#[async_trait]
impl Database for SqlDatabase {
    async fn execute(
        &self,
        sql: &str,
        params: Vec<Value>,
        fetch: FetchMode,
    ) -> Result<QueryOutput, StoreError> {
        run(&self.conn, sql, params, fetch).await
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError> {
        let txn = self.conn.begin().await?;
        Ok(Box::new(SqlTransaction { txn }))
    }

    fn name(&self) -> &'static str {
        match self.backend() {
            DatabaseBackend::Sqlite => "sqlite",
            DatabaseBackend::MySql => "mysql",
            DatabaseBackend::Postgres => "postgres",
        }
    }
}

pub struct SqlTransaction {
    txn: DatabaseTransaction,
}

#[async_trait]
impl Transaction for SqlTransaction {
    async fn execute(
        &mut self,
        sql: &str,
        params: Vec<Value>,
        fetch: FetchMode,
    ) -> Result<QueryOutput, StoreError> {
        run(&self.txn, sql, params, fetch).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.txn.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.txn.rollback().await?;
        Ok(())
    }
}

async fn run<C: ConnectionTrait>(
    db: &C,
    sql: &str,
    params: Vec<Value>,
    fetch: FetchMode,
) -> Result<QueryOutput, StoreError> {
    let backend = db.get_database_backend();
    let values = params.into_iter().map(to_sea_value).collect::<Vec<_>>();
    let stmt = Statement::from_sql_and_values(backend, sql, values);
    match fetch {
        FetchMode::None => {
            let res = db.execute(stmt).await?;
            let last_insert_id = i64::try_from(res.last_insert_id()).ok().filter(|id| *id > 0);
            Ok(QueryOutput {
                rows: Vec::new(),
                rows_affected: res.rows_affected(),
                last_insert_id,
            })
        }
        FetchMode::One => {
            let row = db.query_one(stmt).await?;
            Ok(QueryOutput {
                rows: row.into_iter().map(Row::from_sql).collect(),
                ..Default::default()
            })
        }
        FetchMode::All => {
            let rows = db.query_all(stmt).await?;
            Ok(QueryOutput {
                rows: rows.into_iter().map(Row::from_sql).collect(),
                ..Default::default()
            })
        }
    }
}

fn to_sea_value(value: Value) -> sea_orm::Value {
    match value {
        Value::Null => sea_orm::Value::BigInt(None),
        Value::Integer(v) => v.into(),
        Value::Real(v) => v.into(),
        Value::Text(v) => v.into(),
        Value::Blob(v) => v.into(),
    }
}

/// Reads one column without knowing its declared type up front. Null short
/// circuits on the first attempt since the driver skips the type check for it.
pub(super) fn decode_column(row: &QueryResult, col: &str) -> Result<Value, StoreError> {
    if let Ok(v) = row.try_get::<Option<i64>>("", col) {
        return Ok(v.map_or(Value::Null, Value::Integer));
    }
    if let Ok(v) = row.try_get::<Option<bool>>("", col) {
        return Ok(v.map_or(Value::Null, |b| Value::Integer(i64::from(b))));
    }
    if let Ok(v) = row.try_get::<Option<f64>>("", col) {
        return Ok(v.map_or(Value::Null, Value::Real));
    }
    if let Ok(v) = row.try_get::<Option<String>>("", col) {
        return Ok(v.map_or(Value::Null, Value::Text));
    }
    if let Ok(v) = row.try_get::<Option<NaiveDateTime>>("", col) {
        return Ok(v.map_or(Value::Null, |dt| {
            Value::Text(dt.format(super::DB_DATETIME_FORMAT).to_string())
        }));
    }
    if let Ok(v) = row.try_get::<Option<DateTime<Utc>>>("", col) {
        return Ok(v.map_or(Value::Null, |dt| Value::Text(super::format_db_datetime(dt))));
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>>("", col) {
        return Ok(v.map_or(Value::Null, Value::Blob));
    }
    Err(StoreError::Column(col.to_string()))
}
