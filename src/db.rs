use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::{info, warn};
use sea_orm::DatabaseBackend;

use crate::config::AppConfig;
use crate::store::remote::RemoteDatabase;
use crate::store::sql::SqlDatabase;
use crate::store::{split_sql, Database, FetchMode, StoreError};

const SQLITE_SCHEMA: &str = include_str!("../schema-sqlite.sql");

pub async fn connect_db(config: &AppConfig) -> Result<Arc<dyn Database>, StoreError> {
    if let Some((url, token)) = config.remote_store() {
        let db = RemoteDatabase::new(url, token, config.store_timeout)?;
        info!("using remote libsql store at {}", url);
        init_schema(&db).await?;
        return Ok(Arc::new(db));
    }

    ensure_sqlite_dir(config);
    let url = config.database_url();
    let db = SqlDatabase::connect(&url).await?;
    if db.backend() == DatabaseBackend::Sqlite {
        init_schema(&db).await?;
    } else {
        info!("{} store: schema is managed outside the service", db.name());
    }
    info!("using {} store", db.name());
    Ok(Arc::new(db))
}

fn ensure_sqlite_dir(config: &AppConfig) {
    let raw = config.database_url();
    let Some(path) = raw
        .strip_prefix("sqlite://")
        .or_else(|| raw.strip_prefix("sqlite:"))
    else {
        return;
    };
    let path = path.split('?').next().unwrap_or_default();
    if path.is_empty() || path.contains(":memory:") {
        return;
    }
    if let Some(parent) = Path::new(path).parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            warn!("could not create sqlite directory {}: {}", parent.display(), e);
        }
    }
}

/// Creates missing tables. Every statement is `IF NOT EXISTS`.
pub async fn init_schema(db: &dyn Database) -> Result<(), StoreError> {
    for stmt in split_sql(SQLITE_SCHEMA) {
        db.execute(&stmt, Vec::new(), FetchMode::None).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_config(path: &Path) -> AppConfig {
        let mut config = AppConfig::for_tests();
        config.sqlite_path = path.display().to_string();
        config
    }

    #[actix_rt::test]
    async fn missing_sqlite_directories_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let config = sqlite_config(&dir.path().join("nested/deeper/site.db"));

        let db = connect_db(&config).await.unwrap();
        assert!(dir.path().join("nested/deeper").is_dir());
        let output = db
            .execute("SELECT COUNT(*) AS cnt FROM comments", Vec::new(), FetchMode::One)
            .await
            .unwrap();
        assert_eq!(output.into_first().unwrap().get_i64("cnt").unwrap(), 0);
    }

    #[actix_rt::test]
    async fn unusable_sqlite_directory_fails_the_connect() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"not a directory").unwrap();

        let config = sqlite_config(&blocker.join("site.db"));
        assert!(connect_db(&config).await.is_err());
    }
}
