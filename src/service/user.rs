use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::config::{AppConfig, DEFAULT_ADMIN_PASSWORD};
use crate::error::AppError;
use crate::model::User;
use crate::store::{Database, FetchMode};

const TOKEN_TTL_SECS: i64 = 30 * 24 * 3600;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub exp: i64,
}

pub async fn find_user(db: &dyn Database, user_id: i64) -> Result<Option<User>, AppError> {
    let output = db
        .execute(
            "SELECT id, username, password_hash, is_admin FROM users WHERE id = ?",
            vec![user_id.into()],
            FetchMode::One,
        )
        .await?;
    Ok(output.into_first().map(|row| User::from_row(&row)).transpose()?)
}

async fn find_user_by_name(db: &dyn Database, username: &str) -> Result<Option<User>, AppError> {
    let output = db
        .execute(
            "SELECT id, username, password_hash, is_admin FROM users WHERE username = ?",
            vec![username.into()],
            FetchMode::One,
        )
        .await?;
    Ok(output.into_first().map(|row| User::from_row(&row)).transpose()?)
}

pub async fn register(
    db: &dyn Database,
    username: &str,
    password: &str,
    ip_address: Option<&str>,
) -> Result<i64, AppError> {
    let username = username.trim();
    if !(3..=32).contains(&username.chars().count()) {
        return Err(AppError::param_error("username must be 3 to 32 characters"));
    }
    if password.chars().count() < 6 {
        return Err(AppError::param_error("password must be at least 6 characters"));
    }
    if find_user_by_name(db, username).await?.is_some() {
        return Err(AppError::fail("username already taken"));
    }

    let password_hash = hash_password(password)?;
    let inserted = db
        .execute(
            "INSERT INTO users (username, password_hash, ip_address, is_admin) VALUES (?, ?, ?, 0)",
            vec![username.into(), password_hash.into(), ip_address.into()],
            FetchMode::None,
        )
        .await?;
    let id = inserted
        .last_insert_id
        .ok_or_else(AppError::system_exception)?;
    info!("registered user {} ({})", username, id);
    Ok(id)
}

/// Checks the credentials and hands out a signed token.
pub async fn login(
    db: &dyn Database,
    config: &AppConfig,
    username: &str,
    password: &str,
) -> Result<String, AppError> {
    let user = find_user_by_name(db, username.trim())
        .await?
        .ok_or_else(|| AppError::fail("wrong username or password"))?;
    let verified = bcrypt::verify(password, &user.password_hash).unwrap_or(false);
    if !verified {
        return Err(AppError::fail("wrong username or password"));
    }
    info!("user {} logged in", user.username);
    issue_token(config, user.id)
}

pub fn issue_token(config: &AppConfig, user_id: i64) -> Result<String, AppError> {
    let claims = Claims {
        user_id,
        exp: Utc::now().timestamp() + TOKEN_TTL_SECS,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|_| AppError::system_exception())
}

pub fn decode_token(config: &AppConfig, token: &str) -> Result<Claims, AppError> {
    let key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
    let validation = Validation::new(Algorithm::HS256);
    decode::<Claims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|_| AppError::need_login())
}

/// Creates the configured admin account unless an admin already exists.
pub async fn ensure_admin(db: &dyn Database, config: &AppConfig) -> Result<(), AppError> {
    let existing = db
        .execute("SELECT id FROM users WHERE is_admin = 1 LIMIT 1", Vec::new(), FetchMode::One)
        .await?;
    if !existing.rows.is_empty() {
        return Ok(());
    }

    let password_hash = hash_password(&config.admin_password)?;
    db.execute(
        "INSERT INTO users (username, password_hash, is_admin) VALUES (?, ?, 1)",
        vec![config.admin_username.as_str().into(), password_hash.into()],
        FetchMode::None,
    )
    .await?;
    info!("created admin user {}", config.admin_username);
    if config.admin_password == DEFAULT_ADMIN_PASSWORD {
        warn!("admin user uses the default password, set ADMIN_PASSWORD");
    }
    Ok(())
}

fn hash_password(password: &str) -> Result<String, AppError> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST).map_err(|_| AppError::system_exception())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::memory_db;

    #[actix_rt::test]
    async fn register_then_login_yields_a_token_for_the_user() {
        let db = memory_db().await;
        let config = AppConfig::for_tests();
        let id = register(&db, "mika", "hunter22", Some("10.0.0.1")).await.unwrap();

        let token = login(&db, &config, "mika", "hunter22").await.unwrap();
        assert_eq!(decode_token(&config, &token).unwrap().user_id, id);

        let err = login(&db, &config, "mika", "wrong-pass").await.unwrap_err();
        assert_eq!(err.code(), 2);
        let user = find_user(&db, id).await.unwrap().unwrap();
        assert_eq!(user.username, "mika");
        assert!(!user.is_admin);
    }

    #[actix_rt::test]
    async fn duplicate_and_malformed_registrations_fail() {
        let db = memory_db().await;
        register(&db, "mika", "hunter22", None).await.unwrap();
        assert_eq!(register(&db, "mika", "another1", None).await.unwrap_err().code(), 2);
        assert!(register(&db, "mk", "hunter22", None).await.unwrap_err().is_invalid_argument());
        assert!(register(&db, "someone", "123", None).await.unwrap_err().is_invalid_argument());
    }

    #[actix_rt::test]
    async fn admin_is_created_once() {
        let db = memory_db().await;
        let config = AppConfig::for_tests();
        ensure_admin(&db, &config).await.unwrap();
        ensure_admin(&db, &config).await.unwrap();

        let admins = db
            .execute("SELECT id FROM users WHERE is_admin = 1", Vec::new(), FetchMode::All)
            .await
            .unwrap();
        assert_eq!(admins.rows.len(), 1);
        assert!(login(&db, &config, "admin", "s3cret-admin").await.is_ok());
    }

    #[test]
    fn tokens_signed_with_another_secret_are_refused() {
        let config = AppConfig::for_tests();
        let token = issue_token(&config, 9).unwrap();
        let mut other = AppConfig::for_tests();
        other.jwt_secret = "other".to_string();
        assert_eq!(decode_token(&other, &token).unwrap_err().code(), 3);
    }
}
