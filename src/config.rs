use std::env;
use std::time::Duration;

pub const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

#[derive(Clone)]
pub struct AppConfig {
    pub server_port: u16,
    pub sqlite_path: String,
    pub database_url: Option<String>,
    pub turso_database_url: Option<String>,
    pub turso_auth_token: Option<String>,
    pub store_timeout: Duration,
    pub jwt_secret: String,
    pub token_header: String,
    pub admin_username: String,
    pub admin_password: String,
    /// Empty disables the country lookup.
    pub geo_lookup_url: String,
    pub geo_lookup_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let server_port = env::var("SERVER_PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(5000);

        let sqlite_path = env::var("SQLITE_PATH").unwrap_or_else(|_| "site.db".to_string());
        let database_url = non_empty("DATABASE_URL");
        let turso_database_url = non_empty("TURSO_DATABASE_URL");
        let turso_auth_token = non_empty("TURSO_AUTH_TOKEN");

        let store_timeout = env::var("STORE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(5));

        let jwt_secret = env::var("JWT_SECRET")
            .unwrap_or_else(|_| "6c6AJaXnTRXWpr9aUUqP".to_string());

        let token_header = env::var("TOKEN_HEADER").unwrap_or_else(|_| "token".to_string());

        let admin_username = env::var("ADMIN_USERNAME").unwrap_or_else(|_| "admin".to_string());
        let admin_password =
            env::var("ADMIN_PASSWORD").unwrap_or_else(|_| DEFAULT_ADMIN_PASSWORD.to_string());

        let geo_lookup_url = env::var("GEO_LOOKUP_URL")
            .unwrap_or_else(|_| "http://ip-api.com/json".to_string());

        Self {
            server_port,
            sqlite_path,
            database_url,
            turso_database_url,
            turso_auth_token,
            store_timeout,
            jwt_secret,
            token_header,
            admin_username,
            admin_password,
            geo_lookup_url,
            geo_lookup_timeout: Duration::from_secs(2),
        }
    }

    /// Remote engine when both the url and the token are configured.
    pub fn remote_store(&self) -> Option<(&str, &str)> {
        match (&self.turso_database_url, &self.turso_auth_token) {
            (Some(url), Some(token)) => Some((url.as_str(), token.as_str())),
            _ => None,
        }
    }

    pub fn database_url(&self) -> String {
        if let Some(url) = &self.database_url {
            return url.clone();
        }

        let path = self.sqlite_path.trim();
        if path.starts_with("sqlite:") || path.starts_with("file:") {
            return path.to_string();
        }
        format!("sqlite://{}?mode=rwc", path)
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
impl AppConfig {
    pub fn for_tests() -> Self {
        Self {
            server_port: 0,
            sqlite_path: ":memory:".to_string(),
            database_url: None,
            turso_database_url: None,
            turso_auth_token: None,
            store_timeout: Duration::from_secs(1),
            jwt_secret: "test-secret".to_string(),
            token_header: "token".to_string(),
            admin_username: "admin".to_string(),
            admin_password: "s3cret-admin".to_string(),
            geo_lookup_url: String::new(),
            geo_lookup_timeout: Duration::from_secs(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_path_becomes_a_create_mode_url() {
        let mut config = AppConfig::for_tests();
        config.sqlite_path = "data/site.db".to_string();
        assert_eq!(config.database_url(), "sqlite://data/site.db?mode=rwc");

        config.sqlite_path = "sqlite::memory:".to_string();
        assert_eq!(config.database_url(), "sqlite::memory:");

        config.database_url = Some("mysql://u:p@localhost/site".to_string());
        assert_eq!(config.database_url(), "mysql://u:p@localhost/site");
    }

    #[test]
    fn remote_store_needs_both_url_and_token() {
        let mut config = AppConfig::for_tests();
        config.turso_database_url = Some("libsql://site.turso.io".to_string());
        assert!(config.remote_store().is_none());
        config.turso_auth_token = Some("tok".to_string());
        assert_eq!(config.remote_store(), Some(("libsql://site.turso.io", "tok")));
    }
}
