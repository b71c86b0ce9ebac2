use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use futures_util::future::LocalBoxFuture;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::geo::{client_ip, GeoLocator};
use crate::model::RequestContext;
use crate::service::user::{decode_token, find_user};
use crate::store::Database;

/// A request carrying a valid token of an existing user.
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: i64,
}

impl AuthUser {
    /// Request-scoped context for services, with the author's country looked up.
    pub async fn context(&self, req: &HttpRequest, geo: &GeoLocator) -> RequestContext {
        let info = req.connection_info();
        let ip = info.realip_remote_addr().and_then(client_ip).map(str::to_string);
        drop(info);
        RequestContext {
            user_id: self.user_id,
            country: geo.country_of(ip.as_deref()).await,
        }
    }
}

impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let db = match req.app_data::<web::Data<dyn Database>>() {
            Some(db) => db.clone(),
            None => {
                return Box::pin(async { Err(AppError::system_exception().into()) });
            }
        };
        let config = match req.app_data::<web::Data<AppConfig>>() {
            Some(cfg) => cfg.clone(),
            None => {
                return Box::pin(async { Err(AppError::system_exception().into()) });
            }
        };
        let token = extract_token(req, &config);

        Box::pin(async move {
            let token = token.ok_or_else(AppError::need_login)?;
            let auth = authenticate_token(db.get_ref(), &config, &token).await?;
            Ok(auth)
        })
    }
}

fn extract_token(req: &HttpRequest, config: &AppConfig) -> Option<String> {
    let header = config.token_header.as_str();
    req.headers()
        .get(header)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim())
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v).trim().to_string())
        .filter(|v| !v.is_empty())
}

async fn authenticate_token(
    db: &dyn Database,
    config: &AppConfig,
    token: &str,
) -> Result<AuthUser, AppError> {
    let claims = decode_token(config, token)?;
    let user = find_user(db, claims.user_id)
        .await?
        .ok_or_else(AppError::need_login)?;
    Ok(AuthUser { user_id: user.id })
}
