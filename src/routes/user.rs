use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::error::AppError;
use crate::geo::client_ip;
use crate::response::ResponseDto;
use crate::service::user;
use crate::store::Database;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/register").route(web::post().to(register)))
        .service(web::resource("/login").route(web::post().to(login)));
}

#[derive(Deserialize)]
struct CredentialsRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    token: String,
}

async fn register(
    req: HttpRequest,
    db: web::Data<dyn Database>,
    payload: web::Json<CredentialsRequest>,
) -> Result<HttpResponse, AppError> {
    let ip = req
        .connection_info()
        .realip_remote_addr()
        .and_then(client_ip)
        .map(str::to_string);
    user::register(db.get_ref(), &payload.username, &payload.password, ip.as_deref()).await?;
    Ok(HttpResponse::Ok().json(ResponseDto::<()>::success(None)))
}

async fn login(
    db: web::Data<dyn Database>,
    config: web::Data<AppConfig>,
    payload: web::Json<CredentialsRequest>,
) -> Result<HttpResponse, AppError> {
    let token = user::login(db.get_ref(), config.get_ref(), &payload.username, &payload.password).await?;
    Ok(HttpResponse::Ok().json(ResponseDto::success(Some(LoginResponse { token }))))
}
