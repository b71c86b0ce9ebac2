use actix_web::{error::JsonPayloadError, HttpRequest, HttpResponse};
use serde::Serialize;

use crate::error::AppError;

/// Envelope for every api answer. Payload fields sit next to `success`.
#[derive(Serialize)]
pub struct ResponseDto<T: Serialize> {
    pub success: bool,
    pub code: i32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(flatten)]
    pub data: Option<T>,
}

impl<T: Serialize> ResponseDto<T> {
    pub fn success(data: Option<T>) -> Self {
        Self {
            success: true,
            code: 0,
            message: "".to_string(),
            data,
        }
    }

    pub fn fail(code: i32, msg: impl Into<String>) -> Self {
        Self {
            success: false,
            code,
            message: msg.into(),
            data: None,
        }
    }
}

pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let app_err = match err {
        JsonPayloadError::ContentType => AppError::param_error("expected a json body"),
        JsonPayloadError::Deserialize(e) => AppError::param_error(format!("invalid request: {}", e)),
        _ => AppError::param_error("invalid request"),
    };
    app_err.into()
}

pub fn response_from_error(err: &AppError) -> HttpResponse {
    HttpResponse::Ok().json(ResponseDto::<()>::fail(err.code(), err.msg()))
}
