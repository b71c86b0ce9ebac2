use actix_web::{
    body::{EitherBody, MessageBody},
    dev::{ServiceRequest, ServiceResponse},
    http::header::{self, HeaderValue},
    http::Method,
    middleware::Next,
    web, Error, HttpResponse,
};

use crate::config::AppConfig;

/// Answers preflight requests and marks api answers as uncacheable, vote
/// tallies change with every click.
pub async fn cors_handler<B>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<EitherBody<B>>, Error>
where
    B: MessageBody,
{
    let token_header = req
        .app_data::<web::Data<AppConfig>>()
        .map(|c| c.token_header.clone())
        .unwrap_or_else(|| "token".to_string());

    let mut res = if req.method() == Method::OPTIONS {
        let res = HttpResponse::NoContent().finish().map_into_right_body();
        req.into_response(res)
    } else {
        next.call(req).await?.map_into_left_body()
    };

    let headers = res.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400"));
    let allow_headers = format!("Origin, X-Requested-With, Content-Type, Accept, {}", token_header);
    if let Ok(value) = HeaderValue::from_str(&allow_headers) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, value);
    }
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );

    Ok(res)
}

#[cfg(test)]
mod tests {
    use actix_web::{http::StatusCode, middleware, test, App};

    use super::*;

    #[actix_rt::test]
    async fn preflight_lists_the_token_header() {
        let mut config = AppConfig::for_tests();
        config.token_header = "x-site-token".to_string();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(config))
                .wrap(middleware::from_fn(cors_handler))
                .route("/ping", web::get().to(HttpResponse::Ok)),
        )
        .await;

        let req = test::TestRequest::default()
            .method(Method::OPTIONS)
            .uri("/ping")
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        let allowed = res.headers().get(header::ACCESS_CONTROL_ALLOW_HEADERS).unwrap();
        assert!(allowed.to_str().unwrap().ends_with("x-site-token"));

        let res = test::call_service(&app, test::TestRequest::get().uri("/ping").to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            res.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "*"
        );
    }
}
