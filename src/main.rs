mod auth;
mod config;
mod db;
mod error;
mod geo;
mod model;
mod response;
mod routes;
mod service;
mod store;

use std::io;

use actix_web::{middleware, web, App, HttpServer};
use config::AppConfig;
use db::connect_db;
use geo::GeoLocator;
use log::{error, info};
use response::json_error_handler;
use routes::{comment, user};

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();
    let config = AppConfig::from_env();
    let db = connect_db(&config).await.map_err(|e| {
        error!("db connect failed: {}", e);
        io::Error::new(io::ErrorKind::Other, e)
    })?;
    service::user::ensure_admin(db.as_ref(), &config)
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    let geo = GeoLocator::from_config(&config);
    let server_port = config.server_port;

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::from(db.clone()))
            .app_data(web::Data::new(geo.clone()))
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .wrap(middleware::Logger::default())
            .wrap(actix_web::middleware::from_fn(routes::cors::cors_handler))
            .service(web::scope("/api")
                .service(web::scope("/user").configure(user::config))
                .service(web::scope("/comment").configure(comment::config))
            )
    })
    .bind(("0.0.0.0", server_port))?;
    info!("server started at http://0.0.0.0:{}", server_port);
    server.run().await
}
