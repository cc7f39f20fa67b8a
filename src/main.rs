// src/main.rs
use actix_web::{App, HttpServer, middleware::Logger, web};
use choizze_api::{config, db, init_routes};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("Starting CHOIZZE API service");

    let config = config::Config::from_env().expect("Failed to load config from environment");
    let timeout = Duration::from_secs(config.request_timeout_secs);

    let pool = db::create_pool(&config.database_url, config.db_max_connections, timeout)
        .await
        .expect("Failed to connect to Postgres");

    db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");

    let bind_addr = (config.host.clone(), config.port);
    tracing::info!("Listening on http://{}:{}", bind_addr.0, bind_addr.1);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(config.clone()))
            .wrap(Logger::default())
            .configure(init_routes)
    })
    .client_request_timeout(timeout)
    .bind(bind_addr)?
    .run()
    .await
}
