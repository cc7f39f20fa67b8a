// src/lib.rs
use actix_web::{HttpResponse, get, web};

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod friends;
pub mod models;
pub mod moderation;
pub mod subscriptions;
pub mod users;

use error::AppError;

/// Registers every route plus the extractor settings shared by them.
/// Callers provide `web::Data<PgPool>` and `web::Data<Config>`.
pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        AppError::Validation(format!("Invalid request body: {}", err)).into()
    }));
    cfg.app_data(web::PathConfig::default().error_handler(|err, _req| {
        AppError::Validation(format!("Invalid path parameter: {}", err)).into()
    }));
    cfg.service(index);
    cfg.configure(auth::init_routes)
        .configure(users::init_routes)
        .configure(friends::init_routes)
        .configure(feed::init_routes)
        .configure(moderation::init_routes)
        .configure(subscriptions::init_routes);
}

#[get("/")]
async fn index() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body("CHOIZZE API is running")
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::auth::issue_token;
    use crate::config::Config;
    use crate::models::User;
    use actix_web::http::header;
    use chrono::Utc;
    use sqlx::PgPool;
    use sqlx::postgres::PgPoolOptions;
    use uuid::Uuid;

    pub const TEST_SECRET: &str = "test-secret";

    pub fn test_config() -> Config {
        Config {
            database_url: "postgres://postgres@localhost/choizze_unused".to_string(),
            jwt_secret: TEST_SECRET.to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
            token_ttl_minutes: 60,
            db_max_connections: 1,
            request_timeout_secs: 1,
        }
    }

    /// Pool that never connects unless a query runs. Handlers under test
    /// must reject before touching the store.
    pub fn lazy_pool() -> PgPool {
        PgPoolOptions::new()
            .max_connections(1)
            .connect_lazy(&test_config().database_url)
            .unwrap()
    }

    /// A fresh identity and the `Authorization` header that proves it.
    pub fn bearer_for(username: &str) -> (Uuid, (header::HeaderName, String)) {
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: format!("{}@example.com", username),
            password_hash: String::new(),
            created_at: Utc::now(),
        };
        let token = issue_token(&user, TEST_SECRET, 60).unwrap();
        (user.id, (header::AUTHORIZATION, format!("Bearer {}", token)))
    }

    macro_rules! test_app {
        () => {
            actix_web::test::init_service(
                actix_web::App::new()
                    .app_data(actix_web::web::Data::new($crate::test_support::lazy_pool()))
                    .app_data(actix_web::web::Data::new($crate::test_support::test_config()))
                    .configure($crate::init_routes),
            )
        };
    }
    pub(crate) use test_app;
}

#[cfg(test)]
mod tests {
    use crate::test_support::test_app;
    use actix_web::{http::StatusCode, test};
    use serde_json::Value;

    #[actix_web::test]
    async fn malformed_path_id_gets_a_json_error() {
        let app = test_app!().await;

        for uri in ["/user/not-a-uuid", "/api/profile/42"] {
            let req = test::TestRequest::get().uri(uri).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
            let body: Value = test::read_body_json(resp).await;
            assert!(body["error"].as_str().unwrap().starts_with("Invalid path parameter"));
        }
    }
}
