// src/auth.rs
use crate::config::Config;
use crate::db;
use crate::error::{AppError, AppResult};
use crate::models::{Claims, LoginRequest, PublicUser, RegisterRequest, User, require_text};
use actix_web::{FromRequest, HttpRequest, HttpResponse, dev::Payload, http::header, post, web};
use bcrypt::{DEFAULT_COST, hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde_json::json;
use sqlx::PgPool;
use std::future::{Ready, ready};
use uuid::Uuid;

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(register);
    cfg.service(login);
}

/// Identity decoded from a valid bearer token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    pub username: String,
}

impl AuthUser {
    /// Fails with 403 unless `id` is the caller's own id.
    pub fn ensure_self(&self, id: Uuid) -> AppResult<()> {
        if self.id == id {
            Ok(())
        } else {
            Err(AppError::Forbidden("Access denied".to_string()))
        }
    }
}

impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(authenticate(req))
    }
}

fn authenticate(req: &HttpRequest) -> AppResult<AuthUser> {
    let config = req
        .app_data::<web::Data<Config>>()
        .ok_or_else(|| AppError::Internal("configuration is not registered".to_string()))?;

    let token = bearer_token(req)
        .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))?;

    verify_token(token, &config.jwt_secret)
}

fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

pub fn issue_token(user: &User, secret: &str, ttl_minutes: i64) -> AppResult<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: user.id.to_string(),
        username: user.username.clone(),
        iat: now.timestamp() as usize,
        exp: (now + Duration::minutes(ttl_minutes)).timestamp() as usize,
    };
    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

/// Checks signature and expiry. Every failure collapses to the same 401.
pub fn verify_token(token: &str, secret: &str) -> AppResult<AuthUser> {
    let invalid = || AppError::Unauthorized("Invalid or expired token".to_string());

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::debug!("Rejected bearer token: {}", e);
        invalid()
    })?;

    let id = Uuid::parse_str(&data.claims.sub).map_err(|_| invalid())?;
    Ok(AuthUser {
        id,
        username: data.claims.username,
    })
}

#[post("/register")]
pub async fn register(
    pool: web::Data<PgPool>,
    req: web::Json<RegisterRequest>,
) -> AppResult<HttpResponse> {
    let username = require_text(&req.username, "username")?;
    let email = require_text(&req.email, "email")?;
    let password = req
        .password
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::Validation("password is required".to_string()))?;

    let password = password.to_string();
    let password_hash = web::block(move || hash(password, DEFAULT_COST)).await??;

    let new_user = User {
        id: Uuid::new_v4(),
        username: username.to_string(),
        email: email.to_string(),
        password_hash,
        created_at: Utc::now(),
    };

    db::create_user_with_stats(&pool, &new_user)
        .await
        .map_err(|e| AppError::from(e).on_conflict("Username or email already exists"))?;

    tracing::info!("Registered user {}", new_user.id);
    Ok(HttpResponse::Created().json(json!({
        "message": "User registered successfully",
        "user": PublicUser::from(&new_user),
    })))
}

#[post("/login")]
pub async fn login(
    pool: web::Data<PgPool>,
    config: web::Data<Config>,
    req: web::Json<LoginRequest>,
) -> AppResult<HttpResponse> {
    let email = require_text(&req.email, "email")?;
    let password = req
        .password
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::Validation("password is required".to_string()))?;

    let invalid = || AppError::Unauthorized("Invalid email or password".to_string());

    let user = db::get_user_by_email(&pool, email)
        .await?
        .ok_or_else(invalid)?;

    let password = password.to_string();
    let stored_hash = user.password_hash.clone();
    match web::block(move || verify(password, &stored_hash)).await? {
        Ok(true) => {}
        Ok(false) => return Err(invalid()),
        Err(e) => {
            tracing::error!("Stored hash for user {} is unreadable: {}", user.id, e);
            return Err(invalid());
        }
    }

    let token = issue_token(&user, &config.jwt_secret, config.token_ttl_minutes)?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Login successful",
        "token": token,
        "user": PublicUser::from(&user),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{lazy_pool, test_config};
    use actix_web::{App, http::StatusCode, test};

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            username: "alice".to_string(),
            email: "a@x.com".to_string(),
            password_hash: String::new(),
            created_at: Utc::now(),
        }
    }

    #[::core::prelude::v1::test]
    fn issued_token_round_trips_identity() {
        let user = sample_user();
        let token = issue_token(&user, "secret", 60).unwrap();
        let identity = verify_token(&token, "secret").unwrap();
        assert_eq!(identity.id, user.id);
        assert_eq!(identity.username, "alice");
    }

    #[::core::prelude::v1::test]
    fn token_signed_with_other_secret_is_rejected() {
        let token = issue_token(&sample_user(), "secret", 60).unwrap();
        assert!(matches!(
            verify_token(&token, "another"),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[::core::prelude::v1::test]
    fn expired_token_is_rejected() {
        let token = issue_token(&sample_user(), "secret", -120).unwrap();
        assert!(matches!(
            verify_token(&token, "secret"),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[::core::prelude::v1::test]
    fn garbage_token_is_rejected() {
        assert!(matches!(
            verify_token("not.a.jwt", "secret"),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[actix_web::test]
    async fn extractor_requires_bearer_scheme() {
        let config = test_config();
        let token = issue_token(&sample_user(), &config.jwt_secret, 60).unwrap();

        let req = test::TestRequest::default()
            .app_data(web::Data::new(config.clone()))
            .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
            .to_http_request();
        let identity = AuthUser::extract(&req).await.unwrap();
        assert_eq!(identity.username, "alice");

        let req = test::TestRequest::default()
            .app_data(web::Data::new(config.clone()))
            .insert_header((header::AUTHORIZATION, format!("Basic {}", token)))
            .to_http_request();
        assert!(AuthUser::extract(&req).await.is_err());

        let req = test::TestRequest::default()
            .app_data(web::Data::new(config))
            .to_http_request();
        assert!(AuthUser::extract(&req).await.is_err());
    }

    #[::core::prelude::v1::test]
    fn ensure_self_forbids_other_ids() {
        let identity = AuthUser {
            id: Uuid::new_v4(),
            username: "alice".to_string(),
        };
        assert!(identity.ensure_self(identity.id).is_ok());
        assert!(matches!(
            identity.ensure_self(Uuid::new_v4()),
            Err(AppError::Forbidden(_))
        ));
    }

    #[actix_web::test]
    async fn register_rejects_missing_fields() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(test_config()))
                .configure(crate::init_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/register")
            .set_json(json!({"username": "alice", "email": "a@x.com"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/register")
            .set_json(json!({"username": "  ", "email": "a@x.com", "password": "pw123"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn login_rejects_missing_fields() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(test_config()))
                .configure(crate::init_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/login")
            .set_json(json!({"email": "a@x.com"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn malformed_json_is_a_bad_request() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(test_config()))
                .configure(crate::init_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/login")
            .insert_header((header::CONTENT_TYPE, "application/json"))
            .set_payload("{not json")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
