// src/feed.rs
use crate::auth::AuthUser;
use crate::db;
use crate::error::{AppError, AppResult};
use crate::models::{CreatePostRequest, optional_content, optional_text, require_text};
use actix_web::{HttpResponse, get, post, web};
use serde_json::json;
use sqlx::PgPool;

const FEED_PAGE_SIZE: i64 = 50;

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(create_post);
    cfg.service(get_feed);
}

#[post("/news")]
pub async fn create_post(
    pool: web::Data<PgPool>,
    identity: AuthUser,
    req: web::Json<CreatePostRequest>,
) -> AppResult<HttpResponse> {
    let content_type = require_text(&req.content_type, "contentType")?;
    let content_url = optional_text(&req.content_url);
    let content_text = optional_content(&req.content_text);

    if content_url.is_none() && content_text.is_none() {
        return Err(AppError::Validation(
            "contentUrl or contentText is required".to_string(),
        ));
    }

    let post = db::create_post(&pool, identity.id, content_type, content_url, content_text).await?;

    Ok(HttpResponse::Created().json(json!({
        "message": "Post added to the feed",
        "post": post,
    })))
}

/// Newest posts first, across all authors.
#[get("/news")]
pub async fn get_feed(pool: web::Data<PgPool>, _identity: AuthUser) -> AppResult<HttpResponse> {
    let items = db::get_recent_feed(&pool, FEED_PAGE_SIZE).await?;
    Ok(HttpResponse::Ok().json(items))
}
