// src/users.rs
use crate::auth::AuthUser;
use crate::db;
use crate::error::{AppError, AppResult};
use crate::models::{UpdateProfileRequest, UpdateUserRequest, UpsertProfileRequest, optional_content, optional_text, require_text};
use actix_web::{HttpResponse, delete, get, post, put, web};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(get_user);
    cfg.service(update_user);
    cfg.service(delete_user);
    cfg.service(get_own_profile);
    cfg.service(get_profile);
    cfg.service(update_profile);
    cfg.service(upsert_profile);
    cfg.service(get_stats);
}

fn user_not_found() -> AppError {
    AppError::NotFound("User not found".to_string())
}

#[get("/user/{id}")]
pub async fn get_user(pool: web::Data<PgPool>, path: web::Path<Uuid>) -> AppResult<HttpResponse> {
    let user = db::get_user_details(&pool, path.into_inner())
        .await?
        .ok_or_else(user_not_found)?;
    Ok(HttpResponse::Ok().json(user))
}

#[put("/user/{id}")]
pub async fn update_user(
    pool: web::Data<PgPool>,
    identity: AuthUser,
    path: web::Path<Uuid>,
    req: web::Json<UpdateUserRequest>,
) -> AppResult<HttpResponse> {
    let user_id = path.into_inner();
    identity.ensure_self(user_id)?;

    let username = require_text(&req.username, "username")?;
    let email = require_text(&req.email, "email")?;

    let user = db::update_user(&pool, user_id, username, email)
        .await
        .map_err(|e| AppError::from(e).on_conflict("Username or email already exists"))?
        .ok_or_else(user_not_found)?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "User updated successfully",
        "user": user,
    })))
}

#[delete("/user/{id}")]
pub async fn delete_user(
    pool: web::Data<PgPool>,
    identity: AuthUser,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let user_id = path.into_inner();
    identity.ensure_self(user_id)?;

    if !db::delete_user(&pool, user_id).await? {
        return Err(user_not_found());
    }

    tracing::info!("Deleted user {}", user_id);
    Ok(HttpResponse::Ok().json(json!({"message": "User deleted successfully"})))
}

#[get("/api/profile")]
pub async fn get_own_profile(
    pool: web::Data<PgPool>,
    identity: AuthUser,
) -> AppResult<HttpResponse> {
    let profile = db::get_user_details(&pool, identity.id)
        .await?
        .ok_or_else(user_not_found)?;
    Ok(HttpResponse::Ok().json(profile))
}

#[get("/api/profile/{id}")]
pub async fn get_profile(
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let profile = db::get_user_details(&pool, path.into_inner())
        .await?
        .ok_or_else(user_not_found)?;
    Ok(HttpResponse::Ok().json(profile))
}

#[put("/api/profile/{id}")]
pub async fn update_profile(
    pool: web::Data<PgPool>,
    identity: AuthUser,
    path: web::Path<Uuid>,
    req: web::Json<UpdateProfileRequest>,
) -> AppResult<HttpResponse> {
    let user_id = path.into_inner();
    identity.ensure_self(user_id)?;

    let profile = db::upsert_profile_summary(
        &pool,
        user_id,
        optional_text(&req.full_name),
        optional_content(&req.bio),
        optional_text(&req.profile_picture_url),
    )
    .await
    .map_err(|e| AppError::from(e).on_missing("User not found"))?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Profile updated successfully",
        "profile": profile,
    })))
}

#[post("/profiles")]
pub async fn upsert_profile(
    pool: web::Data<PgPool>,
    identity: AuthUser,
    req: web::Json<UpsertProfileRequest>,
) -> AppResult<HttpResponse> {
    let (profile, created) = db::upsert_profile_details(
        &pool,
        identity.id,
        optional_text(&req.avatar_url),
        req.birth_date,
        optional_text(&req.gender),
        optional_text(&req.city),
    )
    .await
    .map_err(|e| AppError::from(e).on_missing("User not found"))?;

    if created {
        Ok(HttpResponse::Created().json(json!({
            "message": "Profile created successfully",
            "profile": profile,
        })))
    } else {
        Ok(HttpResponse::Ok().json(json!({
            "message": "Profile updated successfully",
            "profile": profile,
        })))
    }
}

#[get("/stats")]
pub async fn get_stats(pool: web::Data<PgPool>, identity: AuthUser) -> AppResult<HttpResponse> {
    let stats = db::get_user_stats(&pool, identity.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User stats not found".to_string()))?;
    Ok(HttpResponse::Ok().json(stats))
}
