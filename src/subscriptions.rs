// src/subscriptions.rs
use crate::auth::AuthUser;
use crate::db;
use crate::error::{AppError, AppResult};
use actix_web::{HttpResponse, get, post, web};
use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde_json::json;
use sqlx::PgPool;

pub const SUBSCRIPTION_PRICE_CENTS: i64 = 999;
pub const SUBSCRIPTION_DAYS: i64 = 30;

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(purchase_subscription);
    cfg.service(get_active_subscription);
}

/// Start and end of a subscription bought at `now`. Truncated to
/// microseconds so both ends survive the round trip through Postgres intact.
pub fn subscription_period(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let started_at = now.trunc_subsecs(6);
    (started_at, started_at + Duration::days(SUBSCRIPTION_DAYS))
}

#[post("/subscribe")]
pub async fn purchase_subscription(
    pool: web::Data<PgPool>,
    identity: AuthUser,
) -> AppResult<HttpResponse> {
    let (started_at, end_date) = subscription_period(Utc::now());

    let subscription = db::create_subscription_purchase(
        &pool,
        identity.id,
        SUBSCRIPTION_PRICE_CENTS,
        started_at,
        end_date,
    )
    .await
    .map_err(|e| AppError::from(e).on_missing("User not found"))?;

    tracing::info!(
        "User {} purchased subscription {} until {}",
        identity.id,
        subscription.id,
        subscription.end_date
    );
    Ok(HttpResponse::Created().json(json!({
        "message": "Subscription purchased successfully",
        "subscription": subscription,
    })))
}

#[get("/subscriptions")]
pub async fn get_active_subscription(
    pool: web::Data<PgPool>,
    identity: AuthUser,
) -> AppResult<HttpResponse> {
    let subscription = db::get_active_subscription(&pool, identity.id)
        .await?
        .ok_or_else(|| AppError::NotFound("No active subscription found".to_string()))?;
    Ok(HttpResponse::Ok().json(subscription))
}
