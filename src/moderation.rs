// src/moderation.rs
use crate::auth::AuthUser;
use crate::db::{self, ResolveOutcome};
use crate::error::{AppError, AppResult};
use crate::models::{CreateReportRequest, ModeratorAction, ModeratorActionRequest, require_content};
use actix_web::{HttpResponse, get, post, web};
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use sqlx::PgPool;

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(create_report);
    cfg.service(list_reports);
    cfg.service(take_action);
}

#[post("/reports")]
pub async fn create_report(
    pool: web::Data<PgPool>,
    identity: AuthUser,
    req: web::Json<CreateReportRequest>,
) -> AppResult<HttpResponse> {
    let reported_id = req
        .reported_id
        .ok_or_else(|| AppError::Validation("reportedId is required".to_string()))?;
    if reported_id == identity.id {
        return Err(AppError::Validation(
            "You cannot report yourself".to_string(),
        ));
    }
    let reason = require_content(&req.report_reason, "reportReason")?;

    let (report, tokens_left) =
        db::create_report_spending_token(&pool, identity.id, reported_id, reason)
            .await
            .map_err(|e| AppError::from(e).on_missing("Reported user not found"))?
            .ok_or_else(|| {
                AppError::Forbidden("Not enough ban tokens to file a report".to_string())
            })?;

    tracing::info!(
        "User {} reported {} ({} ban tokens left)",
        identity.id,
        reported_id,
        tokens_left
    );
    Ok(HttpResponse::Created().json(json!({
        "message": "Report submitted",
        "report": report,
        "ban_tokens_left": tokens_left,
    })))
}

async fn require_moderator(pool: &PgPool, identity: &AuthUser) -> AppResult<()> {
    if db::is_moderator(pool, identity.id).await? {
        Ok(())
    } else {
        Err(AppError::Forbidden("Moderator access required".to_string()))
    }
}

#[get("/moderator/reports")]
pub async fn list_reports(pool: web::Data<PgPool>, identity: AuthUser) -> AppResult<HttpResponse> {
    require_moderator(&pool, &identity).await?;
    let reports = db::list_reports_for_moderation(&pool).await?;
    Ok(HttpResponse::Ok().json(reports))
}

/// End of a ban of `days` starting at `from`, rejecting durations chrono
/// cannot represent.
fn ban_end_date(from: DateTime<Utc>, days: i64) -> AppResult<DateTime<Utc>> {
    Duration::try_days(days)
        .and_then(|span| from.checked_add_signed(span))
        .ok_or_else(|| AppError::Validation("banDuration is too large".to_string()))
}

#[post("/moderator/actions")]
pub async fn take_action(
    pool: web::Data<PgPool>,
    identity: AuthUser,
    req: web::Json<ModeratorActionRequest>,
) -> AppResult<HttpResponse> {
    require_moderator(&pool, &identity).await?;

    let (report_id, action) = req.parse()?;
    let ban_until = match action {
        ModeratorAction::Ban { days } => Some(ban_end_date(Utc::now(), days)?),
        ModeratorAction::Reject => None,
    };

    match db::resolve_report(&pool, report_id, identity.id, ban_until).await? {
        ResolveOutcome::Resolved(report) => {
            tracing::info!(
                "Moderator {} resolved report {} as {}",
                identity.id,
                report.id,
                report.status
            );
            Ok(HttpResponse::Ok().json(json!({
                "message": "Moderator action applied",
                "report": report,
                "ban_until": ban_until,
            })))
        }
        ResolveOutcome::NotFound => Err(AppError::NotFound("Report not found".to_string())),
        ResolveOutcome::AlreadyResolved => {
            tracing::warn!(
                "Moderator {} tried to resolve already resolved report {}",
                identity.id,
                report_id
            );
            Err(AppError::Validation("Report already resolved".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{bearer_for, test_app};
    use actix_web::{http::StatusCode, test};
    use uuid::Uuid;

    #[::core::prelude::v1::test]
    fn ban_end_date_adds_whole_days() {
        let from = Utc::now();
        assert_eq!(ban_end_date(from, 7).unwrap() - from, Duration::days(7));
        assert!(ban_end_date(from, i64::MAX).is_err());
    }

    #[actix_web::test]
    async fn reporting_yourself_is_rejected() {
        let app = test_app!().await;
        let (id, auth) = bearer_for("alice");

        let req = test::TestRequest::post()
            .uri("/reports")
            .insert_header(auth)
            .set_json(json!({"reportedId": id, "reportReason": "spam"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn report_needs_a_reason() {
        let app = test_app!().await;
        let (_, auth) = bearer_for("alice");

        let req = test::TestRequest::post()
            .uri("/reports")
            .insert_header(auth)
            .set_json(json!({"reportedId": Uuid::new_v4()}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn moderator_routes_require_a_token() {
        let app = test_app!().await;

        let req = test::TestRequest::get().uri("/moderator/reports").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::post()
            .uri("/moderator/actions")
            .set_json(json!({"reportId": Uuid::new_v4(), "action": "reject"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
