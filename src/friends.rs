// src/friends.rs
use crate::auth::AuthUser;
use crate::db::{self, PendingRequestKey};
use crate::error::{AppError, AppResult};
use crate::models::{FriendDecisionRequest, FriendRequest, FriendshipStatus, SendMessageRequest, require_content};
use actix_web::{HttpResponse, get, post, put, web};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(send_request);
    cfg.service(accept_request);
    cfg.service(reject_request);
    cfg.service(list_friends);
    cfg.service(send_message);
    cfg.service(get_conversation);
    cfg.service(find_match);
}

#[post("/friends/request")]
pub async fn send_request(
    pool: web::Data<PgPool>,
    identity: AuthUser,
    req: web::Json<FriendRequest>,
) -> AppResult<HttpResponse> {
    if let Some(sender_id) = req.sender_id {
        if sender_id != identity.id {
            return Err(AppError::Forbidden(
                "Cannot send a friend request on behalf of another user".to_string(),
            ));
        }
    }

    let receiver_id = req
        .receiver_id
        .ok_or_else(|| AppError::Validation("receiverId is required".to_string()))?;

    if receiver_id == identity.id {
        return Err(AppError::Validation(
            "You cannot send a friend request to yourself".to_string(),
        ));
    }

    let conflict = "Friend request already exists";
    if db::friendship_exists(&pool, identity.id, receiver_id).await? {
        return Err(AppError::Conflict(conflict.to_string()));
    }

    // The pair index still guards against a concurrent request slipping in
    // between the check above and this insert.
    let request = db::create_friend_request(&pool, identity.id, receiver_id)
        .await
        .map_err(|e| {
            AppError::from(e)
                .on_conflict(conflict)
                .on_missing("User not found")
        })?;

    Ok(HttpResponse::Created().json(json!({
        "message": "Friend request sent",
        "request": request,
    })))
}

fn pending_key(req: &FriendDecisionRequest) -> AppResult<PendingRequestKey> {
    match (req.friend_request_id, req.sender_id) {
        (Some(id), _) => Ok(PendingRequestKey::Id(id)),
        (None, Some(sender_id)) => Ok(PendingRequestKey::Sender(sender_id)),
        (None, None) => Err(AppError::Validation(
            "senderId or friendRequestId is required".to_string(),
        )),
    }
}

#[put("/friends/accept")]
pub async fn accept_request(
    pool: web::Data<PgPool>,
    identity: AuthUser,
    req: web::Json<FriendDecisionRequest>,
) -> AppResult<HttpResponse> {
    let key = pending_key(&req)?;
    let friendship =
        db::decide_friend_request(&pool, identity.id, key, FriendshipStatus::Accepted)
            .await?
            .ok_or_else(|| AppError::NotFound("Friend request not found".to_string()))?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Friend request accepted",
        "friendship": friendship,
    })))
}

#[put("/friends/reject")]
pub async fn reject_request(
    pool: web::Data<PgPool>,
    identity: AuthUser,
    req: web::Json<FriendDecisionRequest>,
) -> AppResult<HttpResponse> {
    let key = pending_key(&req)?;
    let friendship =
        db::decide_friend_request(&pool, identity.id, key, FriendshipStatus::Rejected)
            .await?
            .ok_or_else(|| AppError::NotFound("Friend request not found".to_string()))?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Friend request rejected",
        "friendship": friendship,
    })))
}

#[get("/friends")]
pub async fn list_friends(pool: web::Data<PgPool>, identity: AuthUser) -> AppResult<HttpResponse> {
    let friends = db::list_friends(&pool, identity.id).await?;
    Ok(HttpResponse::Ok().json(friends))
}

#[post("/messages")]
pub async fn send_message(
    pool: web::Data<PgPool>,
    identity: AuthUser,
    req: web::Json<SendMessageRequest>,
) -> AppResult<HttpResponse> {
    let text = require_content(&req.message_text, "messageText")
        .map_err(|_| AppError::Validation("Message cannot be empty".to_string()))?;
    let receiver_id = req
        .receiver_id
        .ok_or_else(|| AppError::Validation("receiverId is required".to_string()))?;

    let message = db::create_message_between_friends(&pool, identity.id, receiver_id, text)
        .await?
        .ok_or_else(|| {
            AppError::Forbidden("You can only message accepted friends".to_string())
        })?;

    Ok(HttpResponse::Created().json(json!({
        "message": "Message sent",
        "data": message,
    })))
}

#[get("/messages/{friend_id}")]
pub async fn get_conversation(
    pool: web::Data<PgPool>,
    identity: AuthUser,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let friend_id = path.into_inner();

    if !db::are_friends(&pool, identity.id, friend_id).await? {
        return Err(AppError::Forbidden(
            "You can only read conversations with accepted friends".to_string(),
        ));
    }

    let messages = db::get_conversation(&pool, identity.id, friend_id).await?;
    Ok(HttpResponse::Ok().json(messages))
}

#[get("/match")]
pub async fn find_match(pool: web::Data<PgPool>, identity: AuthUser) -> AppResult<HttpResponse> {
    match db::find_random_match(&pool, identity.id).await? {
        Some(candidate) => Ok(HttpResponse::Ok().json(candidate)),
        None => Ok(HttpResponse::NotFound().json(json!({
            "message": "No match available. Try again later."
        }))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{bearer_for, test_app};
    use actix_web::{http::StatusCode, test};

    #[actix_web::test]
    async fn friend_request_to_self_is_rejected() {
        let app = test_app!().await;
        let (id, auth) = bearer_for("alice");

        let req = test::TestRequest::post()
            .uri("/friends/request")
            .insert_header(auth)
            .set_json(json!({"receiverId": id}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn friend_request_to_self_without_token_is_not_accepted() {
        let app = test_app!().await;
        let (id, _) = bearer_for("alice");

        let req = test::TestRequest::post()
            .uri("/friends/request")
            .set_json(json!({"receiverId": id}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn friend_request_for_another_sender_is_forbidden() {
        let app = test_app!().await;
        let (_, auth) = bearer_for("alice");

        let req = test::TestRequest::post()
            .uri("/friends/request")
            .insert_header(auth)
            .set_json(json!({"senderId": Uuid::new_v4(), "receiverId": Uuid::new_v4()}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn accept_needs_a_request_reference() {
        let app = test_app!().await;
        let (_, auth) = bearer_for("bob");

        let req = test::TestRequest::put()
            .uri("/friends/accept")
            .insert_header(auth)
            .set_json(json!({}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn empty_message_is_rejected() {
        let app = test_app!().await;
        let (_, auth) = bearer_for("alice");

        let req = test::TestRequest::post()
            .uri("/messages")
            .insert_header(auth)
            .set_json(json!({"receiverId": Uuid::new_v4(), "messageText": "   "}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[::core::prelude::v1::test]
    fn request_id_wins_over_sender() {
        let id = Uuid::new_v4();
        let body = FriendDecisionRequest {
            sender_id: Some(Uuid::new_v4()),
            friend_request_id: Some(id),
        };
        assert!(matches!(pending_key(&body), Ok(PendingRequestKey::Id(found)) if found == id));
    }
}
