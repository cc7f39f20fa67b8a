// src/db.rs
use crate::models::{
    FeedItem, Friendship, FriendshipStatus, Message, Post, Profile, PublicUser, Report,
    ReportListing, ReportStatus, Subscription, User, UserDetails, UserStats,
};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use std::time::Duration;
use uuid::Uuid;

pub async fn create_pool(
    database_url: &str,
    max_connections: u32,
    acquire_timeout: Duration,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(acquire_timeout)
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

// ---- users ----

pub async fn create_user_with_stats(pool: &PgPool, user: &User) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("INSERT INTO users (id, username, email, password_hash, created_at) VALUES ($1, $2, $3, $4, $5)")
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .execute(&mut *tx)
        .await?;

    sqlx::query("INSERT INTO user_stats (user_id) VALUES ($1)")
        .bind(user.id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await
}

pub async fn get_user_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "SELECT id, username, email, password_hash, created_at FROM users WHERE email = $1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await
}

pub async fn get_user_details(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Option<UserDetails>, sqlx::Error> {
    sqlx::query_as::<_, UserDetails>(
        "SELECT u.id, u.username, u.email, p.full_name, p.bio, p.avatar_url, p.birth_date, p.gender, p.city \
         FROM users AS u LEFT JOIN user_profiles AS p ON p.user_id = u.id \
         WHERE u.id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

pub async fn update_user(
    pool: &PgPool,
    user_id: Uuid,
    username: &str,
    email: &str,
) -> Result<Option<PublicUser>, sqlx::Error> {
    sqlx::query_as::<_, PublicUser>(
        "UPDATE users SET username = $1, email = $2 WHERE id = $3 RETURNING id, username, email",
    )
    .bind(username)
    .bind(email)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

pub async fn delete_user(pool: &PgPool, user_id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// ---- profiles & stats ----

const PROFILE_COLUMNS: &str =
    "user_id, full_name, bio, avatar_url, birth_date, gender, city, updated_at";

#[derive(FromRow)]
struct UpsertedProfile {
    #[sqlx(flatten)]
    profile: Profile,
    inserted: bool,
}

pub async fn upsert_profile_summary(
    pool: &PgPool,
    user_id: Uuid,
    full_name: Option<&str>,
    bio: Option<&str>,
    avatar_url: Option<&str>,
) -> Result<Profile, sqlx::Error> {
    let query = format!(
        "INSERT INTO user_profiles (user_id, full_name, bio, avatar_url) VALUES ($1, $2, $3, $4) \
         ON CONFLICT (user_id) DO UPDATE SET full_name = EXCLUDED.full_name, bio = EXCLUDED.bio, \
         avatar_url = EXCLUDED.avatar_url, updated_at = NOW() \
         RETURNING {}",
        PROFILE_COLUMNS
    );
    sqlx::query_as::<_, Profile>(&query)
        .bind(user_id)
        .bind(full_name)
        .bind(bio)
        .bind(avatar_url)
        .fetch_one(pool)
        .await
}

// `xmax = 0` only holds for a freshly inserted tuple.
pub async fn upsert_profile_details(
    pool: &PgPool,
    user_id: Uuid,
    avatar_url: Option<&str>,
    birth_date: Option<NaiveDate>,
    gender: Option<&str>,
    city: Option<&str>,
) -> Result<(Profile, bool), sqlx::Error> {
    let query = format!(
        "INSERT INTO user_profiles (user_id, avatar_url, birth_date, gender, city) VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (user_id) DO UPDATE SET avatar_url = EXCLUDED.avatar_url, birth_date = EXCLUDED.birth_date, \
         gender = EXCLUDED.gender, city = EXCLUDED.city, updated_at = NOW() \
         RETURNING {}, (xmax = 0) AS inserted",
        PROFILE_COLUMNS
    );
    let row = sqlx::query_as::<_, UpsertedProfile>(&query)
        .bind(user_id)
        .bind(avatar_url)
        .bind(birth_date)
        .bind(gender)
        .bind(city)
        .fetch_one(pool)
        .await?;
    Ok((row.profile, row.inserted))
}

pub async fn get_user_stats(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Option<UserStats>, sqlx::Error> {
    sqlx::query_as::<_, UserStats>(
        "SELECT lives, ban_tokens, trial_time_spent FROM user_stats WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

pub async fn is_moderator(pool: &PgPool, user_id: Uuid) -> Result<bool, sqlx::Error> {
    let flag: Option<bool> =
        sqlx::query_scalar("SELECT is_moderator FROM user_stats WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await?;
    Ok(flag.unwrap_or(false))
}

// ---- friendships ----

const FRIENDSHIP_COLUMNS: &str = "id, sender_id, receiver_id, status, created_at, updated_at";

// Either direction, any status.
pub async fn friendship_exists(pool: &PgPool, a: Uuid, b: Uuid) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM friends \
         WHERE (sender_id = $1 AND receiver_id = $2) OR (sender_id = $2 AND receiver_id = $1))",
    )
    .bind(a)
    .bind(b)
    .fetch_one(pool)
    .await
}

pub async fn are_friends(pool: &PgPool, a: Uuid, b: Uuid) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM friends WHERE status = $3 \
         AND ((sender_id = $1 AND receiver_id = $2) OR (sender_id = $2 AND receiver_id = $1)))",
    )
    .bind(a)
    .bind(b)
    .bind(FriendshipStatus::Accepted.as_str())
    .fetch_one(pool)
    .await
}

pub async fn create_friend_request(
    pool: &PgPool,
    sender_id: Uuid,
    receiver_id: Uuid,
) -> Result<Friendship, sqlx::Error> {
    let query = format!(
        "INSERT INTO friends (id, sender_id, receiver_id, status) VALUES ($1, $2, $3, $4) RETURNING {}",
        FRIENDSHIP_COLUMNS
    );
    sqlx::query_as::<_, Friendship>(&query)
        .bind(Uuid::new_v4())
        .bind(sender_id)
        .bind(receiver_id)
        .bind(FriendshipStatus::Pending.as_str())
        .fetch_one(pool)
        .await
}

#[derive(Clone, Copy, Debug)]
pub enum PendingRequestKey {
    Id(Uuid),
    Sender(Uuid),
}

pub async fn decide_friend_request(
    pool: &PgPool,
    receiver_id: Uuid,
    key: PendingRequestKey,
    status: FriendshipStatus,
) -> Result<Option<Friendship>, sqlx::Error> {
    let (request_id, sender_id) = match key {
        PendingRequestKey::Id(id) => (Some(id), None),
        PendingRequestKey::Sender(id) => (None, Some(id)),
    };
    let query = format!(
        "UPDATE friends SET status = $1, updated_at = NOW() \
         WHERE receiver_id = $2 AND status = $3 AND (id = $4 OR sender_id = $5) \
         RETURNING {}",
        FRIENDSHIP_COLUMNS
    );
    sqlx::query_as::<_, Friendship>(&query)
        .bind(status.as_str())
        .bind(receiver_id)
        .bind(FriendshipStatus::Pending.as_str())
        .bind(request_id)
        .bind(sender_id)
        .fetch_optional(pool)
        .await
}

pub async fn list_friends(pool: &PgPool, user_id: Uuid) -> Result<Vec<PublicUser>, sqlx::Error> {
    sqlx::query_as::<_, PublicUser>(
        "SELECT DISTINCT u.id, u.username, u.email FROM friends AS f \
         JOIN users AS u ON u.id = CASE WHEN f.sender_id = $1 THEN f.receiver_id ELSE f.sender_id END \
         WHERE (f.sender_id = $1 OR f.receiver_id = $1) AND f.status = $2 \
         ORDER BY u.username",
    )
    .bind(user_id)
    .bind(FriendshipStatus::Accepted.as_str())
    .fetch_all(pool)
    .await
}

pub async fn find_random_match(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Option<UserDetails>, sqlx::Error> {
    sqlx::query_as::<_, UserDetails>(
        "SELECT u.id, u.username, u.email, p.full_name, p.bio, p.avatar_url, p.birth_date, p.gender, p.city \
         FROM users AS u LEFT JOIN user_profiles AS p ON p.user_id = u.id \
         WHERE u.id <> $1 AND NOT EXISTS ( \
             SELECT 1 FROM friends AS f WHERE f.status = $2 \
             AND ((f.sender_id = $1 AND f.receiver_id = u.id) OR (f.receiver_id = $1 AND f.sender_id = u.id))) \
         ORDER BY RANDOM() LIMIT 1",
    )
    .bind(user_id)
    .bind(FriendshipStatus::Accepted.as_str())
    .fetch_optional(pool)
    .await
}

// ---- messages ----

// `None` when the pair are not accepted friends.
pub async fn create_message_between_friends(
    pool: &PgPool,
    sender_id: Uuid,
    receiver_id: Uuid,
    content: &str,
) -> Result<Option<Message>, sqlx::Error> {
    sqlx::query_as::<_, Message>(
        "INSERT INTO messages (id, sender_id, receiver_id, content) \
         SELECT $1, $2, $3, $4 WHERE EXISTS ( \
             SELECT 1 FROM friends WHERE status = $5 \
             AND ((sender_id = $2 AND receiver_id = $3) OR (sender_id = $3 AND receiver_id = $2))) \
         RETURNING id, sender_id, receiver_id, content, created_at",
    )
    .bind(Uuid::new_v4())
    .bind(sender_id)
    .bind(receiver_id)
    .bind(content)
    .bind(FriendshipStatus::Accepted.as_str())
    .fetch_optional(pool)
    .await
}

pub async fn get_conversation(
    pool: &PgPool,
    a: Uuid,
    b: Uuid,
) -> Result<Vec<Message>, sqlx::Error> {
    sqlx::query_as::<_, Message>(
        "SELECT id, sender_id, receiver_id, content, created_at FROM messages \
         WHERE (sender_id = $1 AND receiver_id = $2) OR (sender_id = $2 AND receiver_id = $1) \
         ORDER BY created_at ASC, id ASC",
    )
    .bind(a)
    .bind(b)
    .fetch_all(pool)
    .await
}

// ---- news feed ----

pub async fn create_post(
    pool: &PgPool,
    author_id: Uuid,
    content_type: &str,
    content_url: Option<&str>,
    content_text: Option<&str>,
) -> Result<Post, sqlx::Error> {
    sqlx::query_as::<_, Post>(
        "INSERT INTO news_feed (id, author_id, content_type, content_url, content_text) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING id, author_id, content_type, content_url, content_text, created_at",
    )
    .bind(Uuid::new_v4())
    .bind(author_id)
    .bind(content_type)
    .bind(content_url)
    .bind(content_text)
    .fetch_one(pool)
    .await
}

pub async fn get_recent_feed(pool: &PgPool, limit: i64) -> Result<Vec<FeedItem>, sqlx::Error> {
    sqlx::query_as::<_, FeedItem>(
        "SELECT n.id, n.author_id, u.username, n.content_type, n.content_url, n.content_text, n.created_at \
         FROM news_feed AS n JOIN users AS u ON n.author_id = u.id \
         ORDER BY n.created_at DESC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}

// ---- reports & moderation ----

const REPORT_COLUMNS: &str =
    "id, reporter_id, reported_id, reason, status, moderator_id, created_at, resolved_at";

/// Spends one ban token and files the report in one transaction. `None`
/// means no token was left and nothing was written.
pub async fn create_report_spending_token(
    pool: &PgPool,
    reporter_id: Uuid,
    reported_id: Uuid,
    reason: &str,
) -> Result<Option<(Report, i32)>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let remaining: Option<i32> = sqlx::query_scalar(
        "UPDATE user_stats SET ban_tokens = ban_tokens - 1 \
         WHERE user_id = $1 AND ban_tokens > 0 RETURNING ban_tokens",
    )
    .bind(reporter_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(remaining) = remaining else {
        return Ok(None);
    };

    let query = format!(
        "INSERT INTO reports (id, reporter_id, reported_id, reason, status) VALUES ($1, $2, $3, $4, $5) RETURNING {}",
        REPORT_COLUMNS
    );
    let report = sqlx::query_as::<_, Report>(&query)
        .bind(Uuid::new_v4())
        .bind(reporter_id)
        .bind(reported_id)
        .bind(reason)
        .bind(ReportStatus::Pending.as_str())
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(Some((report, remaining)))
}

pub async fn list_reports_for_moderation(
    pool: &PgPool,
) -> Result<Vec<ReportListing>, sqlx::Error> {
    sqlx::query_as::<_, ReportListing>(
        "SELECT r.id, r.reporter_id, reporter.username AS reporter_username, \
                r.reported_id, reported.username AS reported_username, \
                r.reason, r.status, r.created_at \
         FROM reports AS r \
         JOIN users AS reporter ON reporter.id = r.reporter_id \
         JOIN users AS reported ON reported.id = r.reported_id \
         ORDER BY (r.status = $1) DESC, r.created_at DESC",
    )
    .bind(ReportStatus::Pending.as_str())
    .fetch_all(pool)
    .await
}

#[derive(Debug)]
pub enum ResolveOutcome {
    Resolved(Report),
    NotFound,
    AlreadyResolved,
}

/// Resolves a pending report. With `ban_until` set the report is approved,
/// a ban row is written and the reported user is flagged; otherwise the
/// report is rejected. The report row stays locked for the whole
/// transaction so two moderators cannot both resolve it.
pub async fn resolve_report(
    pool: &PgPool,
    report_id: Uuid,
    moderator_id: Uuid,
    ban_until: Option<DateTime<Utc>>,
) -> Result<ResolveOutcome, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let query = format!("SELECT {} FROM reports WHERE id = $1 FOR UPDATE", REPORT_COLUMNS);
    let report = sqlx::query_as::<_, Report>(&query)
        .bind(report_id)
        .fetch_optional(&mut *tx)
        .await?;

    let Some(report) = report else {
        return Ok(ResolveOutcome::NotFound);
    };
    if report.status != ReportStatus::Pending.as_str() {
        return Ok(ResolveOutcome::AlreadyResolved);
    }

    let status = match ban_until {
        Some(end_date) => {
            sqlx::query(
                "INSERT INTO bans (id, user_id, moderator_id, report_id, end_date) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(Uuid::new_v4())
            .bind(report.reported_id)
            .bind(moderator_id)
            .bind(report.id)
            .bind(end_date)
            .execute(&mut *tx)
            .await?;

            sqlx::query("UPDATE user_stats SET is_banned = TRUE WHERE user_id = $1")
                .bind(report.reported_id)
                .execute(&mut *tx)
                .await?;

            ReportStatus::Approved
        }
        None => ReportStatus::Rejected,
    };

    let query = format!(
        "UPDATE reports SET status = $1, moderator_id = $2, resolved_at = NOW() WHERE id = $3 RETURNING {}",
        REPORT_COLUMNS
    );
    let resolved = sqlx::query_as::<_, Report>(&query)
        .bind(status.as_str())
        .bind(moderator_id)
        .bind(report.id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(ResolveOutcome::Resolved(resolved))
}

// ---- subscriptions ----

pub async fn create_subscription_purchase(
    pool: &PgPool,
    user_id: Uuid,
    amount_cents: i64,
    started_at: DateTime<Utc>,
    end_date: DateTime<Utc>,
) -> Result<Subscription, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let transaction_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO transactions (id, user_id, type, amount_cents, status, created_at) VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(transaction_id)
    .bind(user_id)
    .bind("subscription_purchase")
    .bind(amount_cents)
    .bind("completed")
    .bind(started_at)
    .execute(&mut *tx)
    .await?;

    let subscription = sqlx::query_as::<_, Subscription>(
        "INSERT INTO subscriptions (id, user_id, transaction_id, started_at, end_date, status) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING id, user_id, transaction_id, started_at, end_date, status",
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(transaction_id)
    .bind(started_at)
    .bind(end_date)
    .bind("active")
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(subscription)
}

pub async fn get_active_subscription(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Option<Subscription>, sqlx::Error> {
    sqlx::query_as::<_, Subscription>(
        "SELECT id, user_id, transaction_id, started_at, end_date, status FROM subscriptions \
         WHERE user_id = $1 AND status = 'active' AND end_date > NOW() \
         ORDER BY end_date DESC LIMIT 1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
}
