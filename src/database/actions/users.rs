use std::collections::HashMap;

use chrono::Duration;
use sqlx::{Pool, Postgres};

use crate::{
    authentication::{
        cryptography::{hash_password, verify_password},
        jwt::{generate_jwt_session, JwtKey, SessionData},
    },
    error::{ApiError, QueryError, NON_FIELD_ERRORS},
    pagination::{PageContext, PageWindow},
    schema::{CreatedUser, Id, User, UserRow, UserView},
    validation::{Credentials, PasswordChange, Registration},
};

/// User view columns; the viewer is always bound as `$1`.
pub(super) const USER_VIEW_COLUMNS: &str = "
    u.id, u.email, u.username, u.first_name, u.last_name,
    EXISTS(SELECT 1 FROM follows f WHERE f.follower_id = $1 AND f.following_id = u.id) AS is_subscribed
";

pub async fn get_user(pool: &Pool<Postgres>, user_id: Id) -> Result<Option<User>, ApiError> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

pub async fn get_user_by_email(pool: &Pool<Postgres>, email: &str) -> Result<Option<User>, ApiError> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
        .bind(email)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

/// Creates a user, storing only the hashed version of their password
pub async fn register_user(
    registration: Registration,
    pool: &Pool<Postgres>,
) -> Result<CreatedUser, ApiError> {
    let password = hash_password(&registration.password)?;

    let user: CreatedUser = sqlx::query_as(
        "
        INSERT INTO users (email, username, first_name, last_name, password)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, email, username, first_name, last_name
    ",
    )
    .bind(&registration.email)
    .bind(&registration.username)
    .bind(&registration.first_name)
    .bind(&registration.last_name)
    .bind(password)
    .fetch_one(pool)
    .await
    .map_err(QueryError::from)?;

    log::info!("Registered user {} ({})", user.username, user.id);
    Ok(user)
}

pub async fn login_user(
    credentials: Credentials,
    key: &JwtKey,
    lifetime: Duration,
    pool: &Pool<Postgres>,
) -> Result<String, ApiError> {
    let invalid = || ApiError::field(NON_FIELD_ERRORS, "Unable to log in with provided credentials");

    let user = get_user_by_email(pool, &credentials.email)
        .await?
        .ok_or_else(invalid)?;

    if !verify_password(&credentials.password, &user.password)? {
        return Err(invalid());
    }

    generate_jwt_session(&user, key, lifetime)
}

pub async fn set_password(
    session: &SessionData,
    change: PasswordChange,
    pool: &Pool<Postgres>,
) -> Result<(), ApiError> {
    let user = get_user(pool, session.user_id)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    if !verify_password(&change.current_password, &user.password)? {
        return Err(ApiError::field("current_password", "Wrong password"));
    }

    let password = hash_password(&change.new_password)?;
    sqlx::query("UPDATE users SET password = $1 WHERE id = $2")
        .bind(password)
        .bind(user.id)
        .execute(pool)
        .await
        .map_err(QueryError::from)?;

    log::info!("User {} changed their password", user.id);
    Ok(())
}

pub async fn get_user_view(
    user_id: Id,
    viewer: Option<Id>,
    pool: &Pool<Postgres>,
) -> Result<UserView, ApiError> {
    let row: Option<UserView> =
        sqlx::query_as(&format!("SELECT {USER_VIEW_COLUMNS} FROM users u WHERE u.id = $2"))
            .bind(viewer)
            .bind(user_id)
            .fetch_optional(pool)
            .await
            .map_err(QueryError::from)?;

    row.ok_or_else(|| ApiError::not_found("User"))
}

pub async fn fetch_users(
    window: PageWindow,
    viewer: Option<Id>,
    pool: &Pool<Postgres>,
) -> Result<PageContext<UserView>, ApiError> {
    let rows: Vec<UserRow> = sqlx::query_as(&format!(
        "SELECT {USER_VIEW_COLUMNS}, COUNT(*) OVER() AS count FROM users u ORDER BY u.id LIMIT $2 OFFSET $3"
    ))
    .bind(viewer)
    .bind(window.page_size)
    .bind(window.offset)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    let total_count = rows.first().map(|row| row.count).unwrap_or(0);
    let users = rows.into_iter().map(|row| row.user).collect();

    PageContext::from_rows(users, total_count, window)
}

/// Batch lookup of authors for a page of recipes.
pub async fn list_user_views(
    ids: &[Id],
    viewer: Option<Id>,
    pool: &Pool<Postgres>,
) -> Result<HashMap<Id, UserView>, ApiError> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<UserView> =
        sqlx::query_as(&format!("SELECT {USER_VIEW_COLUMNS} FROM users u WHERE u.id = ANY($2)"))
            .bind(viewer)
            .bind(ids)
            .fetch_all(pool)
            .await
            .map_err(QueryError::from)?;

    Ok(rows.into_iter().map(|user| (user.id, user)).collect())
}
