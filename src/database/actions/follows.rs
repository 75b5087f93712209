use std::collections::HashMap;

use sqlx::{Pool, Postgres};

use crate::{
    authentication::{jwt::SessionData, permissions::ActionType},
    error::{ApiError, QueryError, NON_FIELD_ERRORS},
    media::Media,
    pagination::{PageContext, PageWindow},
    schema::{Id, RecipeShortRow, RecipeShortView, SubscriptionView, UserRow, UserView},
};

use super::{recipes::to_short_view, users::get_user_view};

/// `recipes_limit` must be a non-negative integer when present.
pub fn parse_recipes_limit(value: Option<&str>) -> Result<Option<i64>, ApiError> {
    match value.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => match value.parse::<i64>() {
            Ok(limit) if limit >= 0 => Ok(Some(limit)),
            _ => Err(ApiError::field(
                "recipes_limit",
                "Ensure this value is a non-negative integer",
            )),
        },
        None => Ok(None),
    }
}

/// Newest recipes (capped at `limit`) and recipe totals for each author.
async fn list_author_recipes(
    author_ids: &[Id],
    limit: Option<i64>,
    pool: &Pool<Postgres>,
    media: &Media,
) -> Result<(HashMap<Id, Vec<RecipeShortView>>, HashMap<Id, i64>), ApiError> {
    if author_ids.is_empty() {
        return Ok((HashMap::new(), HashMap::new()));
    }

    let rows: Vec<RecipeShortRow> = sqlx::query_as(
        "
        SELECT id, author_id, name, image, cooking_time FROM (
            SELECT r.id, r.author_id, r.name, r.image, r.cooking_time,
                ROW_NUMBER() OVER (PARTITION BY r.author_id ORDER BY r.pub_date DESC, r.id DESC) AS position
            FROM recipes r
            WHERE r.author_id = ANY($1)
        ) ranked
        WHERE $2::BIGINT IS NULL OR position <= $2
        ORDER BY author_id, position
    ",
    )
    .bind(author_ids)
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    let counts: Vec<(Id, i64)> = sqlx::query_as(
        "SELECT author_id, COUNT(*) FROM recipes WHERE author_id = ANY($1) GROUP BY author_id",
    )
    .bind(author_ids)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    let mut recipes: HashMap<Id, Vec<RecipeShortView>> = HashMap::new();
    rows.into_iter().for_each(|row| {
        recipes
            .entry(row.author_id)
            .or_default()
            .push(to_short_view(row, media))
    });

    Ok((recipes, counts.into_iter().collect()))
}

async fn subscription_views(
    users: Vec<UserView>,
    recipes_limit: Option<i64>,
    pool: &Pool<Postgres>,
    media: &Media,
) -> Result<Vec<SubscriptionView>, ApiError> {
    let author_ids: Vec<Id> = users.iter().map(|user| user.id).collect();
    let (mut recipes, counts) = list_author_recipes(&author_ids, recipes_limit, pool, media).await?;

    Ok(users
        .into_iter()
        .map(|user| SubscriptionView {
            recipes: recipes.remove(&user.id).unwrap_or_default(),
            recipes_count: counts.get(&user.id).copied().unwrap_or(0),
            user,
        })
        .collect())
}

pub async fn subscribe(
    session: &SessionData,
    following_id: Id,
    recipes_limit: Option<i64>,
    pool: &Pool<Postgres>,
    media: &Media,
) -> Result<SubscriptionView, ApiError> {
    session.authenticate(ActionType::ManageOwnRelations)?;

    if following_id == session.user_id {
        return Err(ApiError::field(
            NON_FIELD_ERRORS,
            "You cannot subscribe to yourself",
        ));
    }

    let mut tr = pool
        .begin()
        .await
        .map_err(|_| QueryError::new("Could not start transaction"))?;

    let exists: Option<(Id,)> = sqlx::query_as("SELECT id FROM users WHERE id = $1 FOR SHARE")
        .bind(following_id)
        .fetch_optional(&mut *tr)
        .await
        .map_err(QueryError::from)?;
    if exists.is_none() {
        return Err(ApiError::not_found("User"));
    }

    sqlx::query("INSERT INTO follows (follower_id, following_id) VALUES ($1, $2)")
        .bind(session.user_id)
        .bind(following_id)
        .execute(&mut *tr)
        .await
        .map_err(QueryError::from)?;

    tr.commit()
        .await
        .map_err(|_| QueryError::new("Could not commit transaction"))?;

    log::info!("User {} subscribed to {}", session.user_id, following_id);

    let user = get_user_view(following_id, Some(session.user_id), pool).await?;
    subscription_views(vec![user], recipes_limit, pool, media)
        .await?
        .pop()
        .ok_or_else(|| ApiError::not_found("User"))
}

pub async fn unsubscribe(
    session: &SessionData,
    following_id: Id,
    pool: &Pool<Postgres>,
) -> Result<(), ApiError> {
    session.authenticate(ActionType::ManageOwnRelations)?;

    let exists: Option<(Id,)> = sqlx::query_as("SELECT id FROM users WHERE id = $1")
        .bind(following_id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;
    if exists.is_none() {
        return Err(ApiError::not_found("User"));
    }

    let result = sqlx::query("DELETE FROM follows WHERE follower_id = $1 AND following_id = $2")
        .bind(session.user_id)
        .bind(following_id)
        .execute(pool)
        .await
        .map_err(QueryError::from)?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound(String::from(
            "You are not subscribed to this user",
        )));
    }

    log::info!("User {} unsubscribed from {}", session.user_id, following_id);
    Ok(())
}

pub async fn fetch_subscriptions(
    session: &SessionData,
    window: PageWindow,
    recipes_limit: Option<i64>,
    pool: &Pool<Postgres>,
    media: &Media,
) -> Result<PageContext<SubscriptionView>, ApiError> {
    let rows: Vec<UserRow> = sqlx::query_as(
        "
        SELECT u.id, u.email, u.username, u.first_name, u.last_name,
            TRUE AS is_subscribed, COUNT(*) OVER() AS count
        FROM follows f
        INNER JOIN users u ON u.id = f.following_id
        WHERE f.follower_id = $1
        ORDER BY f.id
        LIMIT $2 OFFSET $3
    ",
    )
    .bind(session.user_id)
    .bind(window.page_size)
    .bind(window.offset)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    let total_count = rows.first().map(|row| row.count).unwrap_or(0);
    let users = rows.into_iter().map(|row| row.user).collect();
    let subscriptions = subscription_views(users, recipes_limit, pool, media).await?;

    PageContext::from_rows(subscriptions, total_count, window)
}
