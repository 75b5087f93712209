use sqlx::{Pool, Postgres};

use crate::{
    authentication::{jwt::SessionData, permissions::ActionType},
    error::{ApiError, QueryError},
    media::Media,
    schema::{Id, RecipeShortRow, RecipeShortView, ShoppingListRow},
    shopping_list::{aggregate, render},
};

use super::recipes::to_short_view;

/// User-to-recipe join tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeRelation {
    Favorite,
    ShoppingCart,
}

impl RecipeRelation {
    fn table(self) -> &'static str {
        match self {
            RecipeRelation::Favorite => "favorites",
            RecipeRelation::ShoppingCart => "shopping_carts",
        }
    }

    fn missing(self) -> &'static str {
        match self {
            RecipeRelation::Favorite => "Recipe is not in favorites",
            RecipeRelation::ShoppingCart => "Recipe is not in the shopping cart",
        }
    }
}

pub async fn add_recipe_relation(
    relation: RecipeRelation,
    session: &SessionData,
    recipe_id: Id,
    pool: &Pool<Postgres>,
    media: &Media,
) -> Result<RecipeShortView, ApiError> {
    session.authenticate(ActionType::ManageOwnRelations)?;

    let mut tr = pool
        .begin()
        .await
        .map_err(|_| QueryError::new("Could not start transaction"))?;

    let recipe: Option<RecipeShortRow> = sqlx::query_as(
        "SELECT id, author_id, name, image, cooking_time FROM recipes WHERE id = $1 FOR SHARE",
    )
    .bind(recipe_id)
    .fetch_optional(&mut *tr)
    .await
    .map_err(QueryError::from)?;
    let recipe = recipe.ok_or_else(|| ApiError::not_found("Recipe"))?;

    // The unique constraint decides duplicates.
    sqlx::query(&format!(
        "INSERT INTO {} (user_id, recipe_id) VALUES ($1, $2)",
        relation.table()
    ))
    .bind(session.user_id)
    .bind(recipe_id)
    .execute(&mut *tr)
    .await
    .map_err(QueryError::from)?;

    tr.commit()
        .await
        .map_err(|_| QueryError::new("Could not commit transaction"))?;

    log::info!(
        "User {} added recipe {} to {}",
        session.user_id,
        recipe_id,
        relation.table()
    );
    Ok(to_short_view(recipe, media))
}

pub async fn remove_recipe_relation(
    relation: RecipeRelation,
    session: &SessionData,
    recipe_id: Id,
    pool: &Pool<Postgres>,
) -> Result<(), ApiError> {
    session.authenticate(ActionType::ManageOwnRelations)?;

    let exists: Option<(Id,)> = sqlx::query_as("SELECT id FROM recipes WHERE id = $1")
        .bind(recipe_id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;
    if exists.is_none() {
        return Err(ApiError::not_found("Recipe"));
    }

    let result = sqlx::query(&format!(
        "DELETE FROM {} WHERE user_id = $1 AND recipe_id = $2",
        relation.table()
    ))
    .bind(session.user_id)
    .bind(recipe_id)
    .execute(pool)
    .await
    .map_err(QueryError::from)?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound(relation.missing().to_owned()));
    }

    log::info!(
        "User {} removed recipe {} from {}",
        session.user_id,
        recipe_id,
        relation.table()
    );
    Ok(())
}

/// Renders the aggregated ingredients of every recipe in the user's cart.
pub async fn download_shopping_list(
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<String, ApiError> {
    session.authenticate(ActionType::ManageOwnRelations)?;

    let rows: Vec<ShoppingListRow> = sqlx::query_as(
        "
        SELECT i.name, i.measurement_unit, ri.amount
        FROM shopping_carts c
        INNER JOIN recipe_ingredients ri ON ri.recipe_id = c.recipe_id
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE c.user_id = $1
    ",
    )
    .bind(session.user_id)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(render(&aggregate(rows)))
}
