use std::collections::{HashMap, HashSet};

use sqlx::{Pool, Postgres, QueryBuilder, Transaction};

use crate::{
    authentication::{jwt::SessionData, permissions::ActionType},
    error::{ApiError, FieldErrors, QueryError},
    form::Form,
    media::Media,
    pagination::{PageContext, PageWindow},
    schema::{
        Id, Recipe, RecipeIngredientRow, RecipeIngredientView, RecipeReadView, RecipeRow,
        RecipeShortRow, RecipeShortView, RecipeTagRow, RecipeWriteView, Tag, UserView,
    },
    validation::{ImagePolicy, IngredientAmount, RecipeDraft, RecipePayload, ValidationRules},
};

use super::users::list_user_views;

const RECIPE_FLAG_COLUMNS: &str = "
    EXISTS(SELECT 1 FROM favorites f WHERE f.recipe_id = r.id AND f.user_id = $1) AS is_favorited,
    EXISTS(SELECT 1 FROM shopping_carts c WHERE c.recipe_id = r.id AND c.user_id = $1) AS is_in_shopping_cart
";

/// `GET /recipes` filters. Repeated `tags` slugs match any of them.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecipeFilters {
    pub author: Option<Id>,
    pub tags: Vec<String>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

impl RecipeFilters {
    pub fn from_pairs(pairs: &[(String, String)]) -> Result<Self, ApiError> {
        let mut filters = Self::default();
        let mut errors = FieldErrors::new();

        for (key, value) in pairs {
            match key.as_str() {
                "author" => match value.trim().parse::<Id>() {
                    Ok(author) => filters.author = Some(author),
                    Err(_) => errors.add("author", "A valid integer is required"),
                },
                "tags" => {
                    let slug = value.trim();
                    if !slug.is_empty() {
                        filters.tags.push(slug.to_owned());
                    }
                }
                "is_favorited" => match parse_flag(value) {
                    Some(flag) => filters.is_favorited = flag,
                    None => errors.add("is_favorited", "Expected 0 or 1"),
                },
                "is_in_shopping_cart" => match parse_flag(value) {
                    Some(flag) => filters.is_in_shopping_cart = flag,
                    None => errors.add("is_in_shopping_cart", "Expected 0 or 1"),
                },
                _ => {}
            }
        }

        errors.into_result()?;
        Ok(filters)
    }

    fn needs_viewer(&self) -> bool {
        self.is_favorited || self.is_in_shopping_cart
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}

// Projections

pub fn to_write_view(recipe: &Recipe, tags: Vec<Id>, ingredients: Vec<IngredientAmount>) -> RecipeWriteView {
    RecipeWriteView {
        id: recipe.id,
        author: recipe.author_id,
        name: recipe.name.to_owned(),
        text: recipe.text.to_owned(),
        cooking_time: recipe.cooking_time,
        image: recipe.image.to_owned(),
        tags,
        ingredients,
    }
}

pub fn to_read_view(
    row: RecipeRow,
    author: UserView,
    tags: Vec<Tag>,
    ingredients: Vec<RecipeIngredientView>,
    viewer: Option<Id>,
    media: &Media,
) -> RecipeReadView {
    let anonymous = viewer.is_none();
    let recipe = row.recipe;

    RecipeReadView {
        id: recipe.id,
        tags,
        author,
        ingredients,
        is_favorited: !anonymous && row.is_favorited,
        is_in_shopping_cart: !anonymous && row.is_in_shopping_cart,
        name: recipe.name,
        image: media.url_for(&recipe.image),
        text: recipe.text,
        cooking_time: recipe.cooking_time,
        pub_date: recipe.pub_date,
    }
}

pub fn to_short_view(row: RecipeShortRow, media: &Media) -> RecipeShortView {
    RecipeShortView {
        id: row.id,
        name: row.name,
        image: media.url_for(&row.image),
        cooking_time: row.cooking_time,
    }
}

// Authoring

/// Reports every tag and ingredient id that doesn't exist.
pub async fn validate_references(
    draft: &RecipeDraft,
    pool: &Pool<Postgres>,
    errors: &mut FieldErrors,
) -> Result<(), ApiError> {
    if let Some(tags) = draft.tags.as_ref().filter(|tags| !tags.is_empty()) {
        let found: Vec<(Id,)> = sqlx::query_as("SELECT id FROM tags WHERE id = ANY($1)")
            .bind(tags)
            .fetch_all(pool)
            .await
            .map_err(QueryError::from)?;
        let found: HashSet<Id> = found.into_iter().map(|row| row.0).collect();

        missing_ids(tags.iter().copied(), &found)
            .for_each(|id| errors.add("tags", format!("Tag {id} does not exist")));
    }

    if let Some(ingredients) = draft.ingredients.as_ref().filter(|list| !list.is_empty()) {
        let ids: Vec<Id> = ingredients.iter().map(|ingredient| ingredient.id).collect();
        let found: Vec<(Id,)> = sqlx::query_as("SELECT id FROM ingredients WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(pool)
            .await
            .map_err(QueryError::from)?;
        let found: HashSet<Id> = found.into_iter().map(|row| row.0).collect();

        missing_ids(ids.into_iter(), &found)
            .for_each(|id| errors.add("ingredients", format!("Ingredient {id} does not exist")));
    }

    Ok(())
}

fn missing_ids<'a>(ids: impl Iterator<Item = Id> + 'a, found: &'a HashSet<Id>) -> impl Iterator<Item = Id> + 'a {
    let mut reported = HashSet::new();
    ids.filter(move |id| !found.contains(id) && reported.insert(*id))
}

/// Extracts, validates and reference-checks a recipe body in one pass.
pub async fn prepare_recipe(
    form: &Form,
    image: ImagePolicy,
    rules: &ValidationRules,
    pool: &Pool<Postgres>,
) -> Result<RecipePayload, ApiError> {
    let mut errors = FieldErrors::new();

    let draft = RecipeDraft::from_form(form, image, &mut errors);
    draft.validate(rules, &mut errors);
    validate_references(&draft, pool, &mut errors).await?;

    draft.into_payload(errors)
}

async fn insert_recipe_parts(
    tr: &mut Transaction<'_, Postgres>,
    recipe_id: Id,
    payload: &RecipePayload,
) -> Result<(), ApiError> {
    let mut query_builder: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO recipe_tags (recipe_id, tag_id) ");
    query_builder.push_values(payload.tags.iter(), |mut b, tag_id| {
        b.push_bind(recipe_id).push_bind(tag_id);
    });
    query_builder
        .build()
        .execute(&mut **tr)
        .await
        .map_err(QueryError::from)?;

    let mut query_builder: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount) ");
    query_builder.push_values(payload.ingredients.iter(), |mut b, ingredient| {
        b.push_bind(recipe_id)
            .push_bind(ingredient.id)
            .push_bind(ingredient.amount);
    });
    query_builder
        .build()
        .execute(&mut **tr)
        .await
        .map_err(QueryError::from)?;

    Ok(())
}

async fn insert_recipe(
    author_id: Id,
    payload: &RecipePayload,
    image: &str,
    pool: &Pool<Postgres>,
) -> Result<Recipe, ApiError> {
    let mut tr = pool
        .begin()
        .await
        .map_err(|_| QueryError::new("Could not start transaction"))?;

    let recipe: Recipe = sqlx::query_as(
        "
        INSERT INTO recipes (author_id, name, text, cooking_time, image)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
    ",
    )
    .bind(author_id)
    .bind(&payload.name)
    .bind(&payload.text)
    .bind(payload.cooking_time)
    .bind(image)
    .fetch_one(&mut *tr)
    .await
    .map_err(QueryError::from)?;

    insert_recipe_parts(&mut tr, recipe.id, payload).await?;

    tr.commit()
        .await
        .map_err(|_| QueryError::new("Could not commit transaction"))?;

    Ok(recipe)
}

pub async fn create_recipe(
    session: &SessionData,
    payload: RecipePayload,
    pool: &Pool<Postgres>,
    media: &Media,
) -> Result<RecipeWriteView, ApiError> {
    session.authenticate(ActionType::CreateRecipes)?;

    let image = match &payload.image {
        Some(image) => media.save(image).await?,
        None => return Err(ApiError::field("image", crate::form::REQUIRED)),
    };

    match insert_recipe(session.user_id, &payload, &image, pool).await {
        Ok(recipe) => {
            log::info!("User {} created recipe {}", session.user_id, recipe.id);
            Ok(to_write_view(&recipe, payload.tags, payload.ingredients))
        }
        Err(e) => {
            media.remove(&image).await;
            Err(e)
        }
    }
}

async fn replace_recipe(
    recipe_id: Id,
    payload: &RecipePayload,
    image: &str,
    pool: &Pool<Postgres>,
) -> Result<Recipe, ApiError> {
    let mut tr = pool
        .begin()
        .await
        .map_err(|_| QueryError::new("Could not start transaction"))?;

    let recipe: Recipe = sqlx::query_as(
        "
        UPDATE recipes SET name = $1, text = $2, cooking_time = $3, image = $4
        WHERE id = $5
        RETURNING *
    ",
    )
    .bind(&payload.name)
    .bind(&payload.text)
    .bind(payload.cooking_time)
    .bind(image)
    .bind(recipe_id)
    .fetch_one(&mut *tr)
    .await
    .map_err(QueryError::from)?;

    sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut *tr)
        .await
        .map_err(QueryError::from)?;
    sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut *tr)
        .await
        .map_err(QueryError::from)?;

    insert_recipe_parts(&mut tr, recipe_id, payload).await?;

    tr.commit()
        .await
        .map_err(|_| QueryError::new("Could not commit transaction"))?;

    Ok(recipe)
}

/// `recipe` must come from [`get_recipe_mut`]. The stored image is kept when
/// the payload has none.
pub async fn update_recipe(
    recipe: Recipe,
    payload: RecipePayload,
    pool: &Pool<Postgres>,
    media: &Media,
) -> Result<RecipeWriteView, ApiError> {
    let new_image = match &payload.image {
        Some(image) => Some(media.save(image).await?),
        None => None,
    };
    let image = new_image.as_deref().unwrap_or(&recipe.image);

    match replace_recipe(recipe.id, &payload, image, pool).await {
        Ok(updated) => {
            if new_image.is_some() {
                media.remove(&recipe.image).await;
            }
            log::info!("Updated recipe {}", updated.id);
            Ok(to_write_view(&updated, payload.tags, payload.ingredients))
        }
        Err(e) => {
            if let Some(new_image) = &new_image {
                media.remove(new_image).await;
            }
            Err(e)
        }
    }
}

pub async fn get_recipe(id: Id, pool: &Pool<Postgres>) -> Result<Option<Recipe>, ApiError> {
    let row: Option<Recipe> = sqlx::query_as("SELECT * FROM recipes WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

/// Loads a recipe the session may modify: its author's, or any for admins.
pub async fn get_recipe_mut(
    id: Id,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<Recipe, ApiError> {
    let recipe = get_recipe(id, pool).await?;
    session.authenticate(ActionType::ManageOwnRecipes)?;

    match recipe {
        Some(recipe) => match session.authenticate(ActionType::ManageAllRecipes) {
            Ok(_) => Ok(recipe),
            Err(_) => {
                if recipe.author_id != session.user_id {
                    Err(ApiError::Forbidden)
                } else {
                    Ok(recipe)
                }
            }
        },
        None => Err(ApiError::not_found("Recipe")),
    }
}

pub async fn delete_recipe(recipe: Recipe, pool: &Pool<Postgres>, media: &Media) -> Result<(), ApiError> {
    sqlx::query("DELETE FROM recipes WHERE id = $1")
        .bind(recipe.id)
        .execute(pool)
        .await
        .map_err(QueryError::from)?;

    media.remove(&recipe.image).await;
    log::info!("Deleted recipe {}", recipe.id);
    Ok(())
}

// Reading

async fn list_recipe_tags(
    recipe_ids: &[Id],
    pool: &Pool<Postgres>,
) -> Result<HashMap<Id, Vec<Tag>>, ApiError> {
    let rows: Vec<RecipeTagRow> = sqlx::query_as(
        "
        SELECT rt.recipe_id, t.id, t.name, t.color, t.slug
        FROM recipe_tags rt
        INNER JOIN tags t ON t.id = rt.tag_id
        WHERE rt.recipe_id = ANY($1)
        ORDER BY t.id
    ",
    )
    .bind(recipe_ids)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    let mut hashmap: HashMap<Id, Vec<Tag>> = HashMap::new();
    rows.into_iter()
        .for_each(|row| hashmap.entry(row.recipe_id).or_default().push(row.tag));

    Ok(hashmap)
}

async fn list_recipe_ingredients(
    recipe_ids: &[Id],
    pool: &Pool<Postgres>,
) -> Result<HashMap<Id, Vec<RecipeIngredientView>>, ApiError> {
    let rows: Vec<RecipeIngredientRow> = sqlx::query_as(
        "
        SELECT ri.recipe_id, i.id, i.name, i.measurement_unit, ri.amount
        FROM recipe_ingredients ri
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE ri.recipe_id = ANY($1)
        ORDER BY ri.id
    ",
    )
    .bind(recipe_ids)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    let mut hashmap: HashMap<Id, Vec<RecipeIngredientView>> = HashMap::new();
    rows.into_iter()
        .for_each(|row| hashmap.entry(row.recipe_id).or_default().push(row.ingredient));

    Ok(hashmap)
}

/// Resolves tags, ingredients and authors for a batch of rows.
async fn read_views(
    rows: Vec<RecipeRow>,
    viewer: Option<Id>,
    pool: &Pool<Postgres>,
    media: &Media,
) -> Result<Vec<RecipeReadView>, ApiError> {
    let recipe_ids: Vec<Id> = rows.iter().map(|row| row.recipe.id).collect();
    let mut author_ids: Vec<Id> = rows.iter().map(|row| row.recipe.author_id).collect();
    author_ids.sort_unstable();
    author_ids.dedup();

    let mut tags = list_recipe_tags(&recipe_ids, pool).await?;
    let mut ingredients = list_recipe_ingredients(&recipe_ids, pool).await?;
    let authors = list_user_views(&author_ids, viewer, pool).await?;

    rows.into_iter()
        .map(|row| {
            let author = authors
                .get(&row.recipe.author_id)
                .cloned()
                .ok_or_else(|| ApiError::Internal(format!("Author of recipe {} is missing", row.recipe.id)))?;
            let tags = tags.remove(&row.recipe.id).unwrap_or_default();
            let ingredients = ingredients.remove(&row.recipe.id).unwrap_or_default();

            Ok(to_read_view(row, author, tags, ingredients, viewer, media))
        })
        .collect()
}

pub async fn get_recipe_view(
    id: Id,
    viewer: Option<Id>,
    pool: &Pool<Postgres>,
    media: &Media,
) -> Result<RecipeReadView, ApiError> {
    let row: Option<RecipeRow> = sqlx::query_as(&format!(
        "SELECT r.*, {RECIPE_FLAG_COLUMNS} FROM recipes r WHERE r.id = $2"
    ))
    .bind(viewer)
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(QueryError::from)?;

    let row = row.ok_or_else(|| ApiError::not_found("Recipe"))?;

    read_views(vec![row], viewer, pool, media)
        .await?
        .pop()
        .ok_or_else(|| ApiError::not_found("Recipe"))
}

pub async fn fetch_recipes(
    filters: &RecipeFilters,
    window: PageWindow,
    viewer: Option<Id>,
    pool: &Pool<Postgres>,
    media: &Media,
) -> Result<PageContext<RecipeReadView>, ApiError> {
    if viewer.is_none() && filters.needs_viewer() {
        return Ok(PageContext::no_rows());
    }

    let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT r.*, ");
    query_builder
        .push("EXISTS(SELECT 1 FROM favorites f WHERE f.recipe_id = r.id AND f.user_id = ")
        .push_bind(viewer)
        .push(") AS is_favorited, ")
        .push("EXISTS(SELECT 1 FROM shopping_carts c WHERE c.recipe_id = r.id AND c.user_id = ")
        .push_bind(viewer)
        .push(") AS is_in_shopping_cart, ")
        .push("COUNT(*) OVER() AS count FROM recipes r WHERE TRUE");

    if let Some(author) = filters.author {
        query_builder.push(" AND r.author_id = ").push_bind(author);
    }
    if !filters.tags.is_empty() {
        query_builder
            .push(" AND EXISTS(SELECT 1 FROM recipe_tags rt INNER JOIN tags t ON t.id = rt.tag_id WHERE rt.recipe_id = r.id AND t.slug = ANY(")
            .push_bind(&filters.tags)
            .push("))");
    }
    if filters.is_favorited {
        query_builder
            .push(" AND EXISTS(SELECT 1 FROM favorites f WHERE f.recipe_id = r.id AND f.user_id = ")
            .push_bind(viewer)
            .push(")");
    }
    if filters.is_in_shopping_cart {
        query_builder
            .push(" AND EXISTS(SELECT 1 FROM shopping_carts c WHERE c.recipe_id = r.id AND c.user_id = ")
            .push_bind(viewer)
            .push(")");
    }

    query_builder
        .push(" ORDER BY r.pub_date DESC, r.id DESC LIMIT ")
        .push_bind(window.page_size)
        .push(" OFFSET ")
        .push_bind(window.offset);

    let rows: Vec<RecipeRow> = query_builder
        .build_query_as()
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?;

    let total_count = rows.first().map(|row| row.count).unwrap_or(0);
    let recipes = read_views(rows, viewer, pool, media).await?;

    PageContext::from_rows(recipes, total_count, window)
}
