use redis::aio::MultiplexedConnection;
use sqlx::{Pool, Postgres, QueryBuilder};

use crate::{
    cache::cache::{bump_cache_bind, CacheKeyType, CacheLifetime, RedisValue},
    error::{ApiError, FieldErrors, QueryError},
    pagination::{PageContext, PageWindow},
    schema::{Id, Ingredient, IngredientRow, NewIngredient, NewTag, Tag},
};

// Postgres caps bind parameters per statement.
const BIND_LIMIT: usize = 65535;

/// Escapes LIKE wildcards so user input only ever matches as a prefix.
pub fn like_prefix(value: &str) -> String {
    let mut pattern = String::with_capacity(value.len() + 1);
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

pub fn is_hex_color(value: &str) -> bool {
    match value.strip_prefix('#') {
        Some(hex) => hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

// Ingredients

pub async fn fetch_ingredients(
    name: Option<&str>,
    window: PageWindow,
    pool: &Pool<Postgres>,
) -> Result<PageContext<Ingredient>, ApiError> {
    let search = like_prefix(name.unwrap_or("").trim());

    let rows: Vec<IngredientRow> = sqlx::query_as(
        "
        SELECT i.*, COUNT(*) OVER() AS count FROM ingredients i
        WHERE LOWER(i.name) LIKE LOWER($1)
        ORDER BY i.name, i.measurement_unit
        LIMIT $2 OFFSET $3
    ",
    )
    .bind(search)
    .bind(window.page_size)
    .bind(window.offset)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    let total_count = rows.first().map(|row| row.count).unwrap_or(0);
    let ingredients = rows.into_iter().map(|row| row.ingredient).collect();

    PageContext::from_rows(ingredients, total_count, window)
}

pub async fn fetch_ingredient(id: Id, pool: &Pool<Postgres>) -> Result<Option<Ingredient>, ApiError> {
    let row: Option<Ingredient> = sqlx::query_as("SELECT * FROM ingredients WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

pub async fn get_ingredient(
    id: Id,
    pool: &Pool<Postgres>,
    cache: Option<MultiplexedConnection>,
) -> Result<Ingredient, ApiError> {
    let ingredient = match cache {
        Some(mut cache) => {
            let pool = pool.clone();
            RedisValue::get_or_optional(CacheKeyType::Ingredient.new(id), &mut cache, || async move {
                fetch_ingredient(id, &pool).await
            })
            .await?
            .map(|cached| cached.value)
        }
        None => fetch_ingredient(id, pool).await?,
    };

    ingredient.ok_or_else(|| ApiError::not_found("Ingredient"))
}

/// Inserts ingredients that don't exist yet and returns how many were new.
pub async fn load_ingredients(
    ingredients: Vec<NewIngredient>,
    pool: &Pool<Postgres>,
    cache: Option<MultiplexedConnection>,
) -> Result<u64, ApiError> {
    let mut errors = FieldErrors::new();
    for (i, ingredient) in ingredients.iter().enumerate() {
        if ingredient.name.trim().is_empty() || ingredient.measurement_unit.trim().is_empty() {
            errors.add(&format!("ingredients[{i}]"), "Name and measurement unit are required");
        }
    }
    errors.into_result()?;

    let mut tr = pool
        .begin()
        .await
        .map_err(|_| QueryError::new("Could not start transaction"))?;

    let mut inserted = 0;
    for chunk in ingredients.chunks(BIND_LIMIT / 2) {
        let mut query_builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO ingredients (name, measurement_unit) ");

        query_builder.push_values(chunk, |mut b, ingredient| {
            b.push_bind(ingredient.name.trim())
                .push_bind(ingredient.measurement_unit.trim());
        });
        query_builder.push(" ON CONFLICT DO NOTHING");

        inserted += query_builder
            .build()
            .execute(&mut *tr)
            .await
            .map_err(QueryError::from)?
            .rows_affected();
    }

    tr.commit()
        .await
        .map_err(|_| QueryError::new("Could not commit transaction"))?;

    if let Some(mut cache) = cache {
        bump_cache_bind(CacheLifetime::BindIngredientCache, &mut cache).await?;
    }

    log::info!("Loaded {inserted} of {} ingredients", ingredients.len());
    Ok(inserted)
}

// Tags

pub async fn fetch_tags(pool: &Pool<Postgres>) -> Result<Vec<Tag>, ApiError> {
    let list: Vec<Tag> = sqlx::query_as("SELECT * FROM tags ORDER BY id")
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(list)
}

pub async fn fetch_tag(id: Id, pool: &Pool<Postgres>) -> Result<Option<Tag>, ApiError> {
    let tag: Option<Tag> = sqlx::query_as("SELECT * FROM tags WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(tag)
}

pub async fn list_tags(
    pool: &Pool<Postgres>,
    cache: Option<MultiplexedConnection>,
) -> Result<Vec<Tag>, ApiError> {
    match cache {
        Some(mut cache) => {
            let pool = pool.clone();
            let cached = RedisValue::get_or(CacheKeyType::TagList.new("all"), &mut cache, || async move {
                fetch_tags(&pool).await
            })
            .await?;

            Ok(cached.value)
        }
        None => fetch_tags(pool).await,
    }
}

pub async fn get_tag(
    id: Id,
    pool: &Pool<Postgres>,
    cache: Option<MultiplexedConnection>,
) -> Result<Tag, ApiError> {
    let tag = match cache {
        Some(mut cache) => {
            let pool = pool.clone();
            RedisValue::get_or_optional(CacheKeyType::Tag.new(id), &mut cache, || async move {
                fetch_tag(id, &pool).await
            })
            .await?
            .map(|cached| cached.value)
        }
        None => fetch_tag(id, pool).await?,
    };

    tag.ok_or_else(|| ApiError::not_found("Tag"))
}

/// Inserts tags that don't exist yet and returns how many were new.
pub async fn load_tags(
    tags: Vec<NewTag>,
    pool: &Pool<Postgres>,
    cache: Option<MultiplexedConnection>,
) -> Result<u64, ApiError> {
    let mut errors = FieldErrors::new();
    for (i, tag) in tags.iter().enumerate() {
        if tag.name.trim().is_empty() || tag.slug.trim().is_empty() {
            errors.add(&format!("tags[{i}]"), "Name and slug are required");
        }
        if !is_hex_color(&tag.color) {
            errors.add(&format!("tags[{i}]"), "Color must look like #RRGGBB");
        }
    }
    errors.into_result()?;

    let mut tr = pool
        .begin()
        .await
        .map_err(|_| QueryError::new("Could not start transaction"))?;

    let mut inserted = 0;
    for chunk in tags.chunks(BIND_LIMIT / 3) {
        let mut query_builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO tags (name, color, slug) ");

        query_builder.push_values(chunk, |mut b, tag| {
            b.push_bind(tag.name.trim())
                .push_bind(tag.color.to_uppercase())
                .push_bind(tag.slug.trim());
        });
        query_builder.push(" ON CONFLICT DO NOTHING");

        inserted += query_builder
            .build()
            .execute(&mut *tr)
            .await
            .map_err(QueryError::from)?
            .rows_affected();
    }

    tr.commit()
        .await
        .map_err(|_| QueryError::new("Could not commit transaction"))?;

    if let Some(mut cache) = cache {
        bump_cache_bind(CacheLifetime::BindTagCache, &mut cache).await?;
    }

    log::info!("Loaded {inserted} of {} tags", tags.len());
    Ok(inserted)
}
