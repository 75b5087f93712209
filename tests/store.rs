//! Storage tests against a real PostgreSQL; run with
//! `DATABASE_URL=postgres://... cargo test -- --ignored`.

use chrono::Duration;
use foodgram::{
    actions::{
        add_recipe_relation, create_recipe, delete_recipe, download_shopping_list, fetch_recipes,
        fetch_subscriptions, get_recipe_mut, get_recipe_view, load_ingredients, load_tags,
        login_user, prepare_recipe, register_user, remove_recipe_relation, subscribe, unsubscribe,
        update_recipe, RecipeFilters, RecipeRelation,
    },
    decode_data_uri,
    error::ApiError,
    form::Form,
    jwt::{jwt_key, SessionData},
    pagination::PageQuery,
    schema::{Id, NewIngredient, NewTag, UserRole},
    validation::{
        Credentials, ImagePolicy, IngredientAmount, RecipePayload, Registration, ValidationRules,
    },
    Media,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use sqlx::PgPool;

const PIXEL: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

fn media() -> Media {
    Media::new(std::env::temp_dir().join("foodgram-store-tests"), "/media/")
}

fn registration(email: &str, username: &str) -> Registration {
    Registration {
        email: email.to_owned(),
        username: username.to_owned(),
        first_name: String::from("Test"),
        last_name: String::from("User"),
        password: String::from("Qwerty123"),
    }
}

async fn user(pool: &PgPool, username: &str) -> SessionData {
    let user = register_user(registration(&format!("{username}@example.com"), username), pool)
        .await
        .unwrap();

    SessionData {
        user_id: user.id,
        username: user.username,
        role: UserRole::User,
    }
}

async fn catalog(pool: &PgPool) -> (Id, Id, Id) {
    load_tags(
        vec![NewTag {
            name: String::from("Breakfast"),
            color: String::from("#E26C2D"),
            slug: String::from("breakfast"),
        }],
        pool,
        None,
    )
    .await
    .unwrap();
    load_ingredients(
        vec![
            NewIngredient {
                name: String::from("Salt"),
                measurement_unit: String::from("g"),
            },
            NewIngredient {
                name: String::from("Egg"),
                measurement_unit: String::from("pcs"),
            },
        ],
        pool,
        None,
    )
    .await
    .unwrap();

    let tag: (Id,) = sqlx::query_as("SELECT id FROM tags WHERE slug = 'breakfast'")
        .fetch_one(pool)
        .await
        .unwrap();
    let salt: (Id,) = sqlx::query_as("SELECT id FROM ingredients WHERE name = 'Salt'")
        .fetch_one(pool)
        .await
        .unwrap();
    let egg: (Id,) = sqlx::query_as("SELECT id FROM ingredients WHERE name = 'Egg'")
        .fetch_one(pool)
        .await
        .unwrap();

    (tag.0, salt.0, egg.0)
}

fn payload(name: &str, tag: Id, ingredients: &[(Id, i32)]) -> RecipePayload {
    RecipePayload {
        name: name.to_owned(),
        text: String::from("Mix and serve"),
        cooking_time: 10,
        image: Some(decode_data_uri(PIXEL).unwrap()),
        tags: vec![tag],
        ingredients: ingredients
            .iter()
            .map(|(id, amount)| IngredientAmount {
                id: *id,
                amount: *amount,
            })
            .collect(),
    }
}

async fn count(pool: &PgPool, sql: &str, id: Id) -> i64 {
    let row: (i64,) = sqlx::query_as(sql).bind(id).fetch_one(pool).await.unwrap();
    row.0
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn favorites_are_added_once_and_removed_once(pool: PgPool) {
    let media = media();
    let (tag, salt, _) = catalog(&pool).await;
    let author = user(&pool, "author").await;
    let reader = user(&pool, "reader").await;
    let recipe = create_recipe(&author, payload("Omelette", tag, &[(salt, 2)]), &pool, &media)
        .await
        .unwrap();

    let short = add_recipe_relation(RecipeRelation::Favorite, &reader, recipe.id, &pool, &media)
        .await
        .unwrap();
    assert_eq!(short.name, "Omelette");

    let again = add_recipe_relation(RecipeRelation::Favorite, &reader, recipe.id, &pool, &media).await;
    assert!(matches!(again, Err(ApiError::Conflict(_))));

    remove_recipe_relation(RecipeRelation::Favorite, &reader, recipe.id, &pool)
        .await
        .unwrap();
    let again = remove_recipe_relation(RecipeRelation::Favorite, &reader, recipe.id, &pool).await;
    assert!(matches!(again, Err(ApiError::NotFound(_))));

    let missing = add_recipe_relation(RecipeRelation::ShoppingCart, &reader, 9999, &pool, &media).await;
    assert!(matches!(missing, Err(ApiError::NotFound(_))));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn shopping_list_sums_by_name_and_unit(pool: PgPool) {
    let media = media();
    let (tag, salt, egg) = catalog(&pool).await;
    let author = user(&pool, "author").await;

    let a = create_recipe(&author, payload("Soup", tag, &[(salt, 5)]), &pool, &media)
        .await
        .unwrap();
    let b = create_recipe(&author, payload("Eggs", tag, &[(salt, 3), (egg, 2)]), &pool, &media)
        .await
        .unwrap();

    for recipe in [a.id, b.id] {
        add_recipe_relation(RecipeRelation::ShoppingCart, &author, recipe, &pool, &media)
            .await
            .unwrap();
    }

    let list = download_shopping_list(&author, &pool).await.unwrap();
    assert_eq!(list, "Shopping list:\nEgg - 2, pcs\nSalt - 8, g\n");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn deleting_a_recipe_cascades(pool: PgPool) {
    let media = media();
    let (tag, salt, _) = catalog(&pool).await;
    let author = user(&pool, "author").await;
    let recipe = create_recipe(&author, payload("Toast", tag, &[(salt, 1)]), &pool, &media)
        .await
        .unwrap();

    add_recipe_relation(RecipeRelation::Favorite, &author, recipe.id, &pool, &media)
        .await
        .unwrap();
    add_recipe_relation(RecipeRelation::ShoppingCart, &author, recipe.id, &pool, &media)
        .await
        .unwrap();

    let stored = get_recipe_mut(recipe.id, &author, &pool).await.unwrap();
    delete_recipe(stored, &pool, &media).await.unwrap();

    for sql in [
        "SELECT COUNT(*) FROM favorites WHERE recipe_id = $1",
        "SELECT COUNT(*) FROM shopping_carts WHERE recipe_id = $1",
        "SELECT COUNT(*) FROM recipe_ingredients WHERE recipe_id = $1",
        "SELECT COUNT(*) FROM recipe_tags WHERE recipe_id = $1",
    ] {
        assert_eq!(count(&pool, sql, recipe.id).await, 0, "{sql}");
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn duplicate_recipe_names_conflict(pool: PgPool) {
    let media = media();
    let (tag, salt, egg) = catalog(&pool).await;
    let author = user(&pool, "author").await;
    let original = create_recipe(&author, payload("Pancakes", tag, &[(salt, 1)]), &pool, &media)
        .await
        .unwrap();

    let duplicate = create_recipe(&author, payload("Pancakes", tag, &[(egg, 4)]), &pool, &media).await;
    assert!(matches!(duplicate, Err(ApiError::Conflict(_))));

    let view = get_recipe_view(original.id, None, &pool, &media).await.unwrap();
    assert_eq!(view.ingredients.len(), 1);
    assert_eq!(view.ingredients[0].name, "Salt");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn updates_replace_associations(pool: PgPool) {
    let media = media();
    let (tag, salt, egg) = catalog(&pool).await;
    let author = user(&pool, "author").await;
    let other = user(&pool, "other").await;
    let created = create_recipe(&author, payload("Porridge", tag, &[(salt, 1)]), &pool, &media)
        .await
        .unwrap();

    let forbidden = get_recipe_mut(created.id, &other, &pool).await;
    assert!(matches!(forbidden, Err(ApiError::Forbidden)));

    let stored = get_recipe_mut(created.id, &author, &pool).await.unwrap();
    let mut changes = payload("Porridge", tag, &[(egg, 2)]);
    changes.image = None;
    let updated = update_recipe(stored, changes, &pool, &media).await.unwrap();

    assert_eq!(updated.image, created.image);
    assert_eq!(updated.ingredients, vec![IngredientAmount { id: egg, amount: 2 }]);

    let view = get_recipe_view(created.id, Some(author.user_id), &pool, &media)
        .await
        .unwrap();
    assert_eq!(view.ingredients.len(), 1);
    assert_eq!(view.ingredients[0].name, "Egg");
    assert_eq!(view.tags.len(), 1);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn anonymous_readers_see_no_flags(pool: PgPool) {
    let media = media();
    let (tag, salt, _) = catalog(&pool).await;
    let author = user(&pool, "author").await;
    let recipe = create_recipe(&author, payload("Salad", tag, &[(salt, 1)]), &pool, &media)
        .await
        .unwrap();
    add_recipe_relation(RecipeRelation::Favorite, &author, recipe.id, &pool, &media)
        .await
        .unwrap();

    let window = PageQuery::default().window(6);
    let page = fetch_recipes(&RecipeFilters::default(), window, None, &pool, &media)
        .await
        .unwrap();
    assert_eq!(page.count, 1);
    assert!(!page.results[0].is_favorited);

    let favorites = RecipeFilters {
        is_favorited: true,
        ..RecipeFilters::default()
    };
    let page = fetch_recipes(&favorites, window, None, &pool, &media).await.unwrap();
    assert!(page.results.is_empty());

    let page = fetch_recipes(&favorites, window, Some(author.user_id), &pool, &media)
        .await
        .unwrap();
    assert_eq!(page.count, 1);
    assert!(page.results[0].is_favorited);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn follows_reject_self_and_duplicates(pool: PgPool) {
    let media = media();
    let (tag, salt, _) = catalog(&pool).await;
    let author = user(&pool, "author").await;
    let reader = user(&pool, "reader").await;
    for name in ["One", "Two", "Three"] {
        create_recipe(&author, payload(name, tag, &[(salt, 1)]), &pool, &media)
            .await
            .unwrap();
    }

    let own = subscribe(&reader, reader.user_id, None, &pool, &media).await;
    assert!(matches!(own, Err(ApiError::Validation(_))));

    let entry = subscribe(&reader, author.user_id, Some(2), &pool, &media)
        .await
        .unwrap();
    assert!(entry.user.is_subscribed);
    assert_eq!(entry.recipes.len(), 2);
    assert_eq!(entry.recipes_count, 3);

    let again = subscribe(&reader, author.user_id, None, &pool, &media).await;
    assert!(matches!(again, Err(ApiError::Conflict(_))));

    let page = fetch_subscriptions(&reader, PageQuery::default().window(6), None, &pool, &media)
        .await
        .unwrap();
    assert_eq!(page.count, 1);
    assert_eq!(page.results[0].recipes.len(), 3);

    unsubscribe(&reader, author.user_id, &pool).await.unwrap();
    let again = unsubscribe(&reader, author.user_id, &pool).await;
    assert!(matches!(again, Err(ApiError::NotFound(_))));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn loaders_are_idempotent(pool: PgPool) {
    catalog(&pool).await;

    let inserted = load_ingredients(
        vec![NewIngredient {
            name: String::from("Salt"),
            measurement_unit: String::from("g"),
        }],
        &pool,
        None,
    )
    .await
    .unwrap();

    assert_eq!(inserted, 0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn shopping_cart_is_added_once_and_removed_once(pool: PgPool) {
    let media = media();
    let (tag, salt, _) = catalog(&pool).await;
    let author = user(&pool, "author").await;
    let recipe = create_recipe(&author, payload("Stew", tag, &[(salt, 4)]), &pool, &media)
        .await
        .unwrap();

    let missing = remove_recipe_relation(RecipeRelation::ShoppingCart, &author, recipe.id, &pool).await;
    assert!(matches!(missing, Err(ApiError::NotFound(_))));

    add_recipe_relation(RecipeRelation::ShoppingCart, &author, recipe.id, &pool, &media)
        .await
        .unwrap();
    let again = add_recipe_relation(RecipeRelation::ShoppingCart, &author, recipe.id, &pool, &media).await;
    assert!(matches!(again, Err(ApiError::Conflict(_))));

    remove_recipe_relation(RecipeRelation::ShoppingCart, &author, recipe.id, &pool)
        .await
        .unwrap();
    let list = download_shopping_list(&author, &pool).await.unwrap();
    assert_eq!(list, "Shopping list:\n");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn unknown_references_fail_before_any_write(pool: PgPool) {
    let (tag, salt, _) = catalog(&pool).await;
    let form = Form::from_value(json!({
        "name": "Ghost soup",
        "text": "Nothing here",
        "cooking_time": 5,
        "image": PIXEL,
        "tags": [tag, 9999],
        "ingredients": [{ "id": salt, "amount": 1 }, { "id": 8888, "amount": 2 }],
    }))
    .unwrap();

    match prepare_recipe(&form, ImagePolicy::Required, &ValidationRules::default(), &pool).await {
        Err(ApiError::Validation(errors)) => {
            assert!(errors.contains("tags"));
            assert!(errors.contains("ingredients"));
        }
        other => panic!("expected reference errors, got {other:?}"),
    }

    let recipes: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM recipes")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(recipes.0, 0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn emails_are_unique_regardless_of_case(pool: PgPool) {
    register_user(registration("Cook@example.com", "cook"), &pool)
        .await
        .unwrap();

    let duplicate = register_user(registration("cook@example.com", "cook2"), &pool).await;
    assert!(matches!(duplicate, Err(ApiError::Conflict(_))));

    let key = jwt_key("secret").unwrap();
    for email in ["Cook@example.com", "cook@example.com"] {
        let credentials = Credentials {
            email: email.to_owned(),
            password: String::from("Qwerty123"),
        };
        assert!(
            login_user(credentials, &key, Duration::hours(1), &pool).await.is_ok(),
            "{email}"
        );
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn pages_past_the_end_are_not_found(pool: PgPool) {
    let media = media();
    let (tag, salt, _) = catalog(&pool).await;
    let author = user(&pool, "author").await;
    create_recipe(&author, payload("Only one", tag, &[(salt, 1)]), &pool, &media)
        .await
        .unwrap();

    let window = PageQuery {
        page: Some(5),
        limit: None,
    }
    .window(6);
    let page = fetch_recipes(&RecipeFilters::default(), window, None, &pool, &media).await;
    assert!(matches!(page, Err(ApiError::NotFound(_))));
}
