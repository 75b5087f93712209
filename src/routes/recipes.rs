use std::sync::Arc;

use serde_json::Value;
use warp::{
    filters::BoxedFilter,
    http::{header, StatusCode},
    reject::Rejection,
    reply::{self, Response},
    Filter, Reply,
};

use crate::{
    actions::{
        add_recipe_relation, create_recipe, delete_recipe, download_shopping_list, fetch_recipes,
        get_recipe_mut, get_recipe_view, prepare_recipe, remove_recipe_relation, update_recipe,
        RecipeFilters, RecipeRelation,
    },
    constants::SHOPPING_LIST_FILENAME,
    form::Form,
    jwt::SessionData,
    middleware::{with_possible_session, with_session, with_state},
    pagination::PageQuery,
    schema::Id,
    state::State,
    validation::ImagePolicy,
};

use super::{json_body, json_response, no_content, with_pairs, Pairs};

pub fn routes(state: Arc<State>) -> BoxedFilter<(Response,)> {
    let list = warp::path!("recipes")
        .and(warp::get())
        .and(with_pairs())
        .and(with_possible_session(state.clone()))
        .and(with_state(state.clone()))
        .and_then(list_recipes_handler);

    let create = warp::path!("recipes")
        .and(warp::post())
        .and(with_session(state.clone()))
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(create_recipe_handler);

    let download = warp::path!("recipes" / "download_shopping_cart")
        .and(warp::get())
        .and(with_session(state.clone()))
        .and(with_state(state.clone()))
        .and_then(download_shopping_cart_handler);

    let detail = warp::path!("recipes" / Id)
        .and(warp::get())
        .and(with_possible_session(state.clone()))
        .and(with_state(state.clone()))
        .and_then(recipe_handler);

    let update = warp::path!("recipes" / Id)
        .and(warp::patch())
        .and(with_session(state.clone()))
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(update_recipe_handler);

    let delete = warp::path!("recipes" / Id)
        .and(warp::delete())
        .and(with_session(state.clone()))
        .and(with_state(state.clone()))
        .and_then(delete_recipe_handler);

    let favorite = relation_routes("favorite", RecipeRelation::Favorite, state.clone());
    let shopping_cart = relation_routes("shopping_cart", RecipeRelation::ShoppingCart, state);

    list.or(create)
        .unify()
        .or(download)
        .unify()
        .or(detail)
        .unify()
        .or(update)
        .unify()
        .or(delete)
        .unify()
        .or(favorite)
        .unify()
        .or(shopping_cart)
        .unify()
        .boxed()
}

/// `POST|DELETE /recipes/{id}/<segment>`
fn relation_routes(
    segment: &'static str,
    relation: RecipeRelation,
    state: Arc<State>,
) -> BoxedFilter<(Response,)> {
    let path = warp::path("recipes")
        .and(warp::path::param::<Id>())
        .and(warp::path(segment))
        .and(warp::path::end());

    let add = path
        .clone()
        .and(warp::post())
        .and(with_session(state.clone()))
        .and(with_state(state.clone()))
        .and_then(move |id: Id, session: SessionData, state: Arc<State>| {
            add_relation_handler(relation, id, session, state)
        });

    let remove = path
        .and(warp::delete())
        .and(with_session(state.clone()))
        .and(with_state(state))
        .and_then(move |id: Id, session: SessionData, state: Arc<State>| {
            remove_relation_handler(relation, id, session, state)
        });

    add.or(remove).unify().boxed()
}

async fn list_recipes_handler(
    pairs: Pairs,
    session: Option<SessionData>,
    state: Arc<State>,
) -> Result<Response, Rejection> {
    let filters = RecipeFilters::from_pairs(&pairs)?;
    let window = PageQuery::from_pairs(&pairs)?.window(state.config.page_size);
    let viewer = session.map(|session| session.user_id);

    let page = fetch_recipes(&filters, window, viewer, &state.pool, &state.media).await?;

    Ok(json_response(&page, StatusCode::OK))
}

async fn recipe_handler(
    id: Id,
    session: Option<SessionData>,
    state: Arc<State>,
) -> Result<Response, Rejection> {
    let viewer = session.map(|session| session.user_id);
    let recipe = get_recipe_view(id, viewer, &state.pool, &state.media).await?;

    Ok(json_response(&recipe, StatusCode::OK))
}

async fn create_recipe_handler(
    session: SessionData,
    body: Value,
    state: Arc<State>,
) -> Result<Response, Rejection> {
    let form = Form::from_value(body)?;
    let payload = prepare_recipe(&form, ImagePolicy::Required, state.rules(), &state.pool).await?;

    let stored = create_recipe(&session, payload, &state.pool, &state.media).await?;
    let recipe = get_recipe_view(stored.id, Some(session.user_id), &state.pool, &state.media).await?;

    Ok(json_response(&recipe, StatusCode::CREATED))
}

async fn update_recipe_handler(
    id: Id,
    session: SessionData,
    body: Value,
    state: Arc<State>,
) -> Result<Response, Rejection> {
    let recipe = get_recipe_mut(id, &session, &state.pool).await?;

    let form = Form::from_value(body)?;
    let payload = prepare_recipe(&form, ImagePolicy::Optional, state.rules(), &state.pool).await?;

    let stored = update_recipe(recipe, payload, &state.pool, &state.media).await?;
    let recipe = get_recipe_view(stored.id, Some(session.user_id), &state.pool, &state.media).await?;

    Ok(json_response(&recipe, StatusCode::OK))
}

async fn delete_recipe_handler(
    id: Id,
    session: SessionData,
    state: Arc<State>,
) -> Result<Response, Rejection> {
    let recipe = get_recipe_mut(id, &session, &state.pool).await?;
    delete_recipe(recipe, &state.pool, &state.media).await?;

    Ok(no_content())
}

async fn add_relation_handler(
    relation: RecipeRelation,
    id: Id,
    session: SessionData,
    state: Arc<State>,
) -> Result<Response, Rejection> {
    let recipe = add_recipe_relation(relation, &session, id, &state.pool, &state.media).await?;

    Ok(json_response(&recipe, StatusCode::CREATED))
}

async fn remove_relation_handler(
    relation: RecipeRelation,
    id: Id,
    session: SessionData,
    state: Arc<State>,
) -> Result<Response, Rejection> {
    remove_recipe_relation(relation, &session, id, &state.pool).await?;

    Ok(no_content())
}

async fn download_shopping_cart_handler(
    session: SessionData,
    state: Arc<State>,
) -> Result<Response, Rejection> {
    let list = download_shopping_list(&session, &state.pool).await?;

    let response = reply::with_header(list, header::CONTENT_TYPE, "text/plain; charset=utf-8");
    let response = reply::with_header(
        response,
        header::CONTENT_DISPOSITION,
        format!("attachment; filename=\"{SHOPPING_LIST_FILENAME}\""),
    );

    Ok(response.into_response())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        jwt::generate_jwt_session,
        routes::{routes, test_support::lazy_state},
        schema::{User, UserRole},
    };

    fn token(state: &State) -> String {
        let user = User {
            id: 1,
            email: String::from("cook@example.com"),
            username: String::from("cook"),
            first_name: String::from("Cook"),
            last_name: String::from("Book"),
            password: String::new(),
            role: UserRole::User,
        };
        let jwt = generate_jwt_session(&user, &state.jwt_key, state.token_lifetime()).unwrap();
        format!("Token {jwt}")
    }

    #[tokio::test]
    async fn writes_require_a_token() {
        let routes = routes(lazy_state());

        for (method, path) in [
            ("POST", "/api/recipes"),
            ("PATCH", "/api/recipes/1"),
            ("DELETE", "/api/recipes/1"),
            ("POST", "/api/recipes/1/favorite"),
            ("DELETE", "/api/recipes/1/shopping_cart"),
            ("GET", "/api/recipes/download_shopping_cart"),
        ] {
            let res = warp::test::request()
                .method(method)
                .path(path)
                .json(&json!({}))
                .reply(&routes)
                .await;

            assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "{method} {path}");
        }
    }

    #[tokio::test]
    async fn broken_tokens_are_401() {
        let routes = routes(lazy_state());

        let res = warp::test::request()
            .method("POST")
            .path("/api/recipes/1/favorite")
            .header("authorization", "Token not-a-jwt")
            .reply(&routes)
            .await;

        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn invalid_recipes_report_every_field() {
        let state = lazy_state();
        let token = token(&state);
        let routes = routes(state);

        let res = warp::test::request()
            .method("POST")
            .path("/api/recipes")
            .header("authorization", token)
            .json(&json!({
                "name": "",
                "text": "Mix",
                "cooking_time": 0,
                "tags": [],
                "ingredients": [],
            }))
            .reply(&routes)
            .await;

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_slice(res.body()).unwrap();
        for field in ["name", "cooking_time", "tags", "ingredients", "image"] {
            assert!(body.get(field).is_some(), "missing {field} in {body}");
        }
    }

    #[tokio::test]
    async fn malformed_json_is_400() {
        let state = lazy_state();
        let token = token(&state);
        let routes = routes(state);

        let res = warp::test::request()
            .method("POST")
            .path("/api/recipes")
            .header("authorization", token)
            .header("content-type", "application/json")
            .body("{not json")
            .reply(&routes)
            .await;

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn bad_list_filters_are_400() {
        let routes = routes(lazy_state());

        let res = warp::test::request()
            .method("GET")
            .path("/api/recipes?author=somebody")
            .reply(&routes)
            .await;

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn oversized_page_numbers_are_400() {
        let routes = routes(lazy_state());

        for path in [
            "/api/recipes?page=9223372036854775807",
            "/api/ingredients?page=9223372036854775807",
            "/api/users?page=9223372036854775807",
        ] {
            let res = warp::test::request().method("GET").path(path).reply(&routes).await;
            assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{path}");
        }
    }
}
