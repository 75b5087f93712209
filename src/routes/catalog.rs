use std::sync::Arc;

use warp::{
    filters::BoxedFilter, http::StatusCode, reject::Rejection, reply::Response, Filter,
};

use crate::{
    actions::{fetch_ingredients, get_ingredient, get_tag, list_tags},
    middleware::with_state,
    pagination::PageQuery,
    schema::Id,
    state::State,
};

use super::{json_response, pair, with_pairs, Pairs};

pub fn routes(state: Arc<State>) -> BoxedFilter<(Response,)> {
    let ingredients = warp::path!("ingredients")
        .and(warp::get())
        .and(with_pairs())
        .and(with_state(state.clone()))
        .and_then(list_ingredients_handler);

    let ingredient = warp::path!("ingredients" / Id)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(ingredient_handler);

    let tags = warp::path!("tags")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(list_tags_handler);

    let tag = warp::path!("tags" / Id)
        .and(warp::get())
        .and(with_state(state))
        .and_then(tag_handler);

    ingredients
        .or(ingredient)
        .unify()
        .or(tags)
        .unify()
        .or(tag)
        .unify()
        .boxed()
}

async fn list_ingredients_handler(pairs: Pairs, state: Arc<State>) -> Result<Response, Rejection> {
    let window = PageQuery::from_pairs(&pairs)?.window(state.config.page_size);
    let page = fetch_ingredients(pair(&pairs, "name"), window, &state.pool).await?;

    Ok(json_response(&page, StatusCode::OK))
}

async fn ingredient_handler(id: Id, state: Arc<State>) -> Result<Response, Rejection> {
    let ingredient = get_ingredient(id, &state.pool, state.cache.clone()).await?;

    Ok(json_response(&ingredient, StatusCode::OK))
}

async fn list_tags_handler(state: Arc<State>) -> Result<Response, Rejection> {
    let tags = list_tags(&state.pool, state.cache.clone()).await?;

    Ok(json_response(&tags, StatusCode::OK))
}

async fn tag_handler(id: Id, state: Arc<State>) -> Result<Response, Rejection> {
    let tag = get_tag(id, &state.pool, state.cache.clone()).await?;

    Ok(json_response(&tag, StatusCode::OK))
}
