use std::sync::Arc;

use serde_json::{json, Value};
use warp::{filters::BoxedFilter, http::StatusCode, reject::Rejection, reply::Response, Filter};

use crate::{
    actions::{
        fetch_subscriptions, fetch_users, get_user_view, login_user, parse_recipes_limit,
        register_user, set_password, subscribe, unsubscribe,
    },
    form::Form,
    jwt::SessionData,
    middleware::{with_possible_session, with_session, with_state},
    pagination::PageQuery,
    schema::Id,
    state::State,
    validation::{Credentials, PasswordChange, Registration},
};

use super::{json_body, json_response, no_content, pair, with_pairs, Pairs};

pub fn routes(state: Arc<State>) -> BoxedFilter<(Response,)> {
    let register = warp::path!("users")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(register_handler);

    let list = warp::path!("users")
        .and(warp::get())
        .and(with_pairs())
        .and(with_possible_session(state.clone()))
        .and(with_state(state.clone()))
        .and_then(list_users_handler);

    let me = warp::path!("users" / "me")
        .and(warp::get())
        .and(with_session(state.clone()))
        .and(with_state(state.clone()))
        .and_then(me_handler);

    let password = warp::path!("users" / "set_password")
        .and(warp::post())
        .and(with_session(state.clone()))
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(set_password_handler);

    let subscriptions = warp::path!("users" / "subscriptions")
        .and(warp::get())
        .and(with_session(state.clone()))
        .and(with_pairs())
        .and(with_state(state.clone()))
        .and_then(subscriptions_handler);

    let detail = warp::path!("users" / Id)
        .and(warp::get())
        .and(with_possible_session(state.clone()))
        .and(with_state(state.clone()))
        .and_then(user_handler);

    let subscribe = warp::path!("users" / Id / "subscribe")
        .and(warp::post())
        .and(with_session(state.clone()))
        .and(with_pairs())
        .and(with_state(state.clone()))
        .and_then(subscribe_handler);

    let unsubscribe = warp::path!("users" / Id / "subscribe")
        .and(warp::delete())
        .and(with_session(state.clone()))
        .and(with_state(state.clone()))
        .and_then(unsubscribe_handler);

    let login = warp::path!("auth" / "token" / "login")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state))
        .and_then(login_handler);

    register
        .or(list)
        .unify()
        .or(me)
        .unify()
        .or(password)
        .unify()
        .or(subscriptions)
        .unify()
        .or(detail)
        .unify()
        .or(subscribe)
        .unify()
        .or(unsubscribe)
        .unify()
        .or(login)
        .unify()
        .boxed()
}

async fn register_handler(body: Value, state: Arc<State>) -> Result<Response, Rejection> {
    let registration = Registration::from_form(&Form::from_value(body)?)?;
    let user = register_user(registration, &state.pool).await?;

    Ok(json_response(&user, StatusCode::CREATED))
}

async fn login_handler(body: Value, state: Arc<State>) -> Result<Response, Rejection> {
    let credentials = Credentials::from_form(&Form::from_value(body)?)?;
    let token = login_user(credentials, &state.jwt_key, state.token_lifetime(), &state.pool).await?;

    Ok(json_response(&json!({ "auth_token": token }), StatusCode::OK))
}

async fn list_users_handler(
    pairs: Pairs,
    session: Option<SessionData>,
    state: Arc<State>,
) -> Result<Response, Rejection> {
    let window = PageQuery::from_pairs(&pairs)?.window(state.config.page_size);
    let viewer = session.map(|session| session.user_id);
    let page = fetch_users(window, viewer, &state.pool).await?;

    Ok(json_response(&page, StatusCode::OK))
}

async fn user_handler(
    id: Id,
    session: Option<SessionData>,
    state: Arc<State>,
) -> Result<Response, Rejection> {
    let viewer = session.map(|session| session.user_id);
    let user = get_user_view(id, viewer, &state.pool).await?;

    Ok(json_response(&user, StatusCode::OK))
}

async fn me_handler(session: SessionData, state: Arc<State>) -> Result<Response, Rejection> {
    let user = get_user_view(session.user_id, Some(session.user_id), &state.pool).await?;

    Ok(json_response(&user, StatusCode::OK))
}

async fn set_password_handler(
    session: SessionData,
    body: Value,
    state: Arc<State>,
) -> Result<Response, Rejection> {
    let change = PasswordChange::from_form(&Form::from_value(body)?)?;
    set_password(&session, change, &state.pool).await?;

    Ok(no_content())
}

async fn subscriptions_handler(
    session: SessionData,
    pairs: Pairs,
    state: Arc<State>,
) -> Result<Response, Rejection> {
    let recipes_limit = parse_recipes_limit(pair(&pairs, "recipes_limit"))?;
    let window = PageQuery::from_pairs(&pairs)?.window(state.config.page_size);

    let page = fetch_subscriptions(&session, window, recipes_limit, &state.pool, &state.media).await?;

    Ok(json_response(&page, StatusCode::OK))
}

async fn subscribe_handler(
    id: Id,
    session: SessionData,
    pairs: Pairs,
    state: Arc<State>,
) -> Result<Response, Rejection> {
    let recipes_limit = parse_recipes_limit(pair(&pairs, "recipes_limit"))?;
    let subscription = subscribe(&session, id, recipes_limit, &state.pool, &state.media).await?;

    Ok(json_response(&subscription, StatusCode::CREATED))
}

async fn unsubscribe_handler(
    id: Id,
    session: SessionData,
    state: Arc<State>,
) -> Result<Response, Rejection> {
    unsubscribe(&session, id, &state.pool).await?;

    Ok(no_content())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        error::NON_FIELD_ERRORS,
        jwt::generate_jwt_session,
        routes::{routes, test_support::lazy_state},
        schema::{User, UserRole},
    };

    fn token_for(id: Id, state: &State) -> String {
        let user = User {
            id,
            email: String::from("reader@example.com"),
            username: String::from("reader"),
            first_name: String::from("Rea"),
            last_name: String::from("Der"),
            password: String::new(),
            role: UserRole::User,
        };
        let jwt = generate_jwt_session(&user, &state.jwt_key, state.token_lifetime()).unwrap();
        format!("Token {jwt}")
    }

    fn body(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[tokio::test]
    async fn own_profile_needs_a_token() {
        let routes = routes(lazy_state());

        for (method, path) in [
            ("GET", "/api/users/me"),
            ("GET", "/api/users/subscriptions?recipes_limit=2"),
            ("POST", "/api/users/set_password"),
            ("POST", "/api/users/3/subscribe"),
            ("DELETE", "/api/users/3/subscribe"),
        ] {
            let res = warp::test::request().method(method).path(path).reply(&routes).await;
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "{method} {path}");
        }
    }

    #[tokio::test]
    async fn broken_tokens_are_unauthorized() {
        let routes = routes(lazy_state());

        let res = warp::test::request()
            .method("GET")
            .path("/api/users/subscriptions")
            .header("authorization", "Token not-a-jwt")
            .reply(&routes)
            .await;

        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert!(body(res.body()).get("detail").is_some());
    }

    #[tokio::test]
    async fn registration_reports_every_field() {
        let routes = routes(lazy_state());

        let res = warp::test::request()
            .method("POST")
            .path("/api/users")
            .json(&json!({
                "email": "not-an-email",
                "username": "me",
                "first_name": "Vasya",
            }))
            .reply(&routes)
            .await;

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body = body(res.body());
        for field in ["email", "username", "last_name", "password"] {
            assert!(body.get(field).is_some(), "missing {field} in {body}");
        }
    }

    #[tokio::test]
    async fn login_requires_both_fields() {
        let routes = routes(lazy_state());

        let res = warp::test::request()
            .method("POST")
            .path("/api/auth/token/login")
            .json(&json!({ "email": "vasya@example.com" }))
            .reply(&routes)
            .await;

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(body(res.body()).get("password").is_some());
    }

    #[tokio::test]
    async fn self_subscription_is_rejected() {
        let state = lazy_state();
        let token = token_for(5, &state);
        let routes = routes(state);

        let res = warp::test::request()
            .method("POST")
            .path("/api/users/5/subscribe")
            .header("authorization", token)
            .reply(&routes)
            .await;

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(body(res.body()).get(NON_FIELD_ERRORS).is_some());
    }

    #[tokio::test]
    async fn negative_recipes_limit_is_rejected() {
        let state = lazy_state();
        let token = token_for(5, &state);
        let routes = routes(state);

        let res = warp::test::request()
            .method("GET")
            .path("/api/users/subscriptions?recipes_limit=-2")
            .header("authorization", token)
            .reply(&routes)
            .await;

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(body(res.body()).get("recipes_limit").is_some());
    }
}
