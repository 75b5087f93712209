use std::{convert::Infallible, sync::Arc};

use warp::{reject::Rejection, Filter};

use crate::{error::ApiError, state::State};

use super::jwt::{verify_jwt_session, JwtKey, SessionData};

const TOKEN_PREFIXES: &[&str] = &["Token ", "Bearer "];

/// Extracts the token from an `Authorization: Token <jwt>` header.
pub fn parse_authorization(header: &str) -> Option<&str> {
    TOKEN_PREFIXES
        .iter()
        .find_map(|prefix| header.strip_prefix(prefix))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn session_from_header(header: &str, key: &JwtKey) -> Result<SessionData, ApiError> {
    let token = parse_authorization(header)
        .ok_or_else(|| ApiError::InvalidSession(String::from("Malformed authorization header")))?;

    verify_jwt_session(token, key).map(Into::into)
}

pub fn with_state(state: Arc<State>) -> impl Filter<Extract = (Arc<State>,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// Rejects with 401 unless a valid token is present.
pub fn with_session(
    state: Arc<State>,
) -> impl Filter<Extract = (SessionData,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization").and_then(move |header: Option<String>| {
        let state = state.clone();
        async move {
            match header {
                Some(header) => session_from_header(&header, &state.jwt_key).map_err(Rejection::from),
                None => Err(Rejection::from(ApiError::Unauthorized)),
            }
        }
    })
}

/// Anonymous callers and broken tokens both read as `None`.
pub fn with_possible_session(
    state: Arc<State>,
) -> impl Filter<Extract = (Option<SessionData>,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization").map(move |header: Option<String>| {
        header.and_then(|header| session_from_header(&header, &state.jwt_key).ok())
    })
}
