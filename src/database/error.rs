use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Value};
use sqlx::error::ErrorKind;
use thiserror::Error;
use warp::http::StatusCode;

/// Key used for errors that don't belong to a single payload field.
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

/// Field name -> messages, rendered as-is in a 400 response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors {
    inner: BTreeMap<String, Vec<String>>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.inner
            .entry(field.to_owned())
            .or_default()
            .push(message.into());
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.inner.get(field).map(|messages| messages.as_slice())
    }

    pub fn contains(&self, field: &str) -> bool {
        self.inner.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// `Ok(())` when nothing was collected.
    pub fn into_result(self) -> Result<(), ApiError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self))
        }
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid request")]
    Validation(FieldErrors),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Authentication credentials were not provided")]
    Unauthorized,

    #[error("Invalid session; {0}")]
    InvalidSession(String),

    #[error("You don't have permission to perform this action")]
    Forbidden,

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Cache failed: {0}")]
    Cache(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// A validation error with a single message on a single field.
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.add(field, message);
        Self::Validation(errors)
    }

    pub fn not_found(what: &str) -> Self {
        Self::NotFound(format!("{what} not found"))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::Conflict(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized | ApiError::InvalidSession(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Query(_) | ApiError::Cache(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn body(&self) -> Value {
        match self {
            ApiError::Validation(errors) => json!(errors),
            ApiError::Conflict(message) => json!({ "errors": message }),
            // Storage details stay in the log.
            ApiError::Query(_) | ApiError::Cache(_) | ApiError::Internal(_) => {
                json!({ "detail": "Internal server error" })
            }
            _ => json!({ "detail": self.to_string() }),
        }
    }
}

impl warp::reject::Reject for ApiError {}

#[derive(Debug)]
pub enum QueryError {
    UniqueViolation(Option<String>),
    ForeignKeyViolation(Option<String>),
    CheckViolation(Option<String>),
    RowNotFound,
    Other(String),
}

impl QueryError {
    pub fn new(info: &str) -> Self {
        Self::Other(info.to_owned())
    }
}

impl From<sqlx::Error> for QueryError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::Database(e) => {
                let constraint = e.constraint().map(str::to_owned);
                match e.kind() {
                    ErrorKind::UniqueViolation => Self::UniqueViolation(constraint),
                    ErrorKind::ForeignKeyViolation => Self::ForeignKeyViolation(constraint),
                    ErrorKind::CheckViolation => Self::CheckViolation(constraint),
                    _ => Self::Other(format!("{e}")),
                }
            }
            sqlx::Error::RowNotFound => Self::RowNotFound,
            sqlx::Error::PoolTimedOut => Self::new("Pool timed out"),
            sqlx::Error::PoolClosed => Self::new("Pool closed"),
            sqlx::Error::WorkerCrashed => Self::new("Worker crashed"),
            e => Self::Other(format!("{e}")),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for QueryError {
    fn from(value: sqlx::migrate::MigrateError) -> Self {
        Self::Other(format!("{value}"))
    }
}

impl From<QueryError> for ApiError {
    fn from(value: QueryError) -> Self {
        match value {
            QueryError::UniqueViolation(constraint) => {
                ApiError::Conflict(conflict_message(constraint.as_deref()).to_owned())
            }
            QueryError::ForeignKeyViolation(constraint) => match constraint.as_deref() {
                Some("recipe_ingredients_ingredient_id_fkey") => {
                    ApiError::field("ingredients", "Ingredient does not exist")
                }
                Some("recipe_tags_tag_id_fkey") => ApiError::field("tags", "Tag does not exist"),
                _ => ApiError::NotFound("Referenced object not found".to_owned()),
            },
            QueryError::CheckViolation(constraint) => match constraint.as_deref() {
                Some("follows_no_self_follow") => {
                    ApiError::field(NON_FIELD_ERRORS, "You cannot subscribe to yourself")
                }
                _ => ApiError::field(NON_FIELD_ERRORS, "Value out of range"),
            },
            QueryError::RowNotFound => ApiError::NotFound("Not found".to_owned()),
            QueryError::Other(info) => ApiError::Query(info),
        }
    }
}

fn conflict_message(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some("favorites_user_recipe_key") => "Recipe is already in favorites",
        Some("shopping_carts_user_recipe_key") => "Recipe is already in the shopping cart",
        Some("follows_follower_following_key") => "You are already subscribed to this user",
        Some("recipes_name_key") => "A recipe with this name already exists",
        Some("users_email_key") => "A user with this email already exists",
        Some("users_username_key") => "A user with this username already exists",
        Some("recipe_ingredients_recipe_ingredient_key") => "Ingredients must not repeat",
        Some("recipe_tags_recipe_tag_key") => "Tags must not repeat",
        _ => "Object already exists",
    }
}

#[derive(Debug)]
pub struct CacheError {
    info: String,
}

impl From<redis::RedisError> for CacheError {
    fn from(value: redis::RedisError) -> Self {
        Self {
            info: format!("{:?} - {:?}", value.code(), value.detail()),
        }
    }
}

impl CacheError {
    pub fn new(info: String) -> Self {
        Self { info }
    }
}

impl From<CacheError> for ApiError {
    fn from(value: CacheError) -> Self {
        ApiError::Cache(value.info)
    }
}
