use chrono::Duration;
use chrono::Local;
use hmac::{Hmac, Mac};
use jwt::SignWithKey;
use jwt::VerifyWithKey;
use serde::Deserialize;
use serde::Serialize;
use sha2::Sha256;

use crate::database::schema::User;
use crate::error::ApiError;
use crate::schema::UserRole;

use super::permissions::ActionType;

pub type JwtKey = Hmac<Sha256>;

pub fn jwt_key(secret: &str) -> Result<JwtKey, ApiError> {
    Hmac::new_from_slice(secret.as_bytes())
        .map_err(|e| ApiError::Internal(format!("Invalid token secret: {e}")))
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtSessionData {
    pub user_id: i32,
    pub username: String,
    pub role: UserRole,
    iat: i64,
    exp: i64,
}

impl JwtSessionData {
    pub fn new(id: i32, username: String, role: UserRole, lifetime: Duration) -> Self {
        let now = Local::now();
        let iat = now.timestamp();
        let exp = (now + lifetime).timestamp();

        Self {
            user_id: id,
            username,
            role,
            iat,
            exp,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionData {
    pub user_id: i32,
    pub username: String,
    pub role: UserRole,
}

impl SessionData {
    pub fn authenticate(&self, action: ActionType) -> Result<(), ApiError> {
        if !action.authenticate(self) {
            return Err(ApiError::Forbidden);
        }
        Ok(())
    }
}

impl From<JwtSessionData> for SessionData {
    fn from(value: JwtSessionData) -> Self {
        SessionData {
            username: value.username,
            user_id: value.user_id,
            role: value.role,
        }
    }
}

pub fn generate_jwt_session(
    user: &User,
    key: &JwtKey,
    lifetime: Duration,
) -> Result<String, ApiError> {
    let claims = JwtSessionData::new(user.id, user.username.to_owned(), user.role.to_owned(), lifetime);

    claims
        .sign_with_key(key)
        .map_err(|e| ApiError::Internal(format!("Could not sign token: {e}")))
}

pub fn verify_jwt_session(token: &str, key: &JwtKey) -> Result<JwtSessionData, ApiError> {
    let session: JwtSessionData = token
        .verify_with_key(key)
        .map_err(|_| ApiError::InvalidSession(String::from("Invalid token")))?;

    let now = Local::now().timestamp();
    if (session.exp - now).is_negative() {
        return Err(ApiError::InvalidSession(String::from("Token expired")));
    }

    Ok(session)
}
