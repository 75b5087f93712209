use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use log::{info, warn};
use rand::{distributions::Alphanumeric, Rng};
use thiserror::Error;

use crate::{
    constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, MIN_COOKING_TIME, MIN_INGREDIENT_AMOUNT},
    validation::ValidationRules,
};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Environment variable {0} must be set")]
    Missing(&'static str),

    #[error("Invalid {key} value: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub redis_url: Option<String>,
    pub port: u16,
    pub jwt_secret: String,
    pub token_lifetime_hours: i64,
    pub media_root: PathBuf,
    pub media_url: String,
    pub page_size: i64,
    pub validation: ValidationRules,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let jwt_secret = lookup("JWT_SECRET").unwrap_or_else(|| {
            warn!("JWT_SECRET not set, tokens will not survive a restart");
            rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(48)
                .map(char::from)
                .collect()
        });

        let page_size: i64 = try_load(&lookup, "PAGE_SIZE", DEFAULT_PAGE_SIZE)?;
        if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(ConfigError::Invalid {
                key: "PAGE_SIZE",
                message: format!("must be between 1 and {MAX_PAGE_SIZE}"),
            });
        }

        let validation = ValidationRules {
            min_cooking_time: at_least_one(try_load(
                &lookup,
                "MIN_COOKING_TIME",
                MIN_COOKING_TIME,
            )?, "MIN_COOKING_TIME")?,
            min_ingredient_amount: at_least_one(try_load(
                &lookup,
                "MIN_INGREDIENT_AMOUNT",
                MIN_INGREDIENT_AMOUNT,
            )?, "MIN_INGREDIENT_AMOUNT")?,
        };

        Ok(Self {
            database_url,
            database_max_connections: try_load(&lookup, "DATABASE_MAX_CONNECTIONS", 5)?,
            redis_url: lookup("REDIS_URL"),
            port: try_load(&lookup, "PORT", 8000)?,
            jwt_secret,
            token_lifetime_hours: try_load(&lookup, "TOKEN_LIFETIME_HOURS", 24)?,
            media_root: lookup("MEDIA_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("media")),
            media_url: lookup("MEDIA_URL").unwrap_or_else(|| String::from("/media/")),
            page_size,
            validation,
        })
    }
}

fn try_load<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(key) {
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            message: e.to_string(),
        }),
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}

fn at_least_one(value: i32, key: &'static str) -> Result<i32, ConfigError> {
    if value < 1 {
        return Err(ConfigError::Invalid {
            key,
            message: String::from("must be at least 1"),
        });
    }
    Ok(value)
}
