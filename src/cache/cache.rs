use std::future::Future;

use redis::{aio::MultiplexedConnection, AsyncCommands, FromRedisValue, ToRedisArgs};
use redis_macros::{FromRedisValue, ToRedisArgs};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    constants::{INGREDIENT_CACHE_KEY, TAG_CACHE_KEY},
    error::{ApiError, CacheError},
};

// Caching - keys

#[derive(Serialize, Clone, Debug)]
pub struct CacheKey<T: ToString + Serialize> {
    _value: T,
    _type: CacheKeyType,
}

impl<T: ToString + Serialize> CacheKey<T> {
    pub fn from(r#type: CacheKeyType, key: T) -> Self {
        Self {
            _value: key,
            _type: r#type,
        }
    }
}

impl<T: ToString + Serialize> std::fmt::Display for CacheKey<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = self._value.to_string();
        match self._type {
            CacheKeyType::Tag => write!(f, "tag-{value}"),
            CacheKeyType::TagList => write!(f, "tag-list-{value}"),
            CacheKeyType::Ingredient => write!(f, "ingredient-{value}"),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheKeyType {
    Tag,
    TagList,
    Ingredient,
}

impl CacheKeyType {
    pub fn new<T: ToString + Serialize>(self, key: T) -> CacheKey<T> {
        CacheKey::from(self, key)
    }
}

impl<T: ToString + Serialize> From<&CacheKey<T>> for CacheLifetime {
    fn from(value: &CacheKey<T>) -> Self {
        match value._type {
            CacheKeyType::Tag | CacheKeyType::TagList => CacheLifetime::BindTagCache,
            CacheKeyType::Ingredient => CacheLifetime::BindIngredientCache,
        }
    }
}

// Cache - wrappers

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheLifetime {
    BindTagCache,
    BindIngredientCache,
}

impl CacheLifetime {
    fn bind_key(&self) -> &'static str {
        match self {
            CacheLifetime::BindTagCache => TAG_CACHE_KEY,
            CacheLifetime::BindIngredientCache => INGREDIENT_CACHE_KEY,
        }
    }

    pub async fn get_cache_bind(
        &self,
        cache: &mut MultiplexedConnection,
    ) -> Result<Option<String>, ApiError> {
        get_cache_value::<&str, String>(self.bind_key(), cache).await
    }

    /// An entry stays valid while its catalog generation is unchanged.
    pub async fn validate_cache_bind(
        &self,
        bind: &Option<String>,
        cache: &mut MultiplexedConnection,
    ) -> Result<bool, ApiError> {
        Ok(bind == &self.get_cache_bind(cache).await?)
    }
}

/// Starts a new generation for every value bound to `lifetime`.
pub async fn bump_cache_bind(
    lifetime: CacheLifetime,
    cache: &mut MultiplexedConnection,
) -> Result<(), ApiError> {
    let key = lifetime.bind_key();
    let generation = Uuid::new_v4().to_string();
    log::trace!("> Bumping {key} to {generation}");
    set_cache_value(key, generation, cache).await
}

#[derive(Serialize, Deserialize, FromRedisValue, ToRedisArgs, Clone)]
pub struct RedisValue<T: Serialize + Send + Sync + Clone> {
    pub value: T,
    _lifetime: CacheLifetime,
    _bind: Option<String>,
}

impl<T: Serialize + Send + Sync + Clone + for<'a> Deserialize<'a>> RedisValue<T> {
    async fn new(
        value: T,
        lifetime: CacheLifetime,
        cache: &mut MultiplexedConnection,
    ) -> Result<Self, ApiError> {
        let bind = lifetime.get_cache_bind(cache).await?;

        Ok(Self {
            value,
            _lifetime: lifetime,
            _bind: bind,
        })
    }

    async fn validate<K: ToString + Serialize>(
        &self,
        key: &CacheKey<K>,
        cache: &mut MultiplexedConnection,
    ) -> Result<bool, ApiError> {
        if self._lifetime != CacheLifetime::from(key) {
            log::error!("Found conflicting bindings for {key}");
            return Err(ApiError::Internal(String::from("Conflicting cache bindings")));
        }

        self._lifetime.validate_cache_bind(&self._bind, cache).await
    }

    /// Reads a still-valid cached value, dropping entries that fail to decode.
    async fn lookup<K: ToString + Serialize>(
        key: &CacheKey<K>,
        cache: &mut MultiplexedConnection,
    ) -> Result<Option<Self>, ApiError> {
        let value = get_cache_value::<String, RedisValue<T>>(key.to_string(), cache)
            .await
            .unwrap_or_else(|_| {
                let mut c = cache.clone();
                let k = key.to_string();
                tokio::spawn(async move {
                    log::error!("> Failed to deserialize cached value. Deleting {}", &k);
                    if let Err(e) = delete_cache_value(k, &mut c).await {
                        log::error!("> Failed to delete cached value! {e}");
                    }
                });
                None
            });

        // * Cannot use .map(|| {...}) due to async closures
        match value {
            Some(value) => {
                log::trace!("> Found {key}");
                match value.validate(key, cache).await? {
                    true => Ok(Some(value)),
                    false => {
                        log::trace!("> Invalidated {key}");
                        Ok(None)
                    }
                }
            }
            None => Ok(None),
        }
    }

    async fn store<K: ToString + Serialize>(
        key: &CacheKey<K>,
        value: T,
        cache: &mut MultiplexedConnection,
    ) -> Result<Self, ApiError> {
        let value = RedisValue::new(value, key.into(), cache).await?;

        if let Err(e) =
            set_cache_value::<String, RedisValue<T>>(key.to_string(), value.clone(), cache).await
        {
            log::error!("{e:?}");
        }

        Ok(value)
    }

    pub async fn get_or_optional<F, Fut, K>(
        key: CacheKey<K>,
        cache: &mut MultiplexedConnection,
        callback: F,
    ) -> Result<Option<RedisValue<T>>, ApiError>
    where
        K: ToString + Serialize + Clone + Send + Sync,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Option<T>, ApiError>> + Send,
    {
        if let Some(value) = Self::lookup(&key, cache).await? {
            return Ok(Some(value));
        }

        log::trace!("> Fetching {key}");
        match callback().await? {
            Some(value) => Ok(Some(Self::store(&key, value, cache).await?)),
            None => Ok(None),
        }
    }

    pub async fn get_or<F, Fut, K>(
        key: CacheKey<K>,
        cache: &mut MultiplexedConnection,
        callback: F,
    ) -> Result<RedisValue<T>, ApiError>
    where
        K: ToString + Serialize + Clone + Send + Sync,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, ApiError>> + Send,
    {
        if let Some(value) = Self::lookup(&key, cache).await? {
            return Ok(value);
        }

        log::trace!("> Fetching {key}");
        let value = callback().await?;
        Self::store(&key, value, cache).await
    }
}

// Cache - raw handlers

pub async fn set_cache_value<K: ToRedisArgs + Send + Sync, V: ToRedisArgs + Send + Sync>(
    key: K,
    value: V,
    cache: &mut MultiplexedConnection,
) -> Result<(), ApiError> {
    let _: () = cache.set(key, value).await.map_err(CacheError::from)?;

    Ok(())
}

pub async fn delete_cache_value<K: ToRedisArgs + Send + Sync>(
    key: K,
    cache: &mut MultiplexedConnection,
) -> Result<(), ApiError> {
    let _: () = cache.del(key).await.map_err(CacheError::from)?;

    Ok(())
}

pub async fn get_cache_value<K: ToRedisArgs + Send + Sync, V: FromRedisValue>(
    key: K,
    cache: &mut MultiplexedConnection,
) -> Result<Option<V>, ApiError> {
    let value: Option<V> = cache.get(key).await.map_err(CacheError::from)?;

    Ok(value)
}
