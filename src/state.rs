use std::sync::Arc;

use chrono::Duration;
use redis::aio::MultiplexedConnection;
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};

use crate::{
    config::Config,
    error::{ApiError, CacheError, QueryError},
    jwt::{jwt_key, JwtKey},
    media::Media,
    validation::ValidationRules,
};

pub struct State {
    pub pool: Pool<Postgres>,
    pub cache: Option<MultiplexedConnection>,
    pub config: Config,
    pub media: Media,
    pub jwt_key: JwtKey,
}

impl State {
    /// Connects to the database (and Redis when configured) and brings the
    /// schema up to date.
    pub async fn connect(config: Config) -> Result<Arc<Self>, ApiError> {
        log::info!("Connecting to database...");
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .connect(&config.database_url)
            .await
            .map_err(QueryError::from)?;

        log::info!("Running migrations...");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(QueryError::from)?;

        let cache = match &config.redis_url {
            Some(url) => {
                log::info!("Connecting to cache...");
                let client = redis::Client::open(url.as_str()).map_err(CacheError::from)?;
                let connection = client
                    .get_multiplexed_async_connection()
                    .await
                    .map_err(CacheError::from)?;
                Some(connection)
            }
            None => {
                log::info!("REDIS_URL not set, catalog reads go straight to the database");
                None
            }
        };

        Self::from_parts(pool, cache, config)
    }

    pub fn from_parts(
        pool: Pool<Postgres>,
        cache: Option<MultiplexedConnection>,
        config: Config,
    ) -> Result<Arc<Self>, ApiError> {
        let jwt_key = jwt_key(&config.jwt_secret)?;
        let media = Media::new(config.media_root.clone(), &config.media_url);

        Ok(Arc::new(Self {
            pool,
            cache,
            config,
            media,
            jwt_key,
        }))
    }

    pub fn rules(&self) -> &ValidationRules {
        &self.config.validation
    }

    pub fn token_lifetime(&self) -> Duration {
        Duration::hours(self.config.token_lifetime_hours)
    }
}
