use serde::Deserialize;
use sqlx::{
    AnyPool, Row,
    any::{AnyPoolOptions, install_default_drivers},
};
use tracing::info;

use crate::{
    chain::{BlockHash, BlockHeight, Hash256, Point},
    error::Error,
};

pub mod rows;
pub mod tx;

pub use tx::StoreTx;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    /// Database URL, `sqlite:` and `postgres:` schemes are supported
    pub url: String,
    pub max_connections: Option<u32>,
}

impl Config {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: None,
        }
    }

    fn is_in_memory(&self) -> bool {
        self.url.starts_with("sqlite:")
            && (self.url.contains(":memory:") || self.url.contains("mode=memory"))
    }
}

/*
    Storage Gateway

    The only place that knows SQL. Reads go straight to the pool, writes go through a StoreTx which
    holds one pooled connection with an open transaction for as long as it lives.
*/

#[derive(Debug, Clone)]
pub struct SqlStore {
    pool: AnyPool,
}

impl SqlStore {
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        install_default_drivers();

        // every connection to an in-memory sqlite url opens a fresh database, so keep exactly one
        // alive for the lifetime of the pool
        let options = if config.is_in_memory() {
            AnyPoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            AnyPoolOptions::new()
                .max_connections(config.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS))
        };

        let pool = options.connect(&config.url).await?;

        Self::new(pool).await
    }

    /// Wrap an existing pool, creating the schema if it does not exist yet.
    pub async fn new(pool: AnyPool) -> Result<Self, Error> {
        let conn = pool.acquire().await?;
        let backend = conn.backend_name().to_owned();
        drop(conn);

        let migration = match backend.as_str() {
            "SQLite" => include_str!("../../migrations/sqlite.sql"),
            "PostgreSQL" => include_str!("../../migrations/postgres.sql"),
            other => {
                return Err(Error::custom(format!(
                    "unsupported database backend: {other}"
                )));
            }
        };

        sqlx::raw_sql(migration).execute(&pool).await?;

        info!(%backend, "storage ready");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Acquire a connection and open a transaction on it.
    pub async fn begin(&self) -> Result<StoreTx, Error> {
        let inner = self.pool.begin().await?;

        Ok(StoreTx::new(inner))
    }

    /// Greatest block height present in the mirror, `None` when it holds no blocks.
    pub async fn max_height(&self) -> Result<Option<BlockHeight>, Error> {
        let row = sqlx::query("SELECT MAX(height) AS max_height FROM block")
            .fetch_one(&self.pool)
            .await?;

        let max_height: Option<i64> = row.try_get("max_height")?;

        max_height.map(|h| rows::from_i64("height", h)).transpose()
    }

    pub async fn contains_block(
        &self,
        height: BlockHeight,
        hash: &BlockHash,
    ) -> Result<bool, Error> {
        let row = sqlx::query("SELECT id FROM block WHERE height = $1 AND hash = $2")
            .bind(rows::to_i64("height", height)?)
            .bind(hash.as_bytes().as_slice())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.is_some())
    }

    /// The `limit` highest stored blocks, highest first.
    pub async fn recent_points(&self, limit: usize) -> Result<Vec<Point>, Error> {
        let limit = rows::to_i64("limit", limit as u64)?;

        let records = sqlx::query("SELECT height, hash FROM block ORDER BY height DESC LIMIT $1")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        records
            .iter()
            .map(|row| -> Result<Point, Error> {
                let height = rows::from_i64("height", row.try_get("height")?)?;
                let hash: Vec<u8> = row.try_get("hash")?;

                let hash = Hash256::from_slice(&hash).ok_or_else(|| {
                    Error::custom(format!("stored hash at #{height} is {} bytes", hash.len()))
                })?;

                Ok(Point { height, hash })
            })
            .collect()
    }
}
