use deadpool::{managed, Runtime};
use std::time::Duration;

use crate::error::HarvestError;
use crate::surreal_client::SurrealClient;

#[derive(Debug, Clone)]
pub struct SurrealConnectionConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    pub namespace: String,
    pub database: String,
}

impl SurrealConnectionConfig {
    /// Embedded engines have no users to sign in as.
    pub fn requires_signin(&self) -> bool {
        !self.username.is_empty() && !self.url.starts_with("mem:")
    }
}

#[derive(Debug)]
pub struct SurrealConnectionManager {
    config: SurrealConnectionConfig,
}

impl SurrealConnectionManager {
    pub fn new(config: SurrealConnectionConfig) -> Self {
        Self { config }
    }
}

impl managed::Manager for SurrealConnectionManager {
    type Type = SurrealClient;
    type Error = HarvestError;

    async fn create(&self) -> Result<Self::Type, Self::Error> {
        SurrealClient::connect(&self.config)
            .await
            .map_err(|e| HarvestError::StoreError(format!("Failed to connect: {:#}", e)))
    }

    async fn recycle(
        &self,
        conn: &mut Self::Type,
        _: &managed::Metrics,
    ) -> managed::RecycleResult<Self::Error> {
        match conn.db.query("RETURN 1").await {
            Ok(_) => Ok(()),
            Err(e) => Err(managed::RecycleError::Backend(HarvestError::StoreError(format!(
                "Failed to recycle connection: {}",
                e
            )))),
        }
    }
}

pub type SurrealPool = managed::Pool<SurrealConnectionManager>;

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_size: usize,
    pub connection_timeout: Duration,
    pub recycle_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 10,
            connection_timeout: Duration::from_secs(30),
            recycle_timeout: Some(Duration::from_secs(10)),
        }
    }
}

pub fn create_pool(
    connection_config: SurrealConnectionConfig,
    pool_config: PoolConfig,
) -> Result<SurrealPool, HarvestError> {
    let manager = SurrealConnectionManager::new(connection_config);

    managed::Pool::builder(manager)
        .max_size(pool_config.max_size)
        .runtime(Runtime::Tokio1)
        .create_timeout(Some(pool_config.connection_timeout))
        .wait_timeout(Some(pool_config.connection_timeout))
        .recycle_timeout(pool_config.recycle_timeout)
        .build()
        .map_err(|e| HarvestError::StoreError(format!("Failed to create connection pool: {}", e)))
}
