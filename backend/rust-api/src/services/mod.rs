use mongodb::Client as MongoClient;
use redis::aio::ConnectionManager;
use std::sync::Arc;

use crate::config::Config;
use crate::services::code_execution::{CodeExecutor, PistonExecutor};
use crate::store::{MongoStore, Store};

pub mod adventure_service;
pub mod attempt_service;
pub mod code_execution;
pub mod graph_validator;
pub mod judge_service;
pub mod leaderboard_service;
pub mod problem_service;

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub executor: Arc<dyn CodeExecutor>,
    /// Backs the submission rate limit; `None` disables it.
    pub redis: Option<ConnectionManager>,
}

impl AppState {
    pub async fn new(
        config: Config,
        mongo_client: MongoClient,
        redis_client: Option<redis::Client>,
    ) -> anyhow::Result<Self> {
        let store = MongoStore::new(
            mongo_client.clone(),
            mongo_client.database(&config.mongo_database),
        );
        store.ensure_indexes().await?;

        let redis = match redis_client {
            Some(client) => Some(connect_redis(client).await?),
            None => {
                tracing::warn!("Redis not configured; submission rate limit disabled");
                None
            }
        };

        let executor = PistonExecutor::new(config.piston_url.clone(), config.execution_timeout());

        Ok(Self::from_parts(
            config,
            Arc::new(store),
            Arc::new(executor),
            redis,
        ))
    }

    /// Assembles state from ready-made collaborators.
    pub fn from_parts(
        config: Config,
        store: Arc<dyn Store>,
        executor: Arc<dyn CodeExecutor>,
        redis: Option<ConnectionManager>,
    ) -> Self {
        Self {
            config,
            store,
            executor,
            redis,
        }
    }
}

async fn connect_redis(client: redis::Client) -> anyhow::Result<ConnectionManager> {
    tracing::info!("Attempting to connect to Redis...");

    let redis = tokio::time::timeout(
        std::time::Duration::from_secs(30),
        ConnectionManager::new(client),
    )
    .await
    .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

    let mut conn = redis.clone();
    tokio::time::timeout(
        std::time::Duration::from_secs(5),
        redis::cmd("PING").query_async::<String>(&mut conn),
    )
    .await
    .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

    tracing::info!("Redis connection established successfully");
    Ok(redis)
}
