use std::sync::Arc;

use futures::future::join_all;
use thiserror::Error;

use environ_engine::api::server::{RouteError, start_server};
use environ_engine::db::prelude::*;
use environ_engine::db::redis::{RedisErr, RedisViewCache, redis_pool};
use environ_engine::engine::{EngineError, ProgressionEngine};
use environ_engine::realtime::RealtimeRefresher;
use environ_engine::services::assistant::{Assistant, AssistantClient, AssistantErr, OfflineAssistant};
use environ_engine::util::env::{EnvErr, Var, request_timeout, var_parsed};
use environ_engine::util::retry::RetryPolicy;
use environ_engine::util::telemetry;

#[derive(Debug, Error)]
enum RunnerErr {
    #[error(transparent)]
    Pg(#[from] PgError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Redis(#[from] RedisErr),

    #[error(transparent)]
    Assistant(#[from] AssistantErr),

    #[error(transparent)]
    Env(#[from] EnvErr),

    #[error(transparent)]
    Std(#[from] Box<dyn std::error::Error>),
}

type Result<T> = core::result::Result<T, RunnerErr>;

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry_registry = telemetry::Telemetry::new().await?.register();

    tracing::info!("starting main application");

    let pg = PgStore::new(db_pool().await?);
    pg.migrate().await?;

    let mut handles = vec![pg.listen().await?];

    let attempts = var_parsed::<u32>(Var::StoreRetryAttempts).await?;
    let store: SharedStore = Arc::new(RetryingStore::new(
        Arc::new(pg),
        RetryPolicy::default().with_attempts(attempts),
    ));

    let assistant: Arc<dyn Assistant> = match AssistantClient::from_env().await? {
        Some(client) => Arc::new(client),
        None => {
            tracing::warn!("no assistant configured, recommendations fall back to defaults");
            Arc::new(OfflineAssistant)
        }
    };
    let engine = Arc::new(ProgressionEngine::load(store.clone(), assistant).await?);

    let ttl = var_parsed::<u64>(Var::ViewCacheTtlSecs).await?;
    let cache = RedisViewCache::new(redis_pool().await?, ttl);
    let refresher = Arc::new(RealtimeRefresher::new(store, Arc::new(cache)));
    refresher.prime().await;
    handles.extend(refresher.spawn());

    handles.extend(start_server(engine, request_timeout().await?).await?);

    _ = join_all(handles).await;

    telemetry_registry.shutdown();
    Ok(())
}
