use core::fmt;
use std::sync::LazyLock;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::instrument;

use crate::realtime::{RealtimeResult, View, ViewSink};
use crate::util::env::{EnvErr, Var};
use crate::var;

const CANNOT_DEBUG: &str = "RedisPool { ConnectionManager }";
const VIEW_KEY_PREFIX: &str = "environ:view:";

static REDIS_POOL: LazyLock<OnceCell<RedisPool>> = LazyLock::new(OnceCell::new);
pub async fn redis_pool() -> RedisResult<&'static RedisPool> {
    REDIS_POOL
        .get_or_try_init(|| async { RedisPool::new().await })
        .await
}

pub struct RedisPool {
    pub manager: ConnectionManager,
}

impl fmt::Debug for RedisPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", CANNOT_DEBUG)
    }
}

impl RedisPool {
    #[instrument]
    pub async fn new() -> RedisResult<Self> {
        let redis_url = var!(Var::RedisUrl).await?;
        tracing::debug!(redis_url, "connecting to redis server");

        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;

        Ok(Self { manager })
    }
}

/// Full key for a cached view, e.g. `environ:view:leaderboard`.
pub fn view_key(view: &View) -> String {
    format!("{}{}", VIEW_KEY_PREFIX, view.name())
}

/// Caches each refreshed aggregate view as a JSON string with a TTL.
#[derive(Debug)]
pub struct RedisViewCache {
    pool: &'static RedisPool,
    ttl_secs: u64,
}

impl RedisViewCache {
    pub fn new(pool: &'static RedisPool, ttl_secs: u64) -> Self {
        Self { pool, ttl_secs }
    }
}

#[async_trait]
impl ViewSink for RedisViewCache {
    #[instrument(skip(self, view), fields(view = view.name()))]
    async fn publish(&self, view: &View) -> RealtimeResult<()> {
        let mut conn = self.pool.manager.clone();
        let payload = serde_json::to_string(view)?;

        let _: () = conn
            .set_ex(view_key(view), payload, self.ttl_secs)
            .await
            .map_err(RedisErr::from)?;

        tracing::debug!(ttl = self.ttl_secs, "cached view");
        Ok(())
    }
}

pub type RedisResult<T> = core::result::Result<T, RedisErr>;

#[derive(Debug, Error)]
pub enum RedisErr {
    #[error(transparent)]
    EnvErr(#[from] EnvErr),

    #[error(transparent)]
    RedisClientError(#[from] redis::RedisError),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_view_keys() {
        assert_eq!(view_key(&View::Leaderboard(Vec::new())), "environ:view:leaderboard");
        assert_eq!(view_key(&View::Feed(Vec::new())), "environ:view:feed");
    }
}
