use std::sync::LazyLock;

use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::util::env;
use crate::util::env::Var;
use crate::var;

pub mod memory;
pub mod models;
pub mod pg;
pub mod redis;
pub mod retrying;
pub mod store;

pub mod prelude {
    pub use crate::db::PgError;
    pub use crate::db::db_pool;

    pub use crate::db::models::challenge::{Challenge, ChallengeId, ChallengeParticipation};
    pub use crate::db::models::challenge::ChallengeStanding;
    pub use crate::db::models::classification::ClassificationRecord;
    pub use crate::db::models::post::{Post, PostId, Reaction};
    pub use crate::db::models::referral::Referral;
    pub use crate::db::models::user::{LeaderboardEntry, Progression, Recommendations};
    pub use crate::db::models::user::{Suggestion, User, UserId};

    pub use crate::db::memory::MemoryStore;
    pub use crate::db::pg::PgStore;
    pub use crate::db::retrying::RetryingStore;
    pub use crate::db::store::{ChangeEvent, ChangeFeed, Table};
    pub use crate::db::store::{ProfileStore, SharedStore, StoreError, StoreResult};
}

static DB_POOL: LazyLock<OnceCell<Db>> = LazyLock::new(OnceCell::new);
pub async fn db_pool() -> PgResult<&'static PgPool> {
    Ok(&DB_POOL
        .get_or_try_init(|| async { Db::new_pool().await })
        .await?
        .pool)
}

struct Db {
    pool: PgPool,
}

impl Db {
    pub async fn new_pool() -> PgResult<Self> {
        let db_url = var!(Var::DatabaseUrl).await?;
        let pool = sqlx::PgPool::connect(db_url).await?;

        Ok(Self { pool })
    }
}

pub type PgResult<T> = core::result::Result<T, PgError>;

#[allow(clippy::enum_variant_names)]
#[derive(Debug, Error)]
pub enum PgError {
    #[error(transparent)]
    SqlxError(#[from] sqlx::Error),

    #[error(transparent)]
    MigrateError(#[from] sqlx::migrate::MigrateError),

    #[error("{0}")]
    EnvError(#[from] env::EnvErr),
}
