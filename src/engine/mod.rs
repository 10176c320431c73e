//! The progression engine.
//!
//! Every operation is a sequence of plain store reads and writes with no transaction around
//! them. Correctness under duplicates and partial failure comes from clamping progress to the
//! goal and from never granting a badge that is already held, so re-running an event converges.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::db::models::challenge::ChallengeId;
use crate::db::models::user::{User, UserId};
use crate::db::store::{SharedStore, StoreError};
use crate::services::assistant::{Assistant, AssistantErr};

pub mod awards;
pub mod catalog;
pub mod ledger;
pub mod level;

mod challenges;
mod classification;
mod feed;
mod profile;
mod recommendations;
mod referrals;

pub use catalog::{Cascade, ChallengeCatalog, ChallengeRule, ProgressSource};
pub use challenges::ChallengeProgress;
pub use classification::ClassificationOutcome;
pub use feed::PostOutcome;
pub use level::{FeatureGates, LevelSummary};
pub use profile::{EcoTipOutcome, Leaderboard, ProfileStatus, RankedEntry};
pub use recommendations::RecommendationOutcome;
pub use referrals::ReferralOutcome;

#[derive(Debug)]
pub struct ProgressionEngine {
    store: SharedStore,
    catalog: ChallengeCatalog,
    assistant: Arc<dyn Assistant>,
}

impl ProgressionEngine {
    pub fn new(store: SharedStore, catalog: ChallengeCatalog, assistant: Arc<dyn Assistant>) -> Self {
        Self {
            store,
            catalog,
            assistant,
        }
    }

    /// Reads the challenge catalog once and builds an engine around it.
    #[tracing::instrument(skip_all)]
    pub async fn load(store: SharedStore, assistant: Arc<dyn Assistant>) -> EngineResult<Self> {
        let catalog = ChallengeCatalog::from_challenges(store.list_challenges().await?);
        if catalog.is_empty() {
            tracing::warn!("challenge catalog is empty");
        } else {
            tracing::info!(challenges = catalog.len(), "challenge catalog loaded");
        }

        Ok(Self::new(store, catalog, assistant))
    }

    pub fn catalog(&self) -> &ChallengeCatalog {
        &self.catalog
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    async fn require_user(&self, id: &UserId) -> EngineResult<User> {
        self.store
            .get_user(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("user {id}")))
    }
}

/// Outcome of one `advance_challenge` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdvanceOutcome {
    pub challenge_id: ChallengeId,
    pub progress: f64,
    pub completed: bool,
    pub points_awarded: i64,
    pub badges_granted: Vec<String>,
    pub level: Option<i32>,
}

pub type EngineResult<T> = core::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0} not found")]
    NotFound(String),

    /// A rule rejected the event after looking at stored state.
    #[error("{0}")]
    ValidationFailed(String),

    /// The event itself is malformed; nothing was read or written.
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("assistant unavailable: {0}")]
    AssistantUnavailable(#[from] AssistantErr),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Unavailable(reason) => EngineError::StoreUnavailable(reason),
            StoreError::SchemaMismatch(reason) => EngineError::SchemaMismatch(reason),
            other => EngineError::Store(other),
        }
    }
}
