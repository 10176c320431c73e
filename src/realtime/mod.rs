//! Re-fetches aggregate views when a watched table changes.
//!
//! Notifications only say "something in table X changed"; every refresh re-reads the whole
//! view from the store. Nothing in the engine depends on these views being current.

use core::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::instrument;

use crate::constants::{FEED_PAGE_SIZE, LEADERBOARD_SIZE};
use crate::db::models::challenge::ChallengeStanding;
use crate::db::models::post::Post;
use crate::db::models::user::LeaderboardEntry;
use crate::db::redis::RedisErr;
use crate::db::store::{SharedStore, StoreError, Table};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    Leaderboard,
    Challenges,
    Feed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "view", content = "data", rename_all = "snake_case")]
pub enum View {
    Leaderboard(Vec<LeaderboardEntry>),
    Challenges(Vec<ChallengeStanding>),
    Feed(Vec<Post>),
}

impl View {
    pub fn name(&self) -> &'static str {
        match self {
            View::Leaderboard(_) => "leaderboard",
            View::Challenges(_) => "challenges",
            View::Feed(_) => "feed",
        }
    }

    #[cfg(test)]
    pub fn kind(&self) -> ViewKind {
        match self {
            View::Leaderboard(_) => ViewKind::Leaderboard,
            View::Challenges(_) => ViewKind::Challenges,
            View::Feed(_) => ViewKind::Feed,
        }
    }
}

/// Tables the refresher subscribes to.
pub const WATCHED_TABLES: [Table; 4] = [
    Table::Users,
    Table::Challenges,
    Table::ChallengeParticipants,
    Table::Posts,
];

/// Views that must be re-read after a change to `table`.
pub fn views_for(table: Table) -> &'static [ViewKind] {
    match table {
        Table::Users => &[ViewKind::Leaderboard],
        Table::Challenges | Table::ChallengeParticipants => &[ViewKind::Challenges],
        Table::Posts => &[ViewKind::Feed],
        Table::Referrals | Table::Classifications => &[],
    }
}

/// Destination for refreshed views.
#[async_trait]
pub trait ViewSink: Send + Sync + fmt::Debug {
    async fn publish(&self, view: &View) -> RealtimeResult<()>;
}

#[derive(Debug)]
pub struct RealtimeRefresher {
    store: SharedStore,
    sink: Arc<dyn ViewSink>,
}

impl RealtimeRefresher {
    pub fn new(store: SharedStore, sink: Arc<dyn ViewSink>) -> Self {
        Self { store, sink }
    }

    #[instrument(skip(self))]
    pub async fn refresh(&self, kind: ViewKind) -> RealtimeResult<View> {
        Ok(match kind {
            ViewKind::Leaderboard => View::Leaderboard(
                self.store
                    .list_users_by_points(Some(LEADERBOARD_SIZE as i64))
                    .await?,
            ),
            ViewKind::Challenges => {
                let mut standings = Vec::new();
                for challenge in self.store.list_challenges().await? {
                    let rows = self
                        .store
                        .list_participations_for_challenge(challenge.id)
                        .await?;
                    standings.push(ChallengeStanding::from_rows(challenge, &rows));
                }
                View::Challenges(standings)
            }
            ViewKind::Feed => View::Feed(self.store.list_recent_posts(FEED_PAGE_SIZE).await?),
        })
    }

    pub async fn refresh_and_publish(&self, kind: ViewKind) -> RealtimeResult<()> {
        let view = self.refresh(kind).await?;
        self.sink.publish(&view).await
    }

    /// Publishes every view once, so the cache is warm before the first change arrives.
    pub async fn prime(&self) {
        for kind in [ViewKind::Leaderboard, ViewKind::Challenges, ViewKind::Feed] {
            if let Err(e) = self.refresh_and_publish(kind).await {
                tracing::warn!(?kind, error = %e, "initial view refresh failed");
            }
        }
    }

    /// One task per watched table. Subscriptions are taken before this returns.
    pub fn spawn(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        WATCHED_TABLES
            .into_iter()
            .map(|table| {
                let mut feed = self.store.subscribe(table);
                let this = self.clone();

                tokio::spawn(async move {
                    while feed.next().await.is_some() {
                        for kind in views_for(table) {
                            if let Err(e) = this.refresh_and_publish(*kind).await {
                                tracing::warn!(%table, ?kind, error = %e, "view refresh failed");
                            }
                        }
                    }
                    tracing::debug!(%table, "change feed closed");
                })
            })
            .collect()
    }
}

pub type RealtimeResult<T> = core::result::Result<T, RealtimeErr>;

#[derive(Debug, Error)]
pub enum RealtimeErr {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cache(#[from] RedisErr),

    #[error("view serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests;
