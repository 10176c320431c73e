//! The contract the progression engine requires from its record store.
//!
//! Implementations: [`PgStore`](crate::db::pg::PgStore) for PostgreSQL,
//! [`MemoryStore`](crate::db::memory::MemoryStore) in-process, and
//! [`RetryingStore`](crate::db::retrying::RetryingStore) which wraps either one with
//! retry-with-backoff for transient failures.
//!
//! No method offers transactions or locking. Every `upsert_*`/`update_*` is a single
//! all-or-nothing write, and concurrent writers to the same row resolve last-write-wins.

use core::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::db::models::challenge::{Challenge, ChallengeId, ChallengeParticipation};
use crate::db::models::classification::ClassificationRecord;
use crate::db::models::post::{Post, PostId};
use crate::db::models::referral::Referral;
use crate::db::models::user::{LeaderboardEntry, Progression, Recommendations, User, UserId};

pub type SharedStore = Arc<dyn ProfileStore>;
pub type StoreResult<T> = core::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Network, pool or timeout failure; safe to retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// An expected column or field is missing from the stored record.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("store rejected write: {0}")]
    Rejected(String),

    #[error(transparent)]
    Sqlx(sqlx::Error),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::Io(e) => StoreError::Unavailable(e.to_string()),
            sqlx::Error::PoolTimedOut => StoreError::Unavailable("connection pool timed out".into()),
            sqlx::Error::PoolClosed => StoreError::Unavailable("connection pool closed".into()),
            sqlx::Error::WorkerCrashed => StoreError::Unavailable("connection worker crashed".into()),
            sqlx::Error::Tls(e) => StoreError::Unavailable(e.to_string()),
            sqlx::Error::ColumnNotFound(column) => StoreError::SchemaMismatch(column),
            sqlx::Error::ColumnDecode { index, source } => {
                StoreError::SchemaMismatch(format!("column {index}: {source}"))
            }
            sqlx::Error::Database(db) => {
                // 42703: undefined_column
                if db.code().as_deref() == Some("42703") {
                    StoreError::SchemaMismatch(db.message().to_string())
                } else {
                    StoreError::Rejected(db.message().to_string())
                }
            }
            other => StoreError::Sqlx(other),
        }
    }
}

/// Logical tables whose writes produce change notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Users,
    Challenges,
    ChallengeParticipants,
    Referrals,
    Posts,
    Classifications,
}

impl Table {
    pub const ALL: [Table; 6] = [
        Table::Users,
        Table::Challenges,
        Table::ChallengeParticipants,
        Table::Referrals,
        Table::Posts,
        Table::Classifications,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Users => "users",
            Table::Challenges => "challenges",
            Table::ChallengeParticipants => "challenge_participants",
            Table::Referrals => "referrals",
            Table::Posts => "posts",
            Table::Classifications => "classifications",
        }
    }

    pub fn parse(name: &str) -> Option<Table> {
        Table::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// "Something in `table` changed, re-read it." Carries no row payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeEvent {
    pub table: Table,
}

/// A subscription to one table's change notifications.
#[derive(Debug)]
pub struct ChangeFeed {
    table: Table,
    rx: broadcast::Receiver<ChangeEvent>,
}

impl ChangeFeed {
    pub fn new(table: Table, rx: broadcast::Receiver<ChangeEvent>) -> Self {
        Self { table, rx }
    }

    pub fn table(&self) -> Table {
        self.table
    }

    /// Waits for the next change to this feed's table. A lagged receiver reports a change,
    /// since missed notifications still mean the table moved. `None` once the store is gone.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.table == self.table => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::debug!(table = %self.table, missed, "change feed lagged");
                    return Some(ChangeEvent { table: self.table });
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[async_trait]
pub trait ProfileStore: Send + Sync + fmt::Debug {
    // users
    async fn get_user(&self, id: &UserId) -> StoreResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    /// Inserts a user row, leaving an existing row with the same id untouched.
    async fn insert_user(&self, user: &User) -> StoreResult<()>;
    /// Writes points, level and badges in one update.
    async fn update_progression(&self, id: &UserId, progression: &Progression) -> StoreResult<()>;
    /// Writes suggestions and their progress map as one unit.
    async fn update_recommendations(&self, id: &UserId, recs: &Recommendations) -> StoreResult<()>;
    /// `Ok(None)` when the user row is absent, `Err(SchemaMismatch)` when the column is.
    async fn get_onboarding_completed(&self, id: &UserId) -> StoreResult<Option<bool>>;
    async fn list_users_by_points(&self, limit: Option<i64>) -> StoreResult<Vec<LeaderboardEntry>>;

    // challenges
    async fn list_challenges(&self) -> StoreResult<Vec<Challenge>>;
    async fn get_participation(
        &self,
        user: &UserId,
        challenge: ChallengeId,
    ) -> StoreResult<Option<ChallengeParticipation>>;
    /// Upsert keyed on `(user_id, challenge_id)`; overwrites progress and completed.
    async fn upsert_participation(&self, row: &ChallengeParticipation) -> StoreResult<()>;
    /// Insert keyed on `(user_id, challenge_id)` that never touches an existing row.
    async fn seed_participation(&self, row: &ChallengeParticipation) -> StoreResult<()>;
    async fn list_participations_for_challenge(
        &self,
        challenge: ChallengeId,
    ) -> StoreResult<Vec<ChallengeParticipation>>;
    async fn list_participations_for_user(
        &self,
        user: &UserId,
    ) -> StoreResult<Vec<ChallengeParticipation>>;

    // referrals
    async fn insert_referral(&self, referral: &Referral) -> StoreResult<()>;
    async fn list_referrals_by_referrer(&self, referrer: &UserId) -> StoreResult<Vec<Referral>>;

    // classifications
    async fn insert_classification(&self, record: &ClassificationRecord) -> StoreResult<()>;
    async fn count_recyclable_classifications(&self, user: &UserId) -> StoreResult<i64>;

    // posts
    async fn insert_post(&self, post: &Post) -> StoreResult<()>;
    async fn get_post(&self, id: &PostId) -> StoreResult<Option<Post>>;
    /// Overwrites likes, upvotes and comments of an existing post.
    async fn update_post_reactions(&self, post: &Post) -> StoreResult<()>;
    async fn count_posts_by_user(&self, user: &UserId) -> StoreResult<i64>;
    async fn list_recent_posts(&self, limit: i64) -> StoreResult<Vec<Post>>;

    /// Change notifications for one table.
    fn subscribe(&self, table: Table) -> ChangeFeed;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_table_names_round_trip() {
        for table in Table::ALL {
            assert_eq!(Table::parse(table.as_str()), Some(table));
        }
        assert_eq!(Table::parse("sessions"), None);
    }

    #[test]
    fn test_transient_classification() {
        assert!(StoreError::from(sqlx::Error::PoolTimedOut).is_transient());
        assert!(!StoreError::from(sqlx::Error::ColumnNotFound("level".into())).is_transient());
        assert!(matches!(
            StoreError::from(sqlx::Error::ColumnNotFound("onboarding_completed".into())),
            StoreError::SchemaMismatch(_)
        ));
    }

    #[tokio::test]
    async fn test_feed_filters_other_tables() {
        let (tx, rx) = broadcast::channel(8);
        let mut feed = ChangeFeed::new(Table::Users, rx);

        tx.send(ChangeEvent { table: Table::Posts }).unwrap();
        tx.send(ChangeEvent { table: Table::Users }).unwrap();

        assert_eq!(feed.next().await, Some(ChangeEvent { table: Table::Users }));

        drop(tx);
        assert_eq!(feed.next().await, None);
    }
}
