//! In-process [`ProfileStore`].
//!
//! Same contract as the Postgres store, change feeds included, plus fault injection so the
//! engine's partial-failure behaviour can be exercised without a database.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast};
use tracing::instrument;

use crate::db::models::challenge::{Challenge, ChallengeId, ChallengeParticipation};
use crate::db::models::classification::ClassificationRecord;
use crate::db::models::post::{Post, PostId};
use crate::db::models::referral::Referral;
use crate::db::models::user::{LeaderboardEntry, Progression, Recommendations, User, UserId};
use crate::db::store::{ChangeEvent, ChangeFeed, ProfileStore, StoreError, StoreResult, Table};

const CHANGE_BUFFER: usize = 256;

/// Points at which [`MemoryStore`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Any read
    Read,
    /// `insert_user`, `update_progression`, `update_recommendations`
    UserWrite,
    /// `upsert_participation`, `seed_participation`
    ParticipationWrite,
    /// Referral, classification and post writes
    RecordWrite,
}

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    challenges: BTreeMap<ChallengeId, Challenge>,
    participations: BTreeMap<(UserId, ChallengeId), ChallengeParticipation>,
    referrals: Vec<Referral>,
    classifications: Vec<ClassificationRecord>,
    posts: Vec<Post>,
}

#[derive(Debug, Default)]
struct Faults {
    read: AtomicU32,
    user_write: AtomicU32,
    participation_write: AtomicU32,
    record_write: AtomicU32,
    onboarding_column_missing: AtomicBool,
}

#[derive(Debug)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    faults: Faults,
    changes: broadcast::Sender<ChangeEvent>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_challenges(Vec::new())
    }

    /// A store holding the default challenge catalog.
    pub fn seeded() -> Self {
        Self::with_challenges(Challenge::defaults())
    }

    pub fn with_challenges(challenges: Vec<Challenge>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        let tables = Tables {
            challenges: challenges.into_iter().map(|c| (c.id, c)).collect(),
            ..Default::default()
        };

        Self {
            tables: RwLock::new(tables),
            faults: Faults::default(),
            changes,
        }
    }

    /// The next `count` operations at `fault` fail with [`StoreError::Unavailable`].
    pub fn fail_next(&self, fault: Fault, count: u32) {
        self.counter(fault).store(count, Ordering::SeqCst);
    }

    /// Makes onboarding reads behave as if the column were absent from the schema.
    pub fn drop_onboarding_column(&self) {
        self.faults
            .onboarding_column_missing
            .store(true, Ordering::SeqCst);
    }

    fn counter(&self, fault: Fault) -> &AtomicU32 {
        match fault {
            Fault::Read => &self.faults.read,
            Fault::UserWrite => &self.faults.user_write,
            Fault::ParticipationWrite => &self.faults.participation_write,
            Fault::RecordWrite => &self.faults.record_write,
        }
    }

    fn check(&self, fault: Fault) -> StoreResult<()> {
        let tripped = self
            .counter(fault)
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        if tripped {
            tracing::debug!(?fault, "injected store failure");
            return Err(StoreError::Unavailable(format!("injected {fault:?} failure")));
        }
        Ok(())
    }

    fn notify(&self, table: Table) {
        let _ = self.changes.send(ChangeEvent { table });
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    #[instrument(skip(self), fields(user = %id))]
    async fn get_user(&self, id: &UserId) -> StoreResult<Option<User>> {
        self.check(Fault::Read)?;
        Ok(self.tables.read().await.users.get(id).cloned())
    }

    #[instrument(skip(self))]
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        self.check(Fault::Read)?;
        let email = email.trim();
        Ok(self
            .tables
            .read()
            .await
            .users
            .values()
            .find(|u| u.email.as_deref().is_some_and(|e| e.eq_ignore_ascii_case(email)))
            .cloned())
    }

    #[instrument(skip(self, user), fields(user = %user.id))]
    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        self.check(Fault::UserWrite)?;
        self.tables
            .write()
            .await
            .users
            .entry(user.id.clone())
            .or_insert_with(|| user.clone());

        self.notify(Table::Users);
        Ok(())
    }

    #[instrument(skip(self, progression), fields(user = %id))]
    async fn update_progression(&self, id: &UserId, progression: &Progression) -> StoreResult<()> {
        self.check(Fault::UserWrite)?;
        if let Some(user) = self.tables.write().await.users.get_mut(id) {
            user.apply(progression.clone());
        }

        self.notify(Table::Users);
        Ok(())
    }

    #[instrument(skip(self, recs), fields(user = %id))]
    async fn update_recommendations(&self, id: &UserId, recs: &Recommendations) -> StoreResult<()> {
        self.check(Fault::UserWrite)?;
        if let Some(user) = self.tables.write().await.users.get_mut(id) {
            user.recommendations = recs.clone();
        }

        self.notify(Table::Users);
        Ok(())
    }

    #[instrument(skip(self), fields(user = %id))]
    async fn get_onboarding_completed(&self, id: &UserId) -> StoreResult<Option<bool>> {
        self.check(Fault::Read)?;
        if self.faults.onboarding_column_missing.load(Ordering::SeqCst) {
            return Err(StoreError::SchemaMismatch(
                "column \"onboarding_completed\" does not exist".into(),
            ));
        }

        Ok(self
            .tables
            .read()
            .await
            .users
            .get(id)
            .map(|u| u.onboarding_completed))
    }

    #[instrument(skip(self))]
    async fn list_users_by_points(&self, limit: Option<i64>) -> StoreResult<Vec<LeaderboardEntry>> {
        self.check(Fault::Read)?;
        let tables = self.tables.read().await;

        let mut users: Vec<&User> = tables.users.values().collect();
        users.sort_by(|a, b| {
            b.points
                .cmp(&a.points)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });

        let limit = limit.map_or(users.len(), |l| l.max(0) as usize);
        Ok(users
            .into_iter()
            .take(limit)
            .map(|u| LeaderboardEntry {
                id: u.id.clone(),
                full_name: u.full_name.clone(),
                email: u.email.clone(),
                points: u.points,
                level: u.level,
            })
            .collect())
    }

    #[instrument(skip(self))]
    async fn list_challenges(&self) -> StoreResult<Vec<Challenge>> {
        self.check(Fault::Read)?;
        Ok(self.tables.read().await.challenges.values().cloned().collect())
    }

    #[instrument(skip(self), fields(user = %user, challenge = %challenge))]
    async fn get_participation(
        &self,
        user: &UserId,
        challenge: ChallengeId,
    ) -> StoreResult<Option<ChallengeParticipation>> {
        self.check(Fault::Read)?;
        Ok(self
            .tables
            .read()
            .await
            .participations
            .get(&(user.clone(), challenge))
            .cloned())
    }

    #[instrument(skip(self, row), fields(user = %row.user_id, challenge = %row.challenge_id))]
    async fn upsert_participation(&self, row: &ChallengeParticipation) -> StoreResult<()> {
        self.check(Fault::ParticipationWrite)?;
        self.tables
            .write()
            .await
            .participations
            .insert((row.user_id.clone(), row.challenge_id), row.clone());

        self.notify(Table::ChallengeParticipants);
        Ok(())
    }

    #[instrument(skip(self, row), fields(user = %row.user_id, challenge = %row.challenge_id))]
    async fn seed_participation(&self, row: &ChallengeParticipation) -> StoreResult<()> {
        self.check(Fault::ParticipationWrite)?;
        self.tables
            .write()
            .await
            .participations
            .entry((row.user_id.clone(), row.challenge_id))
            .or_insert_with(|| row.clone());

        self.notify(Table::ChallengeParticipants);
        Ok(())
    }

    #[instrument(skip(self), fields(challenge = %challenge))]
    async fn list_participations_for_challenge(
        &self,
        challenge: ChallengeId,
    ) -> StoreResult<Vec<ChallengeParticipation>> {
        self.check(Fault::Read)?;
        Ok(self
            .tables
            .read()
            .await
            .participations
            .values()
            .filter(|p| p.challenge_id == challenge)
            .cloned()
            .collect())
    }

    #[instrument(skip(self), fields(user = %user))]
    async fn list_participations_for_user(
        &self,
        user: &UserId,
    ) -> StoreResult<Vec<ChallengeParticipation>> {
        self.check(Fault::Read)?;
        Ok(self
            .tables
            .read()
            .await
            .participations
            .values()
            .filter(|p| &p.user_id == user)
            .cloned()
            .collect())
    }

    #[instrument(skip(self, referral), fields(referrer = %referral.referrer_id))]
    async fn insert_referral(&self, referral: &Referral) -> StoreResult<()> {
        self.check(Fault::RecordWrite)?;
        self.tables.write().await.referrals.push(referral.clone());

        self.notify(Table::Referrals);
        Ok(())
    }

    #[instrument(skip(self), fields(referrer = %referrer))]
    async fn list_referrals_by_referrer(&self, referrer: &UserId) -> StoreResult<Vec<Referral>> {
        self.check(Fault::Read)?;
        Ok(self
            .tables
            .read()
            .await
            .referrals
            .iter()
            .filter(|r| &r.referrer_id == referrer)
            .cloned()
            .collect())
    }

    #[instrument(skip(self, record), fields(user = %record.user_id))]
    async fn insert_classification(&self, record: &ClassificationRecord) -> StoreResult<()> {
        self.check(Fault::RecordWrite)?;
        self.tables.write().await.classifications.push(record.clone());

        self.notify(Table::Classifications);
        Ok(())
    }

    #[instrument(skip(self), fields(user = %user))]
    async fn count_recyclable_classifications(&self, user: &UserId) -> StoreResult<i64> {
        self.check(Fault::Read)?;
        Ok(self
            .tables
            .read()
            .await
            .classifications
            .iter()
            .filter(|c| &c.user_id == user && c.is_recyclable())
            .count() as i64)
    }

    #[instrument(skip(self, post), fields(post = %post.id))]
    async fn insert_post(&self, post: &Post) -> StoreResult<()> {
        self.check(Fault::RecordWrite)?;
        self.tables.write().await.posts.push(post.clone());

        self.notify(Table::Posts);
        Ok(())
    }

    #[instrument(skip(self), fields(post = %id))]
    async fn get_post(&self, id: &PostId) -> StoreResult<Option<Post>> {
        self.check(Fault::Read)?;
        Ok(self
            .tables
            .read()
            .await
            .posts
            .iter()
            .find(|p| &p.id == id)
            .cloned())
    }

    #[instrument(skip(self, post), fields(post = %post.id))]
    async fn update_post_reactions(&self, post: &Post) -> StoreResult<()> {
        self.check(Fault::RecordWrite)?;
        if let Some(stored) = self
            .tables
            .write()
            .await
            .posts
            .iter_mut()
            .find(|p| p.id == post.id)
        {
            stored.likes = post.likes.clone();
            stored.upvotes = post.upvotes.clone();
            stored.comments = post.comments.clone();
        }

        self.notify(Table::Posts);
        Ok(())
    }

    #[instrument(skip(self), fields(user = %user))]
    async fn count_posts_by_user(&self, user: &UserId) -> StoreResult<i64> {
        self.check(Fault::Read)?;
        Ok(self
            .tables
            .read()
            .await
            .posts
            .iter()
            .filter(|p| &p.user_id == user)
            .count() as i64)
    }

    #[instrument(skip(self))]
    async fn list_recent_posts(&self, limit: i64) -> StoreResult<Vec<Post>> {
        self.check(Fault::Read)?;
        Ok(self
            .tables
            .read()
            .await
            .posts
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    fn subscribe(&self, table: Table) -> ChangeFeed {
        ChangeFeed::new(table, self.changes.subscribe())
    }
}
