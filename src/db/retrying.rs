use async_trait::async_trait;

use crate::db::models::challenge::{Challenge, ChallengeId, ChallengeParticipation};
use crate::db::models::classification::ClassificationRecord;
use crate::db::models::post::{Post, PostId};
use crate::db::models::referral::Referral;
use crate::db::models::user::{LeaderboardEntry, Progression, Recommendations, User, UserId};
use crate::db::store::{ChangeFeed, ProfileStore, SharedStore, StoreResult, Table};
use crate::util::retry::{RetryPolicy, with_retry};

/// Retries transient failures of the wrapped store with capped exponential backoff.
///
/// Sits between the engine and the real store; the engine itself never retries.
#[derive(Debug, Clone)]
pub struct RetryingStore {
    inner: SharedStore,
    policy: RetryPolicy,
}

impl RetryingStore {
    pub fn new(inner: SharedStore, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl ProfileStore for RetryingStore {
    async fn get_user(&self, id: &UserId) -> StoreResult<Option<User>> {
        with_retry(&self.policy, "get_user", || self.inner.get_user(id)).await
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        with_retry(&self.policy, "find_user_by_email", || {
            self.inner.find_user_by_email(email)
        })
        .await
    }

    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        with_retry(&self.policy, "insert_user", || self.inner.insert_user(user)).await
    }

    async fn update_progression(&self, id: &UserId, progression: &Progression) -> StoreResult<()> {
        with_retry(&self.policy, "update_progression", || {
            self.inner.update_progression(id, progression)
        })
        .await
    }

    async fn update_recommendations(&self, id: &UserId, recs: &Recommendations) -> StoreResult<()> {
        with_retry(&self.policy, "update_recommendations", || {
            self.inner.update_recommendations(id, recs)
        })
        .await
    }

    async fn get_onboarding_completed(&self, id: &UserId) -> StoreResult<Option<bool>> {
        with_retry(&self.policy, "get_onboarding_completed", || {
            self.inner.get_onboarding_completed(id)
        })
        .await
    }

    async fn list_users_by_points(&self, limit: Option<i64>) -> StoreResult<Vec<LeaderboardEntry>> {
        with_retry(&self.policy, "list_users_by_points", || {
            self.inner.list_users_by_points(limit)
        })
        .await
    }

    async fn list_challenges(&self) -> StoreResult<Vec<Challenge>> {
        with_retry(&self.policy, "list_challenges", || self.inner.list_challenges()).await
    }

    async fn get_participation(
        &self,
        user: &UserId,
        challenge: ChallengeId,
    ) -> StoreResult<Option<ChallengeParticipation>> {
        with_retry(&self.policy, "get_participation", || {
            self.inner.get_participation(user, challenge)
        })
        .await
    }

    async fn upsert_participation(&self, row: &ChallengeParticipation) -> StoreResult<()> {
        with_retry(&self.policy, "upsert_participation", || {
            self.inner.upsert_participation(row)
        })
        .await
    }

    async fn seed_participation(&self, row: &ChallengeParticipation) -> StoreResult<()> {
        with_retry(&self.policy, "seed_participation", || {
            self.inner.seed_participation(row)
        })
        .await
    }

    async fn list_participations_for_challenge(
        &self,
        challenge: ChallengeId,
    ) -> StoreResult<Vec<ChallengeParticipation>> {
        with_retry(&self.policy, "list_participations_for_challenge", || {
            self.inner.list_participations_for_challenge(challenge)
        })
        .await
    }

    async fn list_participations_for_user(
        &self,
        user: &UserId,
    ) -> StoreResult<Vec<ChallengeParticipation>> {
        with_retry(&self.policy, "list_participations_for_user", || {
            self.inner.list_participations_for_user(user)
        })
        .await
    }

    async fn insert_referral(&self, referral: &Referral) -> StoreResult<()> {
        with_retry(&self.policy, "insert_referral", || {
            self.inner.insert_referral(referral)
        })
        .await
    }

    async fn list_referrals_by_referrer(&self, referrer: &UserId) -> StoreResult<Vec<Referral>> {
        with_retry(&self.policy, "list_referrals_by_referrer", || {
            self.inner.list_referrals_by_referrer(referrer)
        })
        .await
    }

    async fn insert_classification(&self, record: &ClassificationRecord) -> StoreResult<()> {
        with_retry(&self.policy, "insert_classification", || {
            self.inner.insert_classification(record)
        })
        .await
    }

    async fn count_recyclable_classifications(&self, user: &UserId) -> StoreResult<i64> {
        with_retry(&self.policy, "count_recyclable_classifications", || {
            self.inner.count_recyclable_classifications(user)
        })
        .await
    }

    async fn insert_post(&self, post: &Post) -> StoreResult<()> {
        with_retry(&self.policy, "insert_post", || self.inner.insert_post(post)).await
    }

    async fn get_post(&self, id: &PostId) -> StoreResult<Option<Post>> {
        with_retry(&self.policy, "get_post", || self.inner.get_post(id)).await
    }

    async fn update_post_reactions(&self, post: &Post) -> StoreResult<()> {
        with_retry(&self.policy, "update_post_reactions", || {
            self.inner.update_post_reactions(post)
        })
        .await
    }

    async fn count_posts_by_user(&self, user: &UserId) -> StoreResult<i64> {
        with_retry(&self.policy, "count_posts_by_user", || {
            self.inner.count_posts_by_user(user)
        })
        .await
    }

    async fn list_recent_posts(&self, limit: i64) -> StoreResult<Vec<Post>> {
        with_retry(&self.policy, "list_recent_posts", || {
            self.inner.list_recent_posts(limit)
        })
        .await
    }

    fn subscribe(&self, table: Table) -> ChangeFeed {
        self.inner.subscribe(table)
    }
}
