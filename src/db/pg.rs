use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgListener;
use sqlx::types::Json;
use sqlx::{Pool, Postgres};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::instrument;

use crate::db::PgResult;
use crate::db::models::challenge::{Challenge, ChallengeId, ChallengeParticipation};
use crate::db::models::classification::{ClassificationRecord, RECYCLABLE_PREFIX};
use crate::db::models::post::{Post, PostId, PostRow};
use crate::db::models::referral::Referral;
use crate::db::models::user::{
    LeaderboardEntry, Progression, Recommendations, User, UserId, UserRow,
};
use crate::db::store::{ChangeEvent, ChangeFeed, ProfileStore, StoreResult, Table};

/// Channel the migration's triggers `pg_notify` on; the payload is the table name.
pub const CHANGE_CHANNEL: &str = "environ_changes";

const CHANGE_BUFFER: usize = 256;
const RELISTEN_DELAY: Duration = Duration::from_secs(1);

const USER_COLUMNS: &str = r#"
    id, full_name, email, city, points, level, badges,
    recommendations, onboarding_completed, created_at, updated_at
"#;

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: &'static Pool<Postgres>,
    changes: broadcast::Sender<ChangeEvent>,
}

impl PgStore {
    pub fn new(pool: &'static Pool<Postgres>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self { pool, changes }
    }

    #[instrument(skip(self))]
    pub async fn migrate(&self) -> PgResult<()> {
        sqlx::migrate!("./migrations").run(self.pool).await?;
        tracing::info!("database migrations applied");
        Ok(())
    }

    /// Forwards `pg_notify` payloads into the per-table change feeds.
    ///
    /// After a dropped connection every table is reported as changed, since notifications
    /// sent while disconnected are lost.
    #[instrument(skip(self))]
    pub async fn listen(&self) -> StoreResult<JoinHandle<()>> {
        let mut listener = PgListener::connect_with(self.pool).await?;
        listener.listen(CHANGE_CHANNEL).await?;
        tracing::info!(channel = CHANGE_CHANNEL, "listening for change notifications");

        let tx = self.changes.clone();
        Ok(tokio::spawn(async move {
            loop {
                match listener.recv().await {
                    Ok(notification) => match Table::parse(notification.payload()) {
                        Some(table) => {
                            // no subscribers is fine
                            let _ = tx.send(ChangeEvent { table });
                        }
                        None => {
                            tracing::debug!(payload = notification.payload(), "ignoring notification");
                        }
                    },
                    Err(e) => {
                        tracing::warn!(error = ?e, "change listener interrupted");
                        tokio::time::sleep(RELISTEN_DELAY).await;
                        for table in Table::ALL {
                            let _ = tx.send(ChangeEvent { table });
                        }
                    }
                }
            }
        }))
    }
}

#[async_trait]
impl ProfileStore for PgStore {
    #[instrument(skip(self), fields(user = %id))]
    async fn get_user(&self, id: &UserId) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(User::from))
    }

    #[instrument(skip(self))]
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"
        ))
        .bind(email.trim())
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(User::from))
    }

    #[instrument(skip(self, user), fields(user = %user.id))]
    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (
                id,
                full_name,
                email,
                city,
                points,
                level,
                badges,
                recommendations,
                onboarding_completed,
                created_at,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW(), NOW())
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&user.id)
        .bind(&user.full_name)
        .bind(&user.email)
        .bind(&user.city)
        .bind(user.points)
        .bind(user.level)
        .bind(user.badges.iter().cloned().collect::<Vec<_>>())
        .bind(Json(&user.recommendations))
        .bind(user.onboarding_completed)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self, progression), fields(user = %id, points = progression.points, level = progression.level))]
    async fn update_progression(&self, id: &UserId, progression: &Progression) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET points = $2,
                level = $3,
                badges = $4,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(progression.points)
        .bind(progression.level)
        .bind(progression.badges.iter().cloned().collect::<Vec<_>>())
        .execute(self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self, recs), fields(user = %id))]
    async fn update_recommendations(&self, id: &UserId, recs: &Recommendations) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET recommendations = $2,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(Json(recs))
        .execute(self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self), fields(user = %id))]
    async fn get_onboarding_completed(&self, id: &UserId) -> StoreResult<Option<bool>> {
        Ok(
            sqlx::query_scalar::<_, bool>("SELECT onboarding_completed FROM users WHERE id = $1")
                .bind(id)
                .fetch_optional(self.pool)
                .await?,
        )
    }

    #[instrument(skip(self))]
    async fn list_users_by_points(&self, limit: Option<i64>) -> StoreResult<Vec<LeaderboardEntry>> {
        // LIMIT NULL is LIMIT ALL
        Ok(sqlx::query_as::<_, LeaderboardEntry>(
            r#"
            SELECT id, full_name, email, points, level
            FROM users
            ORDER BY points DESC, created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool)
        .await?)
    }

    #[instrument(skip(self))]
    async fn list_challenges(&self) -> StoreResult<Vec<Challenge>> {
        Ok(sqlx::query_as::<_, Challenge>(
            "SELECT id, name, goal, unit, start_date, end_date FROM challenges ORDER BY id",
        )
        .fetch_all(self.pool)
        .await?)
    }

    #[instrument(skip(self), fields(user = %user, challenge = %challenge))]
    async fn get_participation(
        &self,
        user: &UserId,
        challenge: ChallengeId,
    ) -> StoreResult<Option<ChallengeParticipation>> {
        Ok(sqlx::query_as::<_, ChallengeParticipation>(
            r#"
            SELECT user_id, challenge_id, progress, completed
            FROM challenge_participants
            WHERE user_id = $1
            AND challenge_id = $2
            "#,
        )
        .bind(user)
        .bind(challenge)
        .fetch_optional(self.pool)
        .await?)
    }

    #[instrument(skip(self, row), fields(user = %row.user_id, challenge = %row.challenge_id, progress = row.progress))]
    async fn upsert_participation(&self, row: &ChallengeParticipation) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO challenge_participants (
                user_id,
                challenge_id,
                progress,
                completed,
                updated_at
            )
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (user_id, challenge_id)
            DO UPDATE SET
                progress = EXCLUDED.progress,
                completed = EXCLUDED.completed,
                updated_at = NOW()
            "#,
        )
        .bind(&row.user_id)
        .bind(row.challenge_id)
        .bind(row.progress)
        .bind(row.completed)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self, row), fields(user = %row.user_id, challenge = %row.challenge_id))]
    async fn seed_participation(&self, row: &ChallengeParticipation) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO challenge_participants (user_id, challenge_id, progress, completed)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, challenge_id) DO NOTHING
            "#,
        )
        .bind(&row.user_id)
        .bind(row.challenge_id)
        .bind(row.progress)
        .bind(row.completed)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self), fields(challenge = %challenge))]
    async fn list_participations_for_challenge(
        &self,
        challenge: ChallengeId,
    ) -> StoreResult<Vec<ChallengeParticipation>> {
        Ok(sqlx::query_as::<_, ChallengeParticipation>(
            r#"
            SELECT user_id, challenge_id, progress, completed
            FROM challenge_participants
            WHERE challenge_id = $1
            "#,
        )
        .bind(challenge)
        .fetch_all(self.pool)
        .await?)
    }

    #[instrument(skip(self), fields(user = %user))]
    async fn list_participations_for_user(
        &self,
        user: &UserId,
    ) -> StoreResult<Vec<ChallengeParticipation>> {
        Ok(sqlx::query_as::<_, ChallengeParticipation>(
            r#"
            SELECT user_id, challenge_id, progress, completed
            FROM challenge_participants
            WHERE user_id = $1
            ORDER BY challenge_id
            "#,
        )
        .bind(user)
        .fetch_all(self.pool)
        .await?)
    }

    #[instrument(skip(self, referral), fields(referrer = %referral.referrer_id, referred = %referral.referred_id))]
    async fn insert_referral(&self, referral: &Referral) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO referrals (id, referrer_id, referred_id, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&referral.id)
        .bind(&referral.referrer_id)
        .bind(&referral.referred_id)
        .bind(referral.created_at)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self), fields(referrer = %referrer))]
    async fn list_referrals_by_referrer(&self, referrer: &UserId) -> StoreResult<Vec<Referral>> {
        Ok(sqlx::query_as::<_, Referral>(
            r#"
            SELECT id, referrer_id, referred_id, created_at
            FROM referrals
            WHERE referrer_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(referrer)
        .fetch_all(self.pool)
        .await?)
    }

    #[instrument(skip(self, record), fields(user = %record.user_id, result = %record.result))]
    async fn insert_classification(&self, record: &ClassificationRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO classifications (id, user_id, item, result, weight, image_url, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&record.id)
        .bind(&record.user_id)
        .bind(&record.item)
        .bind(&record.result)
        .bind(record.weight)
        .bind(&record.image_url)
        .bind(record.created_at)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self), fields(user = %user))]
    async fn count_recyclable_classifications(&self, user: &UserId) -> StoreResult<i64> {
        Ok(sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM classifications
            WHERE user_id = $1
            AND result LIKE $2 || '%'
            "#,
        )
        .bind(user)
        .bind(RECYCLABLE_PREFIX)
        .fetch_one(self.pool)
        .await?)
    }

    #[instrument(skip(self, post), fields(user = %post.user_id, post = %post.id))]
    async fn insert_post(&self, post: &Post) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO posts (id, user_id, content, tags, likes, upvotes, comments, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&post.id)
        .bind(&post.user_id)
        .bind(&post.content)
        .bind(post.tags.iter().cloned().collect::<Vec<_>>())
        .bind(user_ids(&post.likes))
        .bind(user_ids(&post.upvotes))
        .bind(&post.comments)
        .bind(post.created_at)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self), fields(post = %id))]
    async fn get_post(&self, id: &PostId) -> StoreResult<Option<Post>> {
        let row = sqlx::query_as::<_, PostRow>(
            r#"
            SELECT id, user_id, content, tags, likes, upvotes, comments, created_at
            FROM posts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Post::from))
    }

    #[instrument(skip(self, post), fields(post = %post.id))]
    async fn update_post_reactions(&self, post: &Post) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE posts
            SET likes = $2,
                upvotes = $3,
                comments = $4
            WHERE id = $1
            "#,
        )
        .bind(&post.id)
        .bind(user_ids(&post.likes))
        .bind(user_ids(&post.upvotes))
        .bind(&post.comments)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self), fields(user = %user))]
    async fn count_posts_by_user(&self, user: &UserId) -> StoreResult<i64> {
        Ok(
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM posts WHERE user_id = $1")
                .bind(user)
                .fetch_one(self.pool)
                .await?,
        )
    }

    #[instrument(skip(self))]
    async fn list_recent_posts(&self, limit: i64) -> StoreResult<Vec<Post>> {
        let rows = sqlx::query_as::<_, PostRow>(
            r#"
            SELECT id, user_id, content, tags, likes, upvotes, comments, created_at
            FROM posts
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Post::from).collect())
    }

    fn subscribe(&self, table: Table) -> ChangeFeed {
        ChangeFeed::new(table, self.changes.subscribe())
    }
}

fn user_ids<'a>(set: impl IntoIterator<Item = &'a UserId>) -> Vec<String> {
    set.into_iter().map(|id| id.0.clone()).collect()
}
