use serde::Serialize;
use tracing::instrument;

use crate::constants::{BADGE_ECO_LEARNER, ECO_LEARNER_EXCHANGES, LEADERBOARD_SIZE};
use crate::db::models::user::{LeaderboardEntry, User, UserId};
use crate::db::store::StoreError;
use crate::engine::awards;
use crate::engine::level::LevelSummary;
use crate::engine::{EngineError, EngineResult, ProgressionEngine};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProfileStatus {
    pub onboarding_completed: bool,
    /// A default row was written by this call.
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEntry {
    pub rank: usize,
    #[serde(flatten)]
    pub entry: LeaderboardEntry,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Leaderboard {
    pub top: Vec<RankedEntry>,
    /// 1-based position of the requesting user, when they have a row.
    pub rank: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EcoTipOutcome {
    pub reply: String,
    pub exchanges: u32,
    pub badge_granted: bool,
}

impl ProgressionEngine {
    /// Reads the onboarding flag, seeding a default user row when none exists.
    ///
    /// A store without the onboarding column reads as "not onboarded".
    #[instrument(skip(self, full_name, email), fields(user = %user))]
    pub async fn ensure_profile(
        &self,
        user: &UserId,
        full_name: Option<&str>,
        email: Option<&str>,
    ) -> EngineResult<ProfileStatus> {
        match self.store.get_onboarding_completed(user).await {
            Ok(Some(onboarding_completed)) => Ok(ProfileStatus {
                onboarding_completed,
                created: false,
            }),
            Ok(None) => {
                let row = User::new(user.clone()).with_identity(full_name, email);
                self.store.insert_user(&row).await?;
                tracing::info!("seeded default profile");

                Ok(ProfileStatus {
                    onboarding_completed: false,
                    created: true,
                })
            }
            Err(StoreError::SchemaMismatch(reason)) => {
                tracing::warn!(%reason, "onboarding flag unavailable, assuming not onboarded");
                Ok(ProfileStatus {
                    onboarding_completed: false,
                    created: false,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self), fields(user = %user))]
    pub async fn profile(&self, user: &UserId) -> EngineResult<User> {
        self.require_user(user).await
    }

    #[instrument(skip(self), fields(user = %user))]
    pub async fn level_summary(&self, user: &UserId) -> EngineResult<LevelSummary> {
        let account = self.require_user(user).await?;
        Ok(LevelSummary::new(account.level, account.points))
    }

    /// Top five by points, plus `user`'s own rank.
    #[instrument(skip(self))]
    pub async fn leaderboard(&self, user: Option<&UserId>) -> EngineResult<Leaderboard> {
        let everyone = self.store.list_users_by_points(None).await?;

        let rank = user.and_then(|id| everyone.iter().position(|e| &e.id == id).map(|i| i + 1));
        let top = everyone
            .into_iter()
            .take(LEADERBOARD_SIZE)
            .enumerate()
            .map(|(i, entry)| RankedEntry { rank: i + 1, entry })
            .collect();

        Ok(Leaderboard { top, rank })
    }

    /// Counts a chat exchange toward the Eco Learner badge. `exchanges` is the number of
    /// answered messages in the session, including this one.
    #[instrument(skip(self), fields(user = %user))]
    pub async fn record_eco_tip(&self, user: &UserId, exchanges: u32) -> EngineResult<bool> {
        let account = self.require_user(user).await?;
        let award = awards::milestone(
            &account.progression(),
            BADGE_ECO_LEARNER,
            exchanges >= ECO_LEARNER_EXCHANGES,
        );

        if award.is_noop() {
            return Ok(false);
        }
        self.store.update_progression(user, &award.progression).await?;
        Ok(true)
    }

    /// Asks the assistant for an eco-tip, then counts the exchange.
    #[instrument(skip(self, message), fields(user = %user))]
    pub async fn ask_eco_tip(
        &self,
        user: &UserId,
        message: &str,
        prior_exchanges: u32,
    ) -> EngineResult<EcoTipOutcome> {
        if message.trim().is_empty() {
            return Err(EngineError::InvalidEvent("message is empty".into()));
        }

        let reply = self.assistant.eco_tip(message).await?;
        let exchanges = prior_exchanges.saturating_add(1);
        let badge_granted = self.record_eco_tip(user, exchanges).await?;

        Ok(EcoTipOutcome {
            reply,
            exchanges,
            badge_granted,
        })
    }
}
