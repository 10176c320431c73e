use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::instrument;

use crate::constants::BADGE_TREE_PLANTER;
use crate::db::models::challenge::{
    Challenge, ChallengeId, ChallengeParticipation, ChallengeStanding,
};
use crate::db::models::normalize_quantity;
use crate::db::models::user::{Progression, UserId};
use crate::engine::awards::{self, Award};
use crate::engine::catalog::{Cascade, ChallengeRule, ProgressSource};
use crate::engine::ledger;
use crate::engine::{AdvanceOutcome, EngineError, EngineResult, ProgressionEngine};

/// A catalog challenge as seen by one user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChallengeProgress {
    pub challenge: Challenge,
    pub source: ProgressSource,
    pub joined: bool,
    pub progress: f64,
    pub completed: bool,
}

impl AdvanceOutcome {
    fn from_row(row: &ChallengeParticipation) -> Self {
        Self {
            challenge_id: row.challenge_id,
            progress: row.progress,
            completed: row.completed,
            points_awarded: 0,
            badges_granted: Vec::new(),
            level: None,
        }
    }

    fn absorb(&mut self, award: &Award) {
        self.points_awarded += award.points_awarded;
        self.badges_granted.extend(award.badges_granted.iter().cloned());
        self.level = Some(award.progression.level);
    }
}

impl ProgressionEngine {
    /// Seeds `(0, false)` for the pair unless a participation already exists.
    #[instrument(skip(self), fields(user = %user, challenge = %challenge))]
    pub async fn join_challenge(
        &self,
        user: &UserId,
        challenge: ChallengeId,
    ) -> EngineResult<ChallengeParticipation> {
        let rule = self.catalog.require(challenge)?;
        self.require_user(user).await?;

        let seed = ChallengeParticipation::seed(user.clone(), rule.id());
        self.store.seed_participation(&seed).await?;

        Ok(self
            .store
            .get_participation(user, rule.id())
            .await?
            .unwrap_or(seed))
    }

    /// One user-initiated progress click, worth the challenge's catalog step. Challenges fed
    /// by other events have a step of zero, so a click only joins them.
    #[instrument(skip(self), fields(user = %user, challenge = %challenge))]
    pub async fn record_manual_progress(
        &self,
        user: &UserId,
        challenge: ChallengeId,
    ) -> EngineResult<AdvanceOutcome> {
        let increment = self.catalog.manual_increment(challenge)?;
        self.advance_challenge(user, challenge, increment).await
    }

    /// Adds `increment` to the user's progress on `challenge`, clamped to the goal, and runs
    /// the completion cascade.
    ///
    /// # Errors
    ///
    /// * `InvalidEvent` for negative or non-finite increments, before any I/O.
    /// * `NotFound` for an unknown challenge or user.
    /// * `ValidationFailed` when the meta-challenge is completed ahead of its prerequisites; the
    ///   participation has been reset to `(0, false)` by then.
    /// * Store failures abort at the failing step. Re-running the same event converges.
    #[instrument(skip(self), fields(user = %user, challenge = %challenge))]
    pub async fn advance_challenge(
        &self,
        user: &UserId,
        challenge: ChallengeId,
        increment: f64,
    ) -> EngineResult<AdvanceOutcome> {
        ledger::validate_increment(increment)?;
        let rule = self.catalog.require(challenge)?;
        self.advance_rule(user, rule, increment).await
    }

    pub(super) async fn advance_rule(
        &self,
        user: &UserId,
        rule: &ChallengeRule,
        increment: f64,
    ) -> EngineResult<AdvanceOutcome> {
        let account = self.require_user(user).await?;
        let prior = self.store.get_participation(user, rule.id()).await?;

        if increment == 0.0 {
            let row = match prior {
                Some(row) => row,
                None => {
                    let seed = ChallengeParticipation::seed(user.clone(), rule.id());
                    self.store.seed_participation(&seed).await?;
                    seed
                }
            };
            return Ok(AdvanceOutcome::from_row(&row));
        }

        let step = ledger::advance(user, &rule.challenge, prior.as_ref(), increment);
        self.store.upsert_participation(&step.next).await?;
        tracing::debug!(
            progress = step.next.progress,
            completed = step.next.completed,
            "participation written"
        );

        if step.next.completed && rule.cascade == Cascade::MetaChallenge {
            self.enforce_prerequisites(user, rule).await?;
        }

        let mut outcome = AdvanceOutcome::from_row(&step.next);
        let mut progression = account.progression();

        // a completion whose reward never landed is rewarded again
        if step.newly_completed() || (step.next.completed && !progression.has_badge(rule.badge())) {
            let award = self.grant_completion(user, rule, &progression).await?;
            outcome.absorb(&award);
            progression = award.progression;
        }

        if rule.cascade == Cascade::CommunityAggregate {
            let award = self.community_check(user, rule, &progression).await?;
            if !award.is_noop() {
                outcome.absorb(&award);
            }
        }

        Ok(outcome)
    }

    /// Rewards a participation that is already completed but whose badge is missing, e.g.
    /// after the award write failed. `None` when there is nothing to settle.
    pub(super) async fn settle_completion(
        &self,
        user: &UserId,
        rule: &ChallengeRule,
    ) -> EngineResult<Option<AdvanceOutcome>> {
        let progression = self.require_user(user).await?.progression();
        let row = match self.store.get_participation(user, rule.id()).await? {
            Some(row) if row.completed && !progression.has_badge(rule.badge()) => row,
            _ => return Ok(None),
        };

        tracing::info!(badge = rule.badge(), "settling unrewarded completion");
        let award = self.grant_completion(user, rule, &progression).await?;

        let mut outcome = AdvanceOutcome::from_row(&row);
        outcome.absorb(&award);
        Ok(Some(outcome))
    }

    async fn grant_completion(
        &self,
        user: &UserId,
        rule: &ChallengeRule,
        progression: &Progression,
    ) -> EngineResult<Award> {
        let award = awards::completion(progression, rule);
        self.store.update_progression(user, &award.progression).await?;
        tracing::info!(
            badge = rule.badge(),
            level = award.progression.level,
            "challenge completed"
        );
        Ok(award)
    }

    /// Rewards `user` once everyone's summed progress on `rule` reaches its goal.
    async fn community_check(
        &self,
        user: &UserId,
        rule: &ChallengeRule,
        progression: &Progression,
    ) -> EngineResult<Award> {
        let rows = self.store.list_participations_for_challenge(rule.id()).await?;
        let total = normalize_quantity(rows.iter().map(|r| r.progress).sum());
        tracing::debug!(total, goal = rule.goal(), "community progress");

        let award = awards::milestone(progression, BADGE_TREE_PLANTER, total >= rule.goal());
        if !award.is_noop() {
            self.store.update_progression(user, &award.progression).await?;
        }
        Ok(award)
    }

    /// Resets the participation and fails unless every other challenge is completed.
    async fn enforce_prerequisites(&self, user: &UserId, rule: &ChallengeRule) -> EngineResult<()> {
        let completed: BTreeSet<ChallengeId> = self
            .store
            .list_participations_for_user(user)
            .await?
            .into_iter()
            .filter(|p| p.completed)
            .map(|p| p.challenge_id)
            .collect();

        let missing = self
            .catalog
            .prerequisites(rule.id())
            .filter(|id| !completed.contains(id))
            .count();

        if missing == 0 {
            return Ok(());
        }

        tracing::warn!(missing, "meta-challenge completed out of order, rolling back");
        self.store
            .upsert_participation(&ChallengeParticipation::seed(user.clone(), rule.id()))
            .await?;

        Err(EngineError::ValidationFailed(format!(
            "complete all previous challenges before completing {} ({missing} remaining)",
            rule.badge()
        )))
    }

    /// Every catalog challenge with the user's participation, if any.
    #[instrument(skip(self), fields(user = %user))]
    pub async fn challenges_for(&self, user: &UserId) -> EngineResult<Vec<ChallengeProgress>> {
        let joined: BTreeMap<ChallengeId, ChallengeParticipation> = self
            .store
            .list_participations_for_user(user)
            .await?
            .into_iter()
            .map(|p| (p.challenge_id, p))
            .collect();

        Ok(self
            .catalog
            .iter()
            .map(|rule| {
                let row = joined.get(&rule.id());
                ChallengeProgress {
                    challenge: rule.challenge.clone(),
                    source: rule.source,
                    joined: row.is_some(),
                    progress: row.map_or(0.0, |r| r.progress),
                    completed: row.is_some_and(|r| r.completed),
                }
            })
            .collect())
    }

    #[instrument(skip(self), fields(challenge = %challenge))]
    pub async fn standing(&self, challenge: ChallengeId) -> EngineResult<ChallengeStanding> {
        let rule = self.catalog.require(challenge)?;
        let rows = self.store.list_participations_for_challenge(rule.id()).await?;
        Ok(ChallengeStanding::from_rows(rule.challenge.clone(), &rows))
    }
}
