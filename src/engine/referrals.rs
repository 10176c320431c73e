use std::collections::BTreeSet;

use serde::Serialize;
use tracing::instrument;

use crate::constants::{ECO_INFLUENCER, INFLUENCER_MIN_COMPLETED};
use crate::db::models::referral::Referral;
use crate::db::models::user::UserId;
use crate::engine::{AdvanceOutcome, EngineError, EngineResult, ProgressionEngine};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferralOutcome {
    pub referral: Referral,
    /// Referred users who have completed enough challenges to count.
    pub qualified_referrals: usize,
    pub eco_influencer: Option<AdvanceOutcome>,
}

impl ProgressionEngine {
    /// Appends a referral and recomputes the referrer's Eco-Influencer progress from scratch.
    #[instrument(skip(self), fields(referrer = %referrer))]
    pub async fn record_referral(
        &self,
        referrer: &UserId,
        referred_email: &str,
    ) -> EngineResult<ReferralOutcome> {
        let referred_email = referred_email.trim();
        if referred_email.is_empty() {
            return Err(EngineError::InvalidEvent("referred email is empty".into()));
        }

        self.require_user(referrer).await?;
        let referred = self
            .store
            .find_user_by_email(referred_email)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("user with email {referred_email}")))?;

        if &referred.id == referrer {
            return Err(EngineError::InvalidEvent("users cannot refer themselves".into()));
        }

        let referral = Referral::new(referrer.clone(), referred.id);
        self.store.insert_referral(&referral).await?;

        let qualified_referrals = self.qualified_referrals(referrer).await?;

        let Some(rule) = self.catalog.by_name(ECO_INFLUENCER) else {
            tracing::debug!("no referral-driven challenge in the catalog");
            return Ok(ReferralOutcome {
                referral,
                qualified_referrals,
                eco_influencer: None,
            });
        };

        let stored = self
            .store
            .get_participation(referrer, rule.id())
            .await?
            .map_or(0.0, |p| p.progress);
        let delta = qualified_referrals as f64 - stored;
        tracing::debug!(qualified_referrals, stored, delta, "eco-influencer progress");

        let eco_influencer = if delta > 0.0 {
            Some(self.advance_rule(referrer, rule, delta).await?)
        } else {
            self.settle_completion(referrer, rule).await?
        };

        Ok(ReferralOutcome {
            referral,
            qualified_referrals,
            eco_influencer,
        })
    }

    /// Distinct referred users with at least three completed challenges.
    async fn qualified_referrals(&self, referrer: &UserId) -> EngineResult<usize> {
        let referred: BTreeSet<UserId> = self
            .store
            .list_referrals_by_referrer(referrer)
            .await?
            .into_iter()
            .map(|r| r.referred_id)
            .collect();

        let mut qualified = 0;
        for user in &referred {
            let completed = self
                .store
                .list_participations_for_user(user)
                .await?
                .iter()
                .filter(|p| p.completed)
                .count();

            if completed >= INFLUENCER_MIN_COMPLETED {
                qualified += 1;
            }
        }
        Ok(qualified)
    }
}
