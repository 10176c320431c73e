use serde::Serialize;
use tracing::instrument;

use crate::constants::{BADGE_LIFESTYLE_CHANGER, LIFESTYLE_CHANGER_COMPLETED};
use crate::db::models::user::{Recommendations, UserId};
use crate::engine::awards;
use crate::engine::{EngineError, EngineResult, ProgressionEngine};
use crate::services::assistant::{Habits, suggestions_or_default};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendationOutcome {
    pub recommendations: Recommendations,
    pub completed_count: usize,
    pub badge_granted: bool,
}

impl ProgressionEngine {
    /// Replaces the user's suggestions with freshly generated ones and clears their progress.
    #[instrument(skip(self, habits), fields(user = %user))]
    pub async fn set_recommendations(
        &self,
        user: &UserId,
        habits: &Habits,
    ) -> EngineResult<Recommendations> {
        self.require_user(user).await?;

        let recommendations = Recommendations {
            suggestions: suggestions_or_default(self.assistant.as_ref(), habits).await,
            progress: Default::default(),
        };
        self.store
            .update_recommendations(user, &recommendations)
            .await?;

        Ok(recommendations)
    }

    /// Marks a suggestion done. Marking it twice changes nothing.
    #[instrument(skip(self), fields(user = %user))]
    pub async fn complete_recommendation(
        &self,
        user: &UserId,
        recommendation_id: &str,
    ) -> EngineResult<RecommendationOutcome> {
        let account = self.require_user(user).await?;

        let mut recommendations = account.recommendations.clone();
        if !recommendations.contains(recommendation_id) {
            return Err(EngineError::NotFound(format!(
                "recommendation {recommendation_id}"
            )));
        }

        recommendations
            .progress
            .insert(recommendation_id.to_string(), true);
        self.store
            .update_recommendations(user, &recommendations)
            .await?;

        let completed_count = recommendations.completed_count();
        let award = awards::milestone(
            &account.progression(),
            BADGE_LIFESTYLE_CHANGER,
            completed_count >= LIFESTYLE_CHANGER_COMPLETED,
        );
        if !award.is_noop() {
            self.store.update_progression(user, &award.progression).await?;
        }

        Ok(RecommendationOutcome {
            recommendations,
            completed_count,
            badge_granted: !award.is_noop(),
        })
    }
}
