use serde::Serialize;
use tracing::instrument;

use crate::constants::{ECO_WARRIOR, RECYCLABLE_WEIGHT};
use crate::db::models::classification::ClassificationRecord;
use crate::db::models::user::UserId;
use crate::engine::awards;
use crate::engine::{AdvanceOutcome, EngineResult, ProgressionEngine};
use crate::services::labels::WasteItem;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationOutcome {
    pub item: WasteItem,
    pub result: String,
    pub points_awarded: i64,
    pub recyclable_count: i64,
    pub co2_saved_kg: f64,
    pub badges_granted: Vec<String>,
    pub eco_warrior: Option<AdvanceOutcome>,
}

impl ProgressionEngine {
    /// Records one classified item and applies its points, recycling milestones and
    /// Eco-Warrior progress.
    ///
    /// Not idempotent: a repeated call appends another record and awards points again.
    #[instrument(skip(self, item, image_url), fields(user = %user, item = %item.item, recyclable = item.recyclable))]
    pub async fn record_classification(
        &self,
        user: &UserId,
        item: &WasteItem,
        image_url: Option<String>,
    ) -> EngineResult<ClassificationOutcome> {
        self.require_user(user).await?;

        let weight = if item.recyclable { RECYCLABLE_WEIGHT } else { 0.0 };
        let mut record = ClassificationRecord::new(user.clone(), &item.item, item.result(), weight);
        record.image_url = image_url;
        self.store.insert_classification(&record).await?;

        let recyclable_count = self.store.count_recyclable_classifications(user).await?;

        let eco_warrior = match self.catalog.by_name(ECO_WARRIOR) {
            Some(rule) if item.recyclable => {
                Some(self.advance_rule(user, rule, RECYCLABLE_WEIGHT).await?)
            }
            _ => None,
        };

        // re-read so a completion award written by the advance above is not overwritten
        let account = self.require_user(user).await?;
        let award = awards::classification(&account.progression(), item.recyclable, recyclable_count);
        self.store.update_progression(user, &award.progression).await?;

        tracing::debug!(
            recyclable_count,
            points = award.progression.points,
            "classification applied"
        );

        Ok(ClassificationOutcome {
            result: record.result,
            item: item.clone(),
            points_awarded: award.points_awarded,
            recyclable_count,
            co2_saved_kg: awards::co2_saved(recyclable_count),
            badges_granted: award.badges_granted,
            eco_warrior,
        })
    }
}
