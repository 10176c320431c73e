//! Badge, point and level rules as pure functions over [`Progression`].
//!
//! Every grant is guarded by "already held", so re-evaluating the same event is harmless.

use serde::Serialize;

use crate::constants::*;
use crate::db::models::user::Progression;
use crate::engine::catalog::ChallengeRule;
use crate::engine::level;

/// A progression after some rule has been applied, and what changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Award {
    pub progression: Progression,
    pub points_awarded: i64,
    pub badges_granted: Vec<String>,
    pub level_changed: bool,
}

impl Award {
    pub fn unchanged(progression: &Progression) -> Self {
        Self {
            progression: progression.clone(),
            points_awarded: 0,
            badges_granted: Vec::new(),
            level_changed: false,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.points_awarded == 0 && self.badges_granted.is_empty() && !self.level_changed
    }

    fn add_points(&mut self, points: i64) {
        self.progression.points += points;
        self.points_awarded += points;
    }

    /// Adds `badge` unless already held; returns whether it was added.
    fn grant(&mut self, badge: &str) -> bool {
        if self.progression.badges.insert(badge.to_string()) {
            tracing::info!(badge, "badge granted");
            self.badges_granted.push(badge.to_string());
            true
        } else {
            false
        }
    }

    fn raise_level(&mut self, target: Option<i32>) {
        let next = level::raise(self.progression.level, target);
        if next != self.progression.level {
            self.progression.level = next;
            self.level_changed = true;
        }
    }
}

/// Completion reward: points, the challenge badge if not held, and the badge's level when
/// it is higher than the current one.
pub fn completion(progression: &Progression, rule: &ChallengeRule) -> Award {
    let mut award = Award::unchanged(progression);
    award.add_points(COMPLETION_POINTS);
    if award.grant(rule.badge()) {
        award.raise_level(rule.target_level);
    }
    award
}

/// Grants `badge` when `reached`; otherwise leaves the progression alone.
pub fn milestone(progression: &Progression, badge: &str, reached: bool) -> Award {
    let mut award = Award::unchanged(progression);
    if reached {
        award.grant(badge);
    }
    award
}

/// Points for one classified item plus the recycling milestones. `recyclable_count` is the
/// all-time count including this item.
pub fn classification(progression: &Progression, recyclable: bool, recyclable_count: i64) -> Award {
    let mut award = Award::unchanged(progression);
    award.add_points(if recyclable {
        RECYCLABLE_POINTS
    } else {
        NON_RECYCLABLE_POINTS
    });

    if recyclable_count >= RECYCLER_PRO_ITEMS {
        award.grant(BADGE_RECYCLER_PRO);
    }
    if co2_saved(recyclable_count) >= CLIMATE_CHAMPION_CO2 {
        award.grant(BADGE_CLIMATE_CHAMPION);
    }
    award
}

/// kg of CO2 saved by `recyclable_count` recycled items.
pub fn co2_saved(recyclable_count: i64) -> f64 {
    crate::db::models::normalize_quantity(recyclable_count as f64 * CO2_PER_ITEM)
}

#[cfg(test)]
mod test {
    use std::collections::BTreeSet;

    use super::*;
    use crate::db::models::challenge::Challenge;

    fn fresh() -> Progression {
        Progression {
            points: 0,
            level: 1,
            badges: BTreeSet::new(),
        }
    }

    #[test]
    fn test_completion_grants_once() {
        let rule = ChallengeRule::from_challenge(Challenge::new(4, WATER_SAVER, 30.0, "showers"));

        let first = completion(&fresh(), &rule);
        assert_eq!(first.points_awarded, 10);
        assert_eq!(first.badges_granted, vec![WATER_SAVER.to_string()]);
        assert_eq!(first.progression.level, 4);

        let again = completion(&first.progression, &rule);
        assert!(again.badges_granted.is_empty());
        assert_eq!(again.progression.badges.len(), 1);
        assert_eq!(again.progression.level, 4);
    }

    #[test]
    fn test_completion_keeps_higher_level() {
        let rule = ChallengeRule::from_challenge(Challenge::new(2, GREEN_THUMB, 10.0, "plants"));
        let mut start = fresh();
        start.level = 6;

        let award = completion(&start, &rule);
        assert_eq!(award.progression.level, 6);
        assert!(!award.level_changed);
    }

    #[test]
    fn test_classification_thresholds() {
        let nine = classification(&fresh(), true, 9);
        assert_eq!(nine.points_awarded, 20);
        assert!(nine.badges_granted.is_empty());

        let ten = classification(&fresh(), true, 10);
        assert_eq!(ten.badges_granted, vec![BADGE_RECYCLER_PRO.to_string()]);

        let other = classification(&ten.progression, false, 24);
        assert_eq!(other.points_awarded, 5);
        assert!(other.badges_granted.is_empty());

        let champion = classification(&ten.progression, true, 25);
        assert_eq!(champion.badges_granted, vec![BADGE_CLIMATE_CHAMPION.to_string()]);
    }

    #[test]
    fn test_milestone() {
        assert!(milestone(&fresh(), BADGE_ECO_LEARNER, false).is_noop());

        let granted = milestone(&fresh(), BADGE_ECO_LEARNER, true);
        assert!(granted.progression.has_badge(BADGE_ECO_LEARNER));
        assert!(milestone(&granted.progression, BADGE_ECO_LEARNER, true).is_noop());
    }
}
