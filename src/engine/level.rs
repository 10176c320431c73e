use serde::Serialize;

use crate::constants::*;

/// Level a user moves to when the named challenge's badge is granted.
pub fn target_level(challenge_name: &str) -> Option<i32> {
    Some(match challenge_name {
        ECO_WARRIOR => 1,
        GREEN_THUMB => 2,
        CARBON_CUTTER => 3,
        WATER_SAVER => 4,
        PLASTIC_BUSTER => 5,
        ENERGY_GUARDIAN => 6,
        SUSTAINABLE_CHEF => 7,
        ECO_INFLUENCER => 8,
        ETHICAL_SHOPPER => 9,
        PLANET_PROTECTOR => 10,
        ZERO_WASTE_WEEK => 3,
        PLANT_A_TREE_DAY => 5,
        _ => return None,
    })
}

/// Levels only move up.
pub fn raise(current: i32, target: Option<i32>) -> i32 {
    target.map_or(current, |t| current.max(t))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeatureGates {
    pub community_challenges: bool,
    pub lifestyle_questionnaire: bool,
    pub analytics: bool,
}

impl FeatureGates {
    pub fn for_level(level: i32) -> Self {
        Self {
            community_challenges: level >= COMMUNITY_CHALLENGES_LEVEL,
            lifestyle_questionnaire: level >= LIFESTYLE_QUESTIONNAIRE_LEVEL,
            analytics: level >= ANALYTICS_LEVEL,
        }
    }
}

/// Display values derived from a user's points and level.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelSummary {
    pub level: i32,
    pub points: i64,
    /// `level * 100`
    pub next_level_points: i64,
    /// Never negative; points already past the threshold read as zero.
    pub points_to_next_level: i64,
    /// Share of `next_level_points` reached, 0 to 100.
    pub progress_percent: f64,
    /// Share of 1000 points reached, 0 to 100.
    pub tree_growth_percent: f64,
    pub features: FeatureGates,
}

impl LevelSummary {
    pub fn new(level: i32, points: i64) -> Self {
        let next_level_points = i64::from(level.max(1)) * POINTS_PER_LEVEL;
        let progress_percent = (points as f64 / next_level_points as f64 * 100.0).clamp(0.0, 100.0);
        let tree_growth_percent = (points as f64 / 1000.0).clamp(0.0, 1.0) * 100.0;

        Self {
            level,
            points,
            next_level_points,
            points_to_next_level: (next_level_points - points).max(0),
            progress_percent,
            tree_growth_percent,
            features: FeatureGates::for_level(level),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_level_table() {
        assert_eq!(target_level(PLANET_PROTECTOR), Some(10));
        assert_eq!(target_level(ZERO_WASTE_WEEK), Some(3));
        assert_eq!(target_level("Tree Planter"), None);
    }

    #[test]
    fn test_raise_never_lowers() {
        assert_eq!(raise(6, Some(3)), 6);
        assert_eq!(raise(2, Some(5)), 5);
        assert_eq!(raise(4, None), 4);
    }

    #[test]
    fn test_summary() {
        let summary = LevelSummary::new(3, 240);
        assert_eq!(summary.next_level_points, 300);
        assert_eq!(summary.points_to_next_level, 60);
        assert_eq!(summary.progress_percent, 80.0);
        assert_eq!(summary.tree_growth_percent, 24.0);
        assert!(summary.features.community_challenges);
        assert!(!summary.features.lifestyle_questionnaire);

        let past = LevelSummary::new(1, 180);
        assert_eq!(past.points_to_next_level, 0);
        assert_eq!(past.progress_percent, 100.0);
    }
}
