use std::collections::BTreeMap;

use serde::Serialize;

use crate::constants::{ECO_INFLUENCER, ECO_WARRIOR, PLANET_PROTECTOR, PLANT_A_TREE_DAY};
use crate::constants::{MANUAL_STEP, WATER_SAVER, WATER_SAVER_STEP};
use crate::db::models::challenge::{Challenge, ChallengeId};
use crate::engine::level;
use crate::engine::{EngineError, EngineResult};

/// What feeds a challenge's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressSource {
    Manual,
    Classification,
    Referral,
}

/// Extra work after a challenge advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cascade {
    None,
    /// Sum every participant's progress and reward the contributor once the goal is met.
    CommunityAggregate,
    /// Completion only stands if every other challenge is already completed.
    MetaChallenge,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChallengeRule {
    pub challenge: Challenge,
    pub source: ProgressSource,
    pub cascade: Cascade,
    /// Level granted alongside the badge, if any.
    pub target_level: Option<i32>,
    /// Progress added by one "log progress" click.
    pub manual_step: f64,
}

impl ChallengeRule {
    pub fn from_challenge(challenge: Challenge) -> Self {
        let source = match challenge.name.as_str() {
            ECO_WARRIOR => ProgressSource::Classification,
            ECO_INFLUENCER => ProgressSource::Referral,
            _ => ProgressSource::Manual,
        };
        let cascade = match challenge.name.as_str() {
            PLANT_A_TREE_DAY => Cascade::CommunityAggregate,
            PLANET_PROTECTOR => Cascade::MetaChallenge,
            _ => Cascade::None,
        };

        let manual_step = match (source, challenge.name.as_str()) {
            (ProgressSource::Classification | ProgressSource::Referral, _) => 0.0,
            (ProgressSource::Manual, WATER_SAVER) => WATER_SAVER_STEP,
            (ProgressSource::Manual, _) => MANUAL_STEP,
        };

        Self {
            target_level: level::target_level(&challenge.name),
            manual_step,
            source,
            cascade,
            challenge,
        }
    }

    pub fn id(&self) -> ChallengeId {
        self.challenge.id
    }

    /// Completing a challenge awards a badge with the challenge's own name.
    pub fn badge(&self) -> &str {
        &self.challenge.name
    }

    pub fn goal(&self) -> f64 {
        self.challenge.goal
    }
}

/// Every known challenge with its progression rules, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct ChallengeCatalog {
    rules: BTreeMap<ChallengeId, ChallengeRule>,
}

impl ChallengeCatalog {
    pub fn from_challenges(challenges: Vec<Challenge>) -> Self {
        Self {
            rules: challenges
                .into_iter()
                .map(|c| (c.id, ChallengeRule::from_challenge(c)))
                .collect(),
        }
    }

    pub fn get(&self, id: ChallengeId) -> Option<&ChallengeRule> {
        self.rules.get(&id)
    }

    pub fn require(&self, id: ChallengeId) -> EngineResult<&ChallengeRule> {
        self.get(id)
            .ok_or_else(|| EngineError::NotFound(format!("challenge {id}")))
    }

    pub fn by_name(&self, name: &str) -> Option<&ChallengeRule> {
        self.rules.values().find(|r| r.challenge.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChallengeRule> {
        self.rules.values()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The amount one manual "log progress" click adds. Challenges driven by classifications
    /// or referrals ignore clicks.
    pub fn manual_increment(&self, id: ChallengeId) -> EngineResult<f64> {
        Ok(self.require(id)?.manual_step)
    }

    /// Challenges that must be completed before `id` may be.
    pub fn prerequisites(&self, id: ChallengeId) -> impl Iterator<Item = ChallengeId> + '_ {
        self.rules.keys().copied().filter(move |other| *other != id)
    }
}
