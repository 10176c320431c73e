use core::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_CHALLENGES;
use crate::db::models::user::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct ChallengeId(pub i64);

/// Base challenges table model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Challenge {
    pub id: ChallengeId,
    pub name: String,
    pub goal: f64,
    pub unit: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// Base challenge_participants table model, unique on `(user_id, challenge_id)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChallengeParticipation {
    pub user_id: UserId,
    pub challenge_id: ChallengeId,
    pub progress: f64,
    pub completed: bool,
}

/// A challenge alongside the summed progress of everyone taking part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeStanding {
    pub challenge: Challenge,
    pub participants: usize,
    pub community_progress: f64,
    pub completed_by: usize,
}

impl Challenge {
    pub fn new(id: i64, name: &str, goal: f64, unit: &str) -> Self {
        Self {
            id: ChallengeId(id),
            name: name.to_string(),
            goal,
            unit: unit.to_string(),
            start_date: None,
            end_date: None,
        }
    }

    /// The twelve challenges every deployment starts with.
    pub fn defaults() -> Vec<Challenge> {
        DEFAULT_CHALLENGES
            .iter()
            .map(|(id, name, goal, unit)| Challenge::new(*id, name, *goal, unit))
            .collect()
    }
}

impl ChallengeParticipation {
    /// The row written when a user first joins a challenge.
    pub fn seed(user_id: UserId, challenge_id: ChallengeId) -> Self {
        Self {
            user_id,
            challenge_id,
            progress: 0.0,
            completed: false,
        }
    }
}

impl ChallengeStanding {
    pub fn from_rows(challenge: Challenge, rows: &[ChallengeParticipation]) -> Self {
        Self {
            participants: rows.len(),
            community_progress: super::normalize_quantity(rows.iter().map(|r| r.progress).sum()),
            completed_by: rows.iter().filter(|r| r.completed).count(),
            challenge,
        }
    }
}

impl From<i64> for ChallengeId {
    fn from(value: i64) -> Self {
        ChallengeId(value)
    }
}

impl fmt::Display for ChallengeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
