//! Pure progress arithmetic for a single `(user, challenge)` participation.

use crate::db::models::challenge::{Challenge, ChallengeParticipation};
use crate::db::models::normalize_quantity;
use crate::db::models::user::UserId;
use crate::engine::{EngineError, EngineResult};

/// Result of applying one increment to a participation.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerStep {
    pub prior_completed: bool,
    pub next: ChallengeParticipation,
}

impl LedgerStep {
    /// Crossed the goal with this step.
    pub fn newly_completed(&self) -> bool {
        self.next.completed && !self.prior_completed
    }
}

pub fn validate_increment(increment: f64) -> EngineResult<()> {
    if !increment.is_finite() {
        return Err(EngineError::InvalidEvent(format!(
            "increment must be a finite number, got {increment}"
        )));
    }
    if increment < 0.0 {
        return Err(EngineError::InvalidEvent(format!(
            "increment must not be negative, got {increment}"
        )));
    }
    Ok(())
}

/// `min(current + increment, goal)`; an absent participation counts as zero progress.
pub fn advance(
    user: &UserId,
    challenge: &Challenge,
    prior: Option<&ChallengeParticipation>,
    increment: f64,
) -> LedgerStep {
    let current = prior.map_or(0.0, |p| p.progress);
    let progress = normalize_quantity(current + increment).min(challenge.goal);

    LedgerStep {
        prior_completed: prior.is_some_and(|p| p.completed),
        next: ChallengeParticipation {
            user_id: user.clone(),
            challenge_id: challenge.id,
            progress,
            completed: progress >= challenge.goal,
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn challenge(goal: f64) -> Challenge {
        Challenge::new(1, "Green Thumb", goal, "plants")
    }

    #[test]
    fn test_clamps_to_goal() {
        let user = UserId::from("u1");
        let ch = challenge(5.0);

        let first = advance(&user, &ch, None, 3.0);
        assert_eq!(first.next.progress, 3.0);
        assert!(!first.next.completed);

        let second = advance(&user, &ch, Some(&first.next), 3.0);
        assert_eq!(second.next.progress, 5.0);
        assert!(second.next.completed);
        assert!(second.newly_completed());

        let third = advance(&user, &ch, Some(&second.next), 3.0);
        assert_eq!(third.next, second.next);
        assert!(!third.newly_completed());
    }

    #[test]
    fn test_fractional_weights_reach_goal() {
        let user = UserId::from("u1");
        let ch = challenge(1.0);

        let mut row = None;
        for _ in 0..10 {
            row = Some(advance(&user, &ch, row.as_ref(), 0.1).next);
        }
        assert!(row.unwrap().completed);
    }

    #[test]
    fn test_stored_overshoot_is_clamped() {
        let user = UserId::from("u1");
        let ch = challenge(5.0);
        let drifted = ChallengeParticipation {
            user_id: user.clone(),
            challenge_id: ch.id,
            progress: 9.0,
            completed: true,
        };

        let step = advance(&user, &ch, Some(&drifted), 0.0);
        assert_eq!(step.next.progress, 5.0);
    }

    #[test]
    fn test_rejects_bad_increments() {
        assert!(validate_increment(0.0).is_ok());
        assert!(validate_increment(2.5).is_ok());
        assert!(matches!(validate_increment(-1.0), Err(EngineError::InvalidEvent(_))));
        assert!(validate_increment(f64::NAN).is_err());
        assert!(validate_increment(f64::INFINITY).is_err());
    }
}
