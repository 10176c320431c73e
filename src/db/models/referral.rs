use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::models::user::UserId;

/// Base referrals table model; rows are only ever appended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Referral {
    pub id: String,
    pub referrer_id: UserId,
    pub referred_id: UserId,
    pub created_at: NaiveDateTime,
}

impl Referral {
    pub fn new(referrer_id: UserId, referred_id: UserId) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            referrer_id,
            referred_id,
            created_at: Utc::now().naive_utc(),
        }
    }
}
