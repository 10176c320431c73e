use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::models::user::UserId;

pub const RECYCLABLE_PREFIX: &str = "Recyclable";
pub const NON_RECYCLABLE_PREFIX: &str = "Non-Recyclable";

/// Base classifications table model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ClassificationRecord {
    pub id: String,
    pub user_id: UserId,
    pub item: String,
    /// `"Recyclable - <material>"` or `"Non-Recyclable - <material>"`
    pub result: String,
    pub weight: f64,
    pub image_url: Option<String>,
    pub created_at: NaiveDateTime,
}

impl ClassificationRecord {
    pub fn new(user_id: UserId, item: &str, result: String, weight: f64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            item: item.to_string(),
            result,
            weight,
            image_url: None,
            created_at: Utc::now().naive_utc(),
        }
    }

    pub fn is_recyclable(&self) -> bool {
        self.result.starts_with(RECYCLABLE_PREFIX)
    }
}
