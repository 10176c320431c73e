use core::fmt;
use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::types::Json;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct UserId(pub String);

/// Base users table model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub city: Option<String>,
    pub points: i64,
    pub level: i32,
    pub badges: BTreeSet<String>,
    pub recommendations: Recommendations,
    pub onboarding_completed: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// The three user fields the progression rules write together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progression {
    pub points: i64,
    pub level: i32,
    pub badges: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recommendations {
    #[serde(default)]
    pub suggestions: Vec<Suggestion>,
    #[serde(default)]
    pub progress: BTreeMap<String, bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub id: String,
    pub action: String,
    pub category: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: UserId,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub city: Option<String>,
    pub points: i64,
    pub level: i32,
    pub badges: Option<Vec<String>>,
    pub recommendations: Option<Json<Recommendations>>,
    pub onboarding_completed: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LeaderboardEntry {
    pub id: UserId,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub points: i64,
    pub level: i32,
}

impl User {
    /// A freshly signed-up user: level 1, no points, no badges.
    pub fn new(id: UserId) -> Self {
        let now = Utc::now().naive_utc();
        Self {
            id,
            full_name: None,
            email: None,
            city: None,
            points: 0,
            level: 1,
            badges: BTreeSet::new(),
            recommendations: Recommendations::default(),
            onboarding_completed: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_identity(mut self, full_name: Option<&str>, email: Option<&str>) -> Self {
        self.full_name = full_name.map(str::to_string);
        self.email = email.map(|e| e.trim().to_string());
        self
    }

    pub fn progression(&self) -> Progression {
        Progression {
            points: self.points,
            level: self.level,
            badges: self.badges.clone(),
        }
    }

    pub fn apply(&mut self, progression: Progression) {
        self.points = progression.points;
        self.level = progression.level;
        self.badges = progression.badges;
        self.updated_at = Utc::now().naive_utc();
    }
}

impl Progression {
    pub fn has_badge(&self, badge: &str) -> bool {
        self.badges.contains(badge)
    }
}

impl Recommendations {
    pub fn completed_count(&self) -> usize {
        self.progress.values().filter(|done| **done).count()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.suggestions.iter().any(|s| s.id == id)
    }
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            full_name: row.full_name,
            email: row.email,
            city: row.city,
            points: row.points,
            level: row.level,
            badges: row.badges.unwrap_or_default().into_iter().collect(),
            recommendations: row.recommendations.map(|j| j.0).unwrap_or_default(),
            onboarding_completed: row.onboarding_completed,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        UserId(value)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        UserId(value.to_string())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generated suggestions carry numeric ids, stored ones may carry strings.
fn id_from_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Int(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Int(n) => n.to_string(),
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_recommendations_numeric_ids() {
        let raw = r#"{
            "suggestions": [
                {"id": 1, "action": "Switch to public transport 3 days a week", "category": "transport"},
                {"id": "2", "action": "Use reusable bags instead of plastic", "category": "waste"}
            ],
            "progress": {"1": true, "2": false}
        }"#;

        let recs: Recommendations = serde_json::from_str(raw).unwrap();
        assert_eq!(recs.suggestions[0].id, "1");
        assert_eq!(recs.suggestions[1].id, "2");
        assert_eq!(recs.completed_count(), 1);
        assert!(recs.contains("2"));
        assert!(!recs.contains("3"));
    }

    #[test]
    fn test_row_conversion_defaults() {
        let now = Utc::now().naive_utc();
        let row = UserRow {
            id: "u1".into(),
            full_name: None,
            email: None,
            city: None,
            points: 0,
            level: 1,
            badges: None,
            recommendations: None,
            onboarding_completed: false,
            created_at: now,
            updated_at: now,
        };

        let user = User::from(row);
        assert!(user.badges.is_empty());
        assert!(user.recommendations.suggestions.is_empty());
    }
}
