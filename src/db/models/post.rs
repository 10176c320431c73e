use core::fmt;
use std::collections::BTreeSet;

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::models::user::UserId;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct PostId(pub String);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub user_id: UserId,
    pub content: String,
    pub tags: BTreeSet<String>,
    pub likes: BTreeSet<UserId>,
    pub upvotes: BTreeSet<UserId>,
    pub comments: Vec<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PostRow {
    pub id: PostId,
    pub user_id: UserId,
    pub content: String,
    pub tags: Option<Vec<String>>,
    pub likes: Option<Vec<String>>,
    pub upvotes: Option<Vec<String>>,
    pub comments: Option<Vec<String>>,
    pub created_at: NaiveDateTime,
}

/// Which reaction set a toggle addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reaction {
    Like,
    Upvote,
}

impl Post {
    pub fn new(user_id: UserId, content: &str, tags: BTreeSet<String>) -> Self {
        Self {
            id: PostId(uuid::Uuid::new_v4().to_string()),
            user_id,
            content: content.to_string(),
            tags,
            likes: BTreeSet::new(),
            upvotes: BTreeSet::new(),
            comments: Vec::new(),
            created_at: Utc::now().naive_utc(),
        }
    }

    /// Flips `user`'s membership in the reaction set, returning whether it is now present.
    pub fn toggle(&mut self, reaction: Reaction, user: &UserId) -> bool {
        let set = match reaction {
            Reaction::Like => &mut self.likes,
            Reaction::Upvote => &mut self.upvotes,
        };

        if set.remove(user) {
            false
        } else {
            set.insert(user.clone());
            true
        }
    }
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            content: row.content,
            tags: row.tags.unwrap_or_default().into_iter().collect(),
            likes: row.likes.unwrap_or_default().into_iter().map(UserId).collect(),
            upvotes: row.upvotes.unwrap_or_default().into_iter().map(UserId).collect(),
            comments: row.comments.unwrap_or_default(),
            created_at: row.created_at,
        }
    }
}

impl From<&str> for PostId {
    fn from(value: &str) -> Self {
        PostId(value.to_string())
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_toggle_membership() {
        let mut post = Post::new("author".into(), "composted today", BTreeSet::new());
        let fan = UserId::from("fan");

        assert!(post.toggle(Reaction::Like, &fan));
        assert!(post.likes.contains(&fan));
        assert!(post.upvotes.is_empty());

        assert!(!post.toggle(Reaction::Like, &fan));
        assert!(post.likes.is_empty());
    }
}
