use std::collections::BTreeSet;

use serde::Serialize;
use tracing::instrument;

use crate::constants::{BADGE_COMMUNITY_STAR, COMMUNITY_STAR_POSTS};
use crate::db::models::post::{Post, PostId, Reaction};
use crate::db::models::user::UserId;
use crate::engine::awards;
use crate::engine::{EngineError, EngineResult, ProgressionEngine};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostOutcome {
    pub post: Post,
    pub post_count: i64,
    pub badge_granted: bool,
}

impl ProgressionEngine {
    #[instrument(skip(self, content, tags), fields(user = %user))]
    pub async fn create_post(
        &self,
        user: &UserId,
        content: &str,
        tags: BTreeSet<String>,
    ) -> EngineResult<PostOutcome> {
        let content = content.trim();
        if content.is_empty() {
            return Err(EngineError::InvalidEvent("post content is empty".into()));
        }

        let account = self.require_user(user).await?;
        let tags = tags
            .into_iter()
            .map(|t| t.trim().trim_start_matches('#').to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();

        let post = Post::new(user.clone(), content, tags);
        self.store.insert_post(&post).await?;

        let post_count = self.store.count_posts_by_user(user).await?;
        let award = awards::milestone(
            &account.progression(),
            BADGE_COMMUNITY_STAR,
            post_count >= COMMUNITY_STAR_POSTS,
        );
        if !award.is_noop() {
            self.store.update_progression(user, &award.progression).await?;
        }

        Ok(PostOutcome {
            post,
            post_count,
            badge_granted: !award.is_noop(),
        })
    }

    /// Flips `user`'s like or upvote on a post.
    #[instrument(skip(self), fields(post = %post, user = %user))]
    pub async fn toggle_reaction(
        &self,
        post: &PostId,
        user: &UserId,
        reaction: Reaction,
    ) -> EngineResult<Post> {
        let mut stored = self.require_post(post).await?;
        let present = stored.toggle(reaction, user);
        self.store.update_post_reactions(&stored).await?;

        tracing::debug!(?reaction, present, "reaction toggled");
        Ok(stored)
    }

    #[instrument(skip(self, comment), fields(post = %post))]
    pub async fn add_comment(&self, post: &PostId, comment: &str) -> EngineResult<Post> {
        let comment = comment.trim();
        if comment.is_empty() {
            return Err(EngineError::InvalidEvent("comment is empty".into()));
        }

        let mut stored = self.require_post(post).await?;
        stored.comments.push(comment.to_string());
        self.store.update_post_reactions(&stored).await?;

        Ok(stored)
    }

    /// Most recent posts first, optionally only those carrying `tag`.
    #[instrument(skip(self))]
    pub async fn recent_posts(&self, limit: i64, tag: Option<&str>) -> EngineResult<Vec<Post>> {
        let posts = self.store.list_recent_posts(limit).await?;
        Ok(match tag.map(|t| t.trim().trim_start_matches('#').to_lowercase()) {
            Some(tag) => posts.into_iter().filter(|p| p.tags.contains(&tag)).collect(),
            None => posts,
        })
    }

    async fn require_post(&self, id: &PostId) -> EngineResult<Post> {
        self.store
            .get_post(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("post {id}")))
    }
}
