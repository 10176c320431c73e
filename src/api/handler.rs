use std::collections::BTreeSet;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use tracing::instrument;

use crate::api::server::{AppState, JsonResult};
use crate::constants::FEED_PAGE_SIZE;
use crate::db::prelude::{Challenge, ChallengeId, ChallengeParticipation, ChallengeStanding};
use crate::db::prelude::{Post, PostId, Reaction, Recommendations, User, UserId};
use crate::engine::{AdvanceOutcome, ChallengeProgress, ClassificationOutcome, EcoTipOutcome};
use crate::engine::{Leaderboard, LevelSummary, PostOutcome, ProfileStatus};
use crate::engine::{RecommendationOutcome, ReferralOutcome};
use crate::services::assistant::Habits;
use crate::services::labels::classify_labels;

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub user: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    #[serde(default = "default_feed_limit")]
    pub limit: i64,
    pub tag: Option<String>,
}

fn default_feed_limit() -> i64 {
    FEED_PAGE_SIZE
}

#[derive(Debug, Deserialize)]
pub struct OnboardingBody {
    pub full_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReferralBody {
    pub email: String,
}

/// Labels as returned by the image-labelling service, most confident first.
#[derive(Debug, Deserialize)]
pub struct ClassificationBody {
    pub labels: Vec<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PostBody {
    pub content: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReactionBody {
    pub user_id: String,
    pub reaction: Reaction,
}

#[derive(Debug, Deserialize)]
pub struct CommentBody {
    pub comment: String,
}

#[derive(Debug, Deserialize)]
pub struct EcoTipBody {
    pub message: String,
    /// Answered exchanges earlier in this chat session.
    #[serde(default)]
    pub exchanges: u32,
}

#[instrument(skip(state))]
pub async fn leaderboard(
    Query(param): Query<LeaderboardQuery>,
    State(state): State<Arc<AppState>>,
) -> JsonResult<Leaderboard> {
    let user = param.user.map(UserId::from);
    let board = state.call(state.engine.leaderboard(user.as_ref())).await?;

    Ok(Json(board))
}

pub async fn list_challenges(State(state): State<Arc<AppState>>) -> JsonResult<Vec<Challenge>> {
    Ok(Json(
        state
            .engine
            .catalog()
            .iter()
            .map(|rule| rule.challenge.clone())
            .collect(),
    ))
}

#[instrument(skip(state))]
pub async fn challenge_standing(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> JsonResult<ChallengeStanding> {
    let standing = state.call(state.engine.standing(ChallengeId(id))).await?;
    Ok(Json(standing))
}

#[instrument(skip(state))]
pub async fn user_profile(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
) -> JsonResult<User> {
    let user = UserId::from(user);
    Ok(Json(state.call(state.engine.profile(&user)).await?))
}

#[instrument(skip(state))]
pub async fn level_summary(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
) -> JsonResult<LevelSummary> {
    let user = UserId::from(user);
    Ok(Json(state.call(state.engine.level_summary(&user)).await?))
}

#[instrument(skip(state, body))]
pub async fn ensure_profile(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
    Json(body): Json<OnboardingBody>,
) -> JsonResult<ProfileStatus> {
    let user = UserId::from(user);
    let status = state
        .call(state.engine.ensure_profile(
            &user,
            body.full_name.as_deref(),
            body.email.as_deref(),
        ))
        .await?;

    Ok(Json(status))
}

#[instrument(skip(state))]
pub async fn user_challenges(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
) -> JsonResult<Vec<ChallengeProgress>> {
    let user = UserId::from(user);
    Ok(Json(state.call(state.engine.challenges_for(&user)).await?))
}

#[instrument(skip(state))]
pub async fn join_challenge(
    State(state): State<Arc<AppState>>,
    Path((user, id)): Path<(String, i64)>,
) -> JsonResult<ChallengeParticipation> {
    let user = UserId::from(user);
    let row = state
        .call(state.engine.join_challenge(&user, ChallengeId(id)))
        .await?;

    Ok(Json(row))
}

/// One click on a challenge's "log progress" button.
#[instrument(skip(state))]
pub async fn record_progress(
    State(state): State<Arc<AppState>>,
    Path((user, id)): Path<(String, i64)>,
) -> JsonResult<AdvanceOutcome> {
    let user = UserId::from(user);
    let outcome = state
        .call(state.engine.record_manual_progress(&user, ChallengeId(id)))
        .await?;

    Ok(Json(outcome))
}

#[instrument(skip(state, body))]
pub async fn record_referral(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
    Json(body): Json<ReferralBody>,
) -> JsonResult<ReferralOutcome> {
    let user = UserId::from(user);
    let outcome = state
        .call(state.engine.record_referral(&user, &body.email))
        .await?;

    Ok(Json(outcome))
}

#[instrument(skip(state, habits))]
pub async fn generate_recommendations(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
    Json(habits): Json<Habits>,
) -> JsonResult<Recommendations> {
    let user = UserId::from(user);
    let recs = state
        .call(state.engine.set_recommendations(&user, &habits))
        .await?;

    Ok(Json(recs))
}

#[instrument(skip(state))]
pub async fn complete_recommendation(
    State(state): State<Arc<AppState>>,
    Path((user, recommendation)): Path<(String, String)>,
) -> JsonResult<RecommendationOutcome> {
    let user = UserId::from(user);
    let outcome = state
        .call(state.engine.complete_recommendation(&user, &recommendation))
        .await?;

    Ok(Json(outcome))
}

#[instrument(skip(state, body))]
pub async fn record_classification(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
    Json(body): Json<ClassificationBody>,
) -> JsonResult<ClassificationOutcome> {
    let user = UserId::from(user);
    let item = classify_labels(&body.labels);
    tracing::debug!(labels = body.labels.len(), item = %item.item, "labels classified");

    let outcome = state
        .call(
            state
                .engine
                .record_classification(&user, &item, body.image_url),
        )
        .await?;

    Ok(Json(outcome))
}

#[instrument(skip(state, body))]
pub async fn ask_eco_tip(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
    Json(body): Json<EcoTipBody>,
) -> JsonResult<EcoTipOutcome> {
    let user = UserId::from(user);
    let outcome = state
        .call(
            state
                .engine
                .ask_eco_tip(&user, &body.message, body.exchanges),
        )
        .await?;

    Ok(Json(outcome))
}

#[instrument(skip(state, body))]
pub async fn create_post(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
    Json(body): Json<PostBody>,
) -> JsonResult<PostOutcome> {
    let user = UserId::from(user);
    let outcome = state
        .call(state.engine.create_post(&user, &body.content, body.tags))
        .await?;

    Ok(Json(outcome))
}

#[instrument(skip(state))]
pub async fn recent_posts(
    Query(param): Query<FeedQuery>,
    State(state): State<Arc<AppState>>,
) -> JsonResult<Vec<Post>> {
    let limit = param.limit.clamp(1, FEED_PAGE_SIZE * 5);
    let posts = state
        .call(state.engine.recent_posts(limit, param.tag.as_deref()))
        .await?;

    Ok(Json(posts))
}

#[instrument(skip(state))]
pub async fn toggle_reaction(
    State(state): State<Arc<AppState>>,
    Path(post): Path<String>,
    Json(body): Json<ReactionBody>,
) -> JsonResult<Post> {
    let (post, user) = (PostId(post), UserId::from(body.user_id));
    let updated = state
        .call(state.engine.toggle_reaction(&post, &user, body.reaction))
        .await?;

    Ok(Json(updated))
}

#[instrument(skip(state, body))]
pub async fn add_comment(
    State(state): State<Arc<AppState>>,
    Path(post): Path<String>,
    Json(body): Json<CommentBody>,
) -> JsonResult<Post> {
    let post = PostId(post);
    let updated = state
        .call(state.engine.add_comment(&post, &body.comment))
        .await?;

    Ok(Json(updated))
}
