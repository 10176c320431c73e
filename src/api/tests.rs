use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;
use tower_http::cors::CorsLayer;

use crate::api::server::{AppState, router};
use crate::db::memory::{Fault, MemoryStore};
use crate::db::models::user::{Suggestion, User};
use crate::db::store::ProfileStore;
use crate::engine::ProgressionEngine;
use crate::services::assistant::{Assistant, AssistantResult, Habits, OfflineAssistant};

const TIMEOUT: Duration = Duration::from_secs(5);

/// Never answers within any sensible request timeout.
#[derive(Debug)]
struct StalledAssistant;

#[async_trait]
impl Assistant for StalledAssistant {
    async fn suggest(&self, _: &Habits) -> AssistantResult<Vec<Suggestion>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Vec::new())
    }

    async fn eco_tip(&self, _: &str) -> AssistantResult<String> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(String::new())
    }
}

async fn app_with(assistant: Arc<dyn Assistant>, timeout: Duration) -> (Arc<MemoryStore>, Router) {
    let store = Arc::new(MemoryStore::seeded());
    let engine = ProgressionEngine::load(store.clone(), assistant).await.unwrap();
    let state = Arc::new(AppState::new(Arc::new(engine), timeout));

    (store, router(state, CorsLayer::new()))
}

async fn app() -> (Arc<MemoryStore>, Router) {
    app_with(Arc::new(OfflineAssistant), TIMEOUT).await
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let req = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(body) => req
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };

    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };

    (status, json)
}

async fn add_user(store: &MemoryStore, id: &str) {
    let user = User::new(id.into()).with_identity(Some(id), Some(&format!("{id}@environ.test")));
    store.insert_user(&user).await.unwrap();
}

#[tokio::test]
async fn test_list_challenges() {
    let (_, app) = app().await;
    let (status, body) = send(&app, "GET", "/challenges", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 12);
    assert_eq!(body[0]["name"], "Eco-Warrior");
}

#[tokio::test]
async fn test_onboarding_then_progress() {
    let (_, app) = app().await;

    let (status, body) = send(
        &app,
        "POST",
        "/users/ada/onboarding",
        Some(json!({"full_name": "Ada", "email": "ada@environ.test"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"onboarding_completed": false, "created": true}));

    // Water Saver: goal 30, 10 per click
    for clicks in 1..=3 {
        let (status, body) =
            send(&app, "POST", "/users/ada/challenges/4/progress", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["progress"], 10.0 * clicks as f64);
        assert_eq!(body["completed"], clicks == 3);
    }

    let (_, profile) = send(&app, "GET", "/users/ada", None).await;
    assert_eq!(profile["points"], 10);
    assert_eq!(profile["badges"], json!(["Water Saver"]));

    let (_, level) = send(&app, "GET", "/users/ada/level", None).await;
    assert_eq!(level["level"], 4);
    assert_eq!(level["points_to_next_level"], 390);
}

#[tokio::test]
async fn test_error_statuses() {
    let (store, app) = app().await;
    add_user(&store, "ada").await;

    let (status, body) = send(&app, "POST", "/users/ghost/challenges/2/progress", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "user ghost not found");

    let (status, _) = send(&app, "POST", "/users/ada/challenges/404/progress", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Planet Protector before everything else
    let (status, _) = send(&app, "POST", "/users/ada/challenges/10/progress", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    store.fail_next(Fault::Read, 1);
    let (status, body) = send(&app, "GET", "/users/ada", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["message"].as_str().unwrap().starts_with("store unavailable"));
}

#[tokio::test]
async fn test_classification_from_labels() {
    let (store, app) = app().await;
    add_user(&store, "ada").await;

    let (status, body) = send(
        &app,
        "POST",
        "/users/ada/classifications",
        Some(json!({"labels": ["Bottle", "Plastic bottle"]})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["item"]["recyclable"], true);
    assert_eq!(body["points_awarded"], 20);
    assert_eq!(body["recyclable_count"], 1);
    assert_eq!(body["eco_warrior"]["progress"], 0.1);
}

#[tokio::test]
async fn test_feed_routes() {
    let (store, app) = app().await;
    add_user(&store, "ada").await;
    add_user(&store, "bo").await;

    let (status, created) = send(
        &app,
        "POST",
        "/users/ada/posts",
        Some(json!({"content": "swapped to a bamboo toothbrush", "tags": ["#ZeroWaste"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["post"]["tags"], json!(["zerowaste"]));

    let id = created["post"]["id"].as_str().unwrap();
    let (status, post) = send(
        &app,
        "POST",
        &format!("/posts/{id}/reactions"),
        Some(json!({"user_id": "bo", "reaction": "upvote"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(post["upvotes"], json!(["bo"]));

    let (_, feed) = send(&app, "GET", "/posts?tag=zerowaste", None).await;
    assert_eq!(feed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_leaderboard_route() {
    let (store, app) = app().await;
    for (name, points) in [("ada", 40), ("bo", 90), ("cy", 10)] {
        let mut user = User::new(name.into());
        user.points = points;
        store.insert_user(&user).await.unwrap();
    }

    let (status, body) = send(&app, "GET", "/leaderboard?user=ada", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rank"], 2);
    assert_eq!(body["top"][0]["id"], "bo");
    assert_eq!(body["top"][0]["rank"], 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_call_times_out() {
    let (store, app) = app_with(Arc::new(StalledAssistant), Duration::from_millis(50)).await;
    add_user(&store, "ada").await;

    let (status, body) = send(
        &app,
        "POST",
        "/users/ada/eco-tips",
        Some(json!({"message": "how do I compost?"})),
    )
    .await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["message"], "request timed out");
}
