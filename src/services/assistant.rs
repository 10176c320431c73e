//! Client for the generative assistant that writes lifestyle suggestions and eco-tips.
//!
//! The upstream speaks a `generateContent`-style JSON API: a prompt goes out as
//! `contents[0].parts[0].text`, generated text comes back in
//! `candidates[0].content.parts[0].text`. Anything else is treated as a failed call.

use core::fmt;
use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::instrument;

use crate::db::models::user::Suggestion;
use crate::util::env::{self, EnvErr, Var};
use crate::var;

const SUGGESTION_COUNT: usize = 3;
const TIP_WORD_LIMIT: usize = 100;

/// Answers from the user's lifestyle questionnaire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Habits {
    pub transport: String,
    pub waste: String,
    pub water: String,
}

#[async_trait]
pub trait Assistant: Send + Sync + fmt::Debug {
    async fn suggest(&self, habits: &Habits) -> AssistantResult<Vec<Suggestion>>;
    async fn eco_tip(&self, message: &str) -> AssistantResult<String>;
}

/// The suggestions stored when the assistant cannot produce valid ones.
pub fn default_suggestions() -> Vec<Suggestion> {
    [
        ("1", "Switch to public transport 3 days a week", "transport"),
        ("2", "Use reusable bags instead of plastic", "waste"),
        ("3", "Reduce shower time to 5 minutes", "water"),
    ]
    .into_iter()
    .map(|(id, action, category)| Suggestion {
        id: id.to_string(),
        action: action.to_string(),
        category: category.to_string(),
    })
    .collect()
}

/// `assistant.suggest(habits)`, falling back to [`default_suggestions`] on any failure.
pub async fn suggestions_or_default(assistant: &dyn Assistant, habits: &Habits) -> Vec<Suggestion> {
    match assistant.suggest(habits).await {
        Ok(suggestions) => suggestions,
        Err(e) => {
            tracing::warn!(error = %e, "assistant suggestions unavailable, using defaults");
            default_suggestions()
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssistantClient {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl AssistantClient {
    pub fn new(url: &str, api_key: &str, timeout: Duration) -> AssistantResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// `None` when no assistant endpoint is configured.
    pub async fn from_env() -> AssistantResult<Option<Self>> {
        let url = var!(Var::AssistantApiUrl).await?;
        if url.is_empty() {
            return Ok(None);
        }

        let api_key = var!(Var::AssistantApiKey).await?;
        let timeout = env::request_timeout().await?;
        Ok(Some(Self::new(url, api_key, timeout)?))
    }

    #[instrument(skip(self, prompt), fields(prompt_len = prompt.len()))]
    async fn generate(&self, prompt: &str) -> AssistantResult<String> {
        let body = GenerateRequest {
            contents: [Content {
                parts: [Part { text: prompt }],
            }],
        };

        let mut req = self.client.post(&self.url).json(&body);
        if !self.api_key.is_empty() {
            req = req.query(&[("key", self.api_key.as_str())]);
        }

        let res = req.send().await?;
        let status = res.status();
        if !status.is_success() {
            let reason = res
                .json::<Value>()
                .await
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
                .unwrap_or_else(|| status.to_string());

            tracing::error!(code = %status, %reason, "assistant request failed");
            return Err(AssistantErr::Upstream(reason));
        }

        let parsed: GenerateResponse = res.json().await?;
        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| AssistantErr::Malformed("response carried no generated text".into()))
    }
}

#[async_trait]
impl Assistant for AssistantClient {
    async fn suggest(&self, habits: &Habits) -> AssistantResult<Vec<Suggestion>> {
        let text = self.generate(&suggestion_prompt(habits)).await?;
        parse_suggestions(&text)
    }

    async fn eco_tip(&self, message: &str) -> AssistantResult<String> {
        let message = message.trim();
        if message.is_empty() {
            return Err(AssistantErr::EmptyMessage);
        }

        Ok(self.generate(&eco_tip_prompt(message)).await?.trim().to_string())
    }
}

/// Stand-in used when no assistant endpoint is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineAssistant;

#[async_trait]
impl Assistant for OfflineAssistant {
    async fn suggest(&self, _habits: &Habits) -> AssistantResult<Vec<Suggestion>> {
        Ok(default_suggestions())
    }

    async fn eco_tip(&self, _message: &str) -> AssistantResult<String> {
        Err(AssistantErr::Unconfigured)
    }
}

pub fn suggestion_prompt(habits: &Habits) -> String {
    format!(
        r#"You are an AI assistant helping users adopt sustainable lifestyles. Based on the following user habits, provide {SUGGESTION_COUNT} specific, actionable recommendations to reduce their environmental impact. Each recommendation should be a short sentence (e.g., "Switch to public transport 3 days a week") and include a category (transport, waste, water). Format the response as a JSON array of objects with "id", "action", and "category" fields.

User habits:
- Transport: {}
- Waste: {}
- Water: {}"#,
        habits.transport, habits.waste, habits.water
    )
}

pub fn eco_tip_prompt(message: &str) -> String {
    format!(
        "You are an eco-friendly chatbot for the EnviRon app. Provide a concise eco-tip or answer \
         related to sustainability, recycling, or climate change based on the user's input. Keep \
         the response under {TIP_WORD_LIMIT} words and focus on actionable advice. User input: \
         \"{message}\""
    )
}

/// Parses generated text into exactly three suggestions with distinct ids.
///
/// Models like to wrap JSON in markdown fences, so those are stripped first.
pub fn parse_suggestions(text: &str) -> AssistantResult<Vec<Suggestion>> {
    let json = strip_fences(text);
    let raw: Vec<Suggestion> =
        serde_json::from_str(json).map_err(|e| AssistantErr::Malformed(e.to_string()))?;

    let suggestions: Vec<Suggestion> = raw
        .into_iter()
        .map(|s| Suggestion {
            id: s.id.trim().to_string(),
            action: s.action.trim().to_string(),
            category: s.category.trim().to_lowercase(),
        })
        .filter(|s| !s.id.is_empty() && !s.action.is_empty() && !s.category.is_empty())
        .take(SUGGESTION_COUNT)
        .collect();

    if suggestions.len() < SUGGESTION_COUNT {
        return Err(AssistantErr::Malformed(format!(
            "expected {SUGGESTION_COUNT} suggestions, got {}",
            suggestions.len()
        )));
    }

    let ids: BTreeSet<&str> = suggestions.iter().map(|s| s.id.as_str()).collect();
    if ids.len() != suggestions.len() {
        return Err(AssistantErr::Malformed("duplicate suggestion ids".into()));
    }

    Ok(suggestions)
}

fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    match trimmed.strip_prefix("```") {
        Some(rest) => {
            let rest = rest.strip_prefix("json").unwrap_or(rest);
            rest.strip_suffix("```").unwrap_or(rest).trim()
        }
        None => trimmed,
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<GeneratedPart>,
}

#[derive(Debug, Deserialize)]
struct GeneratedPart {
    #[serde(default)]
    text: String,
}

pub type AssistantResult<T> = core::result::Result<T, AssistantErr>;

#[derive(Debug, Error)]
pub enum AssistantErr {
    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),

    #[error(transparent)]
    EnvError(#[from] EnvErr),

    #[error("assistant returned an error: {0}")]
    Upstream(String),

    #[error("malformed assistant response: {0}")]
    Malformed(String),

    #[error("message is empty")]
    EmptyMessage,

    #[error("no assistant is configured")]
    Unconfigured,
}

#[cfg(test)]
mod test {
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn generated(text: &str) -> Value {
        json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] })
    }

    async fn client(server: &MockServer) -> AssistantClient {
        AssistantClient::new(
            &format!("{}/v1/generate", server.uri()),
            "test-key",
            Duration::from_secs(2),
        )
        .unwrap()
    }

    fn habits() -> Habits {
        Habits {
            transport: "car every day".into(),
            waste: "no recycling".into(),
            water: "long showers".into(),
        }
    }

    #[test]
    fn test_parse_fenced_json() {
        let text = r#"```json
        [
          {"id": 1, "action": "Cycle to work twice a week", "category": "Transport"},
          {"id": 2, "action": "Compost food scraps", "category": "waste"},
          {"id": 3, "action": "Fix leaking taps", "category": "water"}
        ]
        ```"#;

        let parsed = parse_suggestions(text).unwrap();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0].id, "1");
        assert_eq!(parsed[0].category, "transport");
    }

    #[test]
    fn test_parse_rejects_short_or_duplicate() {
        assert!(parse_suggestions(r#"[{"id": 1, "action": "a", "category": "waste"}]"#).is_err());
        assert!(
            parse_suggestions(
                r#"[{"id": 1, "action": "a", "category": "waste"},
                    {"id": 1, "action": "b", "category": "water"},
                    {"id": 2, "action": "c", "category": "water"}]"#
            )
            .is_err()
        );
        assert!(parse_suggestions("Sure! Here are some ideas...").is_err());
    }

    #[tokio::test]
    async fn test_suggest_round_trip() {
        let server = MockServer::start().await;
        let text = json!([
            {"id": 1, "action": "Take the bus on Mondays", "category": "transport"},
            {"id": 2, "action": "Carry a reusable bottle", "category": "waste"},
            {"id": 3, "action": "Shower in under 5 minutes", "category": "water"}
        ])
        .to_string();

        Mock::given(method("POST"))
            .and(path("/v1/generate"))
            .and(query_param("key", "test-key"))
            .and(body_string_contains("car every day"))
            .respond_with(ResponseTemplate::new(200).set_body_json(generated(&text)))
            .expect(1)
            .mount(&server)
            .await;

        let suggestions = client(&server).await.suggest(&habits()).await.unwrap();
        assert_eq!(suggestions[2].action, "Shower in under 5 minutes");
    }

    #[tokio::test]
    async fn test_upstream_error_falls_back() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429).set_body_json(json!({"error": {"message": "quota"}})),
            )
            .mount(&server)
            .await;

        let assistant = client(&server).await;
        let err = assistant.suggest(&habits()).await.unwrap_err();
        assert!(matches!(err, AssistantErr::Upstream(ref reason) if reason == "quota"));

        let fallback = suggestions_or_default(&assistant, &habits()).await;
        assert_eq!(fallback, default_suggestions());
    }

    #[tokio::test]
    async fn test_empty_candidates_are_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
            .mount(&server)
            .await;

        let err = client(&server).await.eco_tip("how do I recycle glass?").await;
        assert!(matches!(err, Err(AssistantErr::Malformed(_))));
    }

    #[tokio::test]
    async fn test_eco_tip_trims_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("recycle glass"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(generated("  Rinse jars first.\n")),
            )
            .mount(&server)
            .await;

        let tip = client(&server).await.eco_tip("how do I recycle glass?").await.unwrap();
        assert_eq!(tip, "Rinse jars first.");
    }

    #[tokio::test]
    async fn test_offline_assistant() {
        let offline = OfflineAssistant;
        assert_eq!(offline.suggest(&habits()).await.unwrap(), default_suggestions());
        assert!(matches!(
            offline.eco_tip("hi").await,
            Err(AssistantErr::Unconfigured)
        ));
    }
}
