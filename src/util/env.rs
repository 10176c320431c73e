//! Process configuration.
//!
//! Variables are read once (from the process environment, with `.env` layered underneath by
//! [`dotenvy`]) into an [`Env`] and handed out as `&'static str` through the [`var!`] macro.
//!
//! [`var!`]: crate::var

use std::sync::LazyLock;
use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::OnceCell;

static ENV_VARS: LazyLock<OnceCell<Env>> = LazyLock::new(OnceCell::new);
pub async fn get_var(var: Var) -> EnvResult<&'static str> {
    let vars = ENV_VARS.get_or_try_init(|| async { Env::new() }).await?;
    Ok(match var {
        Var::DatabaseUrl => &vars.database_url,
        Var::RedisUrl => &vars.redis_url,
        Var::ServerApiPort => &vars.server_api_port,
        Var::OtelExporterEndpoint => &vars.otel_exporter_otlp_endpoint,
        Var::ApiServiceName => &vars.api_service_name,
        Var::ApiTracerName => &vars.api_tracer_name,
        Var::AssistantApiUrl => &vars.assistant_api_url,
        Var::AssistantApiKey => &vars.assistant_api_key,
        Var::RequestTimeoutSecs => &vars.request_timeout_secs,
        Var::ViewCacheTtlSecs => &vars.view_cache_ttl_secs,
        Var::StoreRetryAttempts => &vars.store_retry_attempts,
        Var::CorsAllowOrigins => &vars.cors_allow_origins,
    })
}

/// Parses a numeric variable, e.g. `var_parsed::<u64>(Var::RequestTimeoutSecs)`.
pub async fn var_parsed<T>(var: Var) -> EnvResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = get_var(var).await?;
    raw.parse::<T>().map_err(|e| EnvErr::Invalid {
        var: format!("{var:?}"),
        reason: e.to_string(),
    })
}

pub async fn request_timeout() -> EnvResult<Duration> {
    Ok(Duration::from_secs(var_parsed(Var::RequestTimeoutSecs).await?))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Env {
    pub database_url: String,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_port")]
    pub server_api_port: String,
    /// Empty disables the OTLP exporters; `stdout` prints spans to the console.
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: String,
    #[serde(default = "default_service_name")]
    pub api_service_name: String,
    #[serde(default = "default_tracer_name")]
    pub api_tracer_name: String,
    #[serde(default)]
    pub assistant_api_url: String,
    #[serde(default)]
    pub assistant_api_key: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: String,
    #[serde(default = "default_view_ttl")]
    pub view_cache_ttl_secs: String,
    #[serde(default = "default_retry_attempts")]
    pub store_retry_attempts: String,
    /// `*`, or a suffix every allowed origin must end with.
    #[serde(default = "default_cors")]
    pub cors_allow_origins: String,
}

fn default_redis_url() -> String {
    String::from("redis://127.0.0.1:6379")
}

fn default_port() -> String {
    String::from("3000")
}

fn default_service_name() -> String {
    String::from("environ-engine")
}

fn default_tracer_name() -> String {
    String::from("environ-tracer")
}

fn default_request_timeout() -> String {
    String::from("10")
}

fn default_view_ttl() -> String {
    String::from("300")
}

fn default_retry_attempts() -> String {
    String::from("3")
}

fn default_cors() -> String {
    String::from("*")
}

impl Env {
    pub fn new() -> EnvResult<Self> {
        from_env::<Env>()
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Var {
    DatabaseUrl,
    RedisUrl,
    ServerApiPort,
    OtelExporterEndpoint,
    ApiServiceName,
    ApiTracerName,
    AssistantApiUrl,
    AssistantApiKey,
    RequestTimeoutSecs,
    ViewCacheTtlSecs,
    StoreRetryAttempts,
    CorsAllowOrigins,
}

#[macro_export]
macro_rules! var {
    ($ev:expr) => {
        $crate::util::env::get_var($ev)
    };
}

pub fn from_env<T>() -> EnvResult<T>
where
    T: DeserializeOwned,
{
    // a missing `.env` file is fine, real environment variables still apply
    if let Err(e) = dotenvy::dotenv()
        && !e.not_found()
    {
        return Err(e.into());
    }

    from_iter(std::env::vars())
}

/// Every value arrives as a string; numeric settings are parsed at their use site.
pub fn from_iter<Iter, T>(iter: Iter) -> EnvResult<T>
where
    T: DeserializeOwned,
    Iter: IntoIterator<Item = (String, String)>,
{
    let vars: Map<String, Value> = iter
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();

    Ok(serde_json::from_value(Value::Object(vars))?)
}

pub type EnvResult<T> = core::result::Result<T, EnvErr>;

#[derive(Debug, Error)]
pub enum EnvErr {
    #[error(transparent)]
    Dotenvy(#[from] dotenvy::Error),

    #[error("env deserialization error: {0}")]
    DeserializationError(#[from] serde_json::Error),

    #[error("invalid value for {var}: {reason}")]
    Invalid { var: String, reason: String },
}
