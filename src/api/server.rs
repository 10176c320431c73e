use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{MatchedPath, Request};
use axum::middleware::{Next, from_fn};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use http::request::Parts as ReqParts;
use http::{HeaderValue, Method, StatusCode};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::instrument;

use crate::api::handler::*;
use crate::engine::{EngineError, EngineResult, ProgressionEngine};
use crate::util::env::{EnvErr, Var, var_parsed};
use crate::var;

pub type JsonResult<T> = core::result::Result<Json<T>, RouteError>;
pub type RouteResult<T> = core::result::Result<T, RouteError>;

#[derive(Clone, Debug)]
pub struct AppState {
    pub engine: Arc<ProgressionEngine>,
    /// Upper bound on a single engine call, enforced here rather than in the engine.
    pub timeout: Duration,
}

impl AppState {
    pub fn new(engine: Arc<ProgressionEngine>, timeout: Duration) -> Self {
        Self { engine, timeout }
    }

    /// Runs an engine call under the request timeout.
    ///
    /// Store writes already issued by the call keep going after a timeout.
    pub async fn call<T, F>(&self, fut: F) -> RouteResult<T>
    where
        F: Future<Output = EngineResult<T>>,
    {
        Ok(tokio::time::timeout(self.timeout, fut).await??)
    }
}

pub fn router(state: Arc<AppState>, cors: CorsLayer) -> Router {
    Router::new()
        //
        // general
        .route("/", get(|| async { Response::new(Body::empty()) }))
        .route("/leaderboard", get(leaderboard))
        //
        // challenge catalog
        .route("/challenges", get(list_challenges))
        .route("/challenges/{id}/standing", get(challenge_standing))
        //
        // per-user progression
        .route("/users/{user}", get(user_profile))
        .route("/users/{user}/level", get(level_summary))
        .route("/users/{user}/onboarding", post(ensure_profile))
        .route("/users/{user}/challenges", get(user_challenges))
        .route("/users/{user}/challenges/{id}/join", post(join_challenge))
        .route("/users/{user}/challenges/{id}/progress", post(record_progress))
        .route("/users/{user}/referrals", post(record_referral))
        .route("/users/{user}/recommendations", post(generate_recommendations))
        .route(
            "/users/{user}/recommendations/{recommendation}/complete",
            post(complete_recommendation),
        )
        .route("/users/{user}/classifications", post(record_classification))
        .route("/users/{user}/eco-tips", post(ask_eco_tip))
        .route("/users/{user}/posts", post(create_post))
        //
        // community feed
        .route("/posts", get(recent_posts))
        .route("/posts/{post}/reactions", post(toggle_reaction))
        .route("/posts/{post}/comments", post(add_comment))
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
                let method = req.method();
                let uri = req.uri();

                let matched_path = req
                    .extensions()
                    .get::<MatchedPath>()
                    .map(|matched| matched.as_str());

                tracing::debug_span!("api_request", ?method, ?uri, ?matched_path)
            }),
        )
        .layer(from_fn(log_route_errors))
        .layer(cors)
        .with_state(state)
}

/// `*` allows any origin, anything else is matched as an origin suffix.
pub async fn cors() -> RouteResult<CorsLayer> {
    let cors_allowed = var!(Var::CorsAllowOrigins).await?;

    let allowed = if cors_allowed == "*" {
        AllowOrigin::any()
    } else {
        AllowOrigin::predicate(|org: &HeaderValue, _: &ReqParts| {
            org.as_bytes().ends_with(cors_allowed.as_bytes())
        })
    };

    Ok(CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
        .allow_origin(allowed))
}

#[instrument(skip(state, tx))]
pub async fn serve(state: Arc<AppState>, tx: UnboundedSender<SocketAddr>) -> RouteResult<()> {
    let app = router(state, cors().await?);

    let port = var_parsed::<u16>(Var::ServerApiPort).await?;
    let socket_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), port);
    let listener = tokio::net::TcpListener::bind(socket_addr).await?;

    // nobody listening for readiness is fine
    _ = tx.send(socket_addr);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Logs the error attached to any `RouteError` response.
#[instrument(skip(request, next), fields(uri = request.uri().to_string()))]
async fn log_route_errors(request: Request, next: Next) -> Response {
    let res = next.run(request).await;
    if let Some(err) = res.extensions().get::<Arc<RouteError>>() {
        if res.status().is_server_error() {
            tracing::error!(error = ?err, "error occurred inside route handler");
        } else {
            tracing::debug!(error = ?err, "request rejected");
        }
    }

    res
}

#[instrument(skip(engine))]
pub async fn start_server(
    engine: Arc<ProgressionEngine>,
    timeout: Duration,
) -> RouteResult<Vec<JoinHandle<()>>> {
    tracing::info!("starting server");
    let state = Arc::new(AppState::new(engine, timeout));
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<SocketAddr>();

    let server_handle = tokio::task::spawn(async move {
        if let Err(e) = serve(state, tx).await {
            tracing::error!(error = ?e, "api server exited");
        }
    });

    let logging_handle = tokio::task::spawn(log_ready(rx));

    Ok(vec![server_handle, logging_handle])
}

async fn log_ready(mut rx: UnboundedReceiver<SocketAddr>) {
    if let Some(addr) = rx.recv().await {
        tracing::info!(
            server_url = &format!("http://127.0.0.1:{}", addr.port()),
            "server ready"
        );
    }
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("request timed out")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error(transparent)]
    EnvError(#[from] EnvErr),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            message: String,
        }

        let status = match &self {
            RouteError::Engine(err) => match err {
                EngineError::NotFound(_) => StatusCode::NOT_FOUND,
                EngineError::ValidationFailed(_) | EngineError::InvalidEvent(_) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                EngineError::StoreUnavailable(_) | EngineError::AssistantUnavailable(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                EngineError::SchemaMismatch(_) | EngineError::Store(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            RouteError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            RouteError::EnvError(_) | RouteError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // internals stay in the logs
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            String::from("internal server error")
        } else {
            self.to_string()
        };

        let mut response = (status, Json(ErrorResponse { message })).into_response();
        response.extensions_mut().insert(Arc::new(self));
        response
    }
}
