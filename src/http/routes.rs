//! HTTP route definitions

use axum::{
    extract::{Path, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use uuid::Uuid;

use crate::app::AppState;
use crate::config::RulesPatch;
use crate::game::snapshot::MatchSnapshot;
use crate::game::{ActionDenied, SessionError, SessionHandle, TargetSpec};
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - support multiple origins (comma-separated in CLIENT_ORIGIN)
    let allowed_origins: Vec<header::HeaderValue> = state
        .config
        .client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .route("/matches", post(create_match_handler))
        .route("/matches/:id", get(match_snapshot_handler))
        .route("/matches/:id/targets", post(spawn_target_handler))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_matches: usize,
    active_players: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_matches: state.registry.active_matches(),
        active_players: state.registry.total_players(),
    })
}

// ============================================================================
// Match endpoints
// ============================================================================

#[derive(Deserialize)]
struct CreateMatchRequest {
    targets: Vec<TargetSpec>,
    #[serde(default)]
    rules: Option<RulesPatch>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateMatchResponse {
    match_id: Uuid,
    ws_url: String,
}

async fn create_match_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateMatchRequest>,
) -> Result<(StatusCode, Json<CreateMatchResponse>), AppError> {
    let rules = match &req.rules {
        Some(patch) => patch.apply(&state.config.rules),
        None => state.config.rules.clone(),
    };
    let fish = req.targets.len();

    let handle = state.registry.create(rules, req.targets)?;
    info!(match_id = %handle.id, fish, "Match created over HTTP");

    let ws_url = format!(
        "{}/ws?matchId={}",
        state
            .config
            .public_base_url
            .replace("https://", "wss://")
            .replace("http://", "ws://"),
        handle.id
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateMatchResponse {
            match_id: handle.id,
            ws_url,
        }),
    ))
}

async fn match_snapshot_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MatchSnapshot>, AppError> {
    let handle = find_match(&state, id)?;
    Ok(Json(handle.snapshot().await?))
}

#[derive(Serialize)]
struct SpawnResponse {
    events: usize,
}

async fn spawn_target_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(spec): Json<TargetSpec>,
) -> Result<(StatusCode, Json<SpawnResponse>), AppError> {
    let handle = find_match(&state, id)?;
    let events = handle.spawn_target(spec).await?;
    Ok((
        StatusCode::CREATED,
        Json(SpawnResponse {
            events: events.len(),
        }),
    ))
}

fn find_match(state: &AppState, id: Uuid) -> Result<SessionHandle, AppError> {
    state
        .registry
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("Match {id}")))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        let message = err.to_string();
        match err {
            SessionError::Denied(ActionDenied::MatchOver) | SessionError::DuplicateTarget(_) => {
                AppError::Conflict(message)
            }
            SessionError::Denied(_) => AppError::BadRequest(message),
            SessionError::Closed => AppError::Internal(message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
