//! HTTP route definitions

use axum::{
    extract::{Extension, Path, State},
    http::{header, Method, StatusCode},
    middleware,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};
use uuid::Uuid;

use crate::app::AppState;
use crate::auth::issue_token;
use crate::http::middleware::{require_auth, AuthenticatedUser};
use crate::session::{PlayerId, PlayerView, SessionError};
use crate::store::AccountError;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.client_origins);

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .route("/auth/register", post(register_handler))
        .route("/auth/login", post(login_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/players", get(list_players_handler))
        .route("/players/:id", get(get_player_handler))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let allowed_origins: Vec<header::HeaderValue> = origins
        .iter()
        .filter_map(|s| s.parse::<header::HeaderValue>().ok())
        .collect();

    layer.allow_origin(allowed_origins).allow_credentials(true)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_players: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_players: state.session.player_count(),
    })
}

// ============================================================================
// Account endpoints
// ============================================================================

#[derive(Deserialize)]
struct CredentialsRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    token: String,
    player_id: String,
}

async fn register_handler(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    state.accounts.register(&req.username, &req.password).await?;
    info!(username = %req.username, "Account registered");
    token_response(&state, req.username)
}

async fn login_handler(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    state.accounts.authenticate(&req.username, &req.password)?;
    token_response(&state, req.username)
}

fn token_response(state: &AppState, username: String) -> Result<Json<TokenResponse>, AppError> {
    let token = issue_token(&username, &state.config.jwt_secret, state.config.token_ttl_secs)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(TokenResponse {
        token,
        player_id: username,
    }))
}

// ============================================================================
// Live player queries
// ============================================================================

#[derive(Serialize)]
struct PlayersResponse {
    players: Vec<PlayerView>,
}

async fn list_players_handler(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthenticatedUser>,
) -> Result<Json<PlayersResponse>, AppError> {
    let players = state.session.list_players().await?;
    Ok(Json(PlayersResponse { players }))
}

async fn get_player_handler(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<PlayerView>, AppError> {
    state
        .session
        .get_player(PlayerId::from(id))
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("player {}", id)))
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

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<AccountError> for AppError {
    fn from(e: AccountError) -> Self {
        match e {
            AccountError::MissingCredentials | AccountError::AlreadyExists => {
                AppError::BadRequest(e.to_string())
            }
            AccountError::InvalidCredentials => AppError::Unauthorized(e.to_string()),
            AccountError::Io(_) | AccountError::Encode(_) => {
                error!(error = %e, "Account store failure");
                AppError::Internal("account store unavailable".to_string())
            }
        }
    }
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
