// HTTP surface: a banner, lobby listing and creation, read-only snapshots
// and the WebSocket upgrade.

use axum::extract::{Path, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use log::info;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use crate::errors::PowerGridError;
use crate::game::{GameManager, GameSnapshot, GameSummary};
use crate::map::DEFAULT_MAP;
use crate::session::SessionManager;
use crate::websocket::ws_handler;

#[derive(Clone)]
pub struct AppState {
    pub games: GameManager,
    pub sessions: SessionManager,
}

impl AppState {
    pub fn new(sessions: SessionManager) -> Self {
        Self {
            games: sessions.games().clone(),
            sessions,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .allow_origin(Any);

    Router::new()
        .route("/", get(banner))
        .route("/games", get(list_games).post(create_game))
        .route("/games/{game_id}", get(get_game))
        .route("/ws", get(ws_handler))
        .with_state(state)
        .layer(cors)
}

impl PowerGridError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PowerGridError::Validation(_) | PowerGridError::Economic(_) => StatusCode::BAD_REQUEST,
            PowerGridError::NotFound(_) => StatusCode::NOT_FOUND,
            PowerGridError::ServerBusy => StatusCode::SERVICE_UNAVAILABLE,
            PowerGridError::Network(_) | PowerGridError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for PowerGridError {
    fn into_response(self) -> Response {
        let body = json!({ "code": self.code(), "message": self.to_string() });
        (self.status_code(), Json(body)).into_response()
    }
}

async fn banner() -> &'static str {
    "Power Grid server"
}

async fn list_games(State(state): State<AppState>) -> Json<Vec<GameSummary>> {
    Json(state.games.list_games().await)
}

#[derive(Debug, Deserialize)]
struct CreateGameRequest {
    name: String,
    #[serde(default)]
    map: Option<String>,
    #[serde(default)]
    max_players: Option<usize>,
}

async fn create_game(
    State(state): State<AppState>,
    Json(request): Json<CreateGameRequest>,
) -> Result<(StatusCode, Json<GameSummary>), PowerGridError> {
    let games = &state.games;
    let map = request.map.as_deref().unwrap_or(DEFAULT_MAP);
    let max_players = request.max_players.unwrap_or(games.rules().max_players);
    info!("🌐 HTTP create '{}' on {}", request.name, map);
    let summary = games.create_game(&request.name, map, max_players).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

async fn get_game(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
) -> Result<Json<GameSnapshot>, PowerGridError> {
    Ok(Json(state.games.snapshot(&game_id).await?))
}
