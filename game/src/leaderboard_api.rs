use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    routing::get,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::http_gateway::LEADERBOARD_PATH;
use crate::leaderboard::{
    DEFAULT_TOP_N, GatewayError, LeaderboardEntry, MemoryLeaderboard, ScoreSubmission,
};

pub const MAX_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct TopQuery {
    pub limit: Option<usize>,
}

impl TopQuery {
    pub fn resolved_limit(self) -> usize {
        self.limit.unwrap_or(DEFAULT_TOP_N).clamp(1, MAX_LIMIT)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InsertResponse {
    pub ok: bool,
    pub rank: Option<usize>,
}

pub fn router(store: MemoryLeaderboard) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health))
        .route(LEADERBOARD_PATH, get(top).post(insert))
        .with_state(store)
        .layer(cors)
}

async fn health() -> &'static str {
    "ok"
}

fn unavailable(err: GatewayError) -> (StatusCode, String) {
    tracing::warn!(error = %err, "leaderboard store error");
    (StatusCode::SERVICE_UNAVAILABLE, err.to_string())
}

async fn top(
    State(store): State<MemoryLeaderboard>,
    Query(query): Query<TopQuery>,
) -> Result<Json<Vec<LeaderboardEntry>>, (StatusCode, String)> {
    store
        .top(query.resolved_limit())
        .map(Json)
        .map_err(unavailable)
}

async fn insert(
    State(store): State<MemoryLeaderboard>,
    Json(submission): Json<ScoreSubmission>,
) -> Result<(StatusCode, Json<InsertResponse>), (StatusCode, String)> {
    if submission.nickname.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "nickname is required".to_string()));
    }

    let nickname = submission.nickname.clone();
    let score = submission.score;
    store.push(submission).map_err(unavailable)?;

    // Position of this row in the full ranking, 1-based.
    let rank = store
        .top(usize::MAX)
        .ok()
        .and_then(|ranked| {
            ranked
                .iter()
                .rposition(|e| e.nickname == nickname && e.score == score)
        })
        .map(|i| i + 1);
    tracing::info!(%nickname, score, ?rank, "score stored");

    Ok((StatusCode::CREATED, Json(InsertResponse { ok: true, rank })))
}
