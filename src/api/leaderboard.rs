use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    models::ApiResponse,
    services::leaderboard_cache::{clamp_limit, LeaderboardEntry},
};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardResponse {
    pub limit: i64,
    pub entries: Vec<LeaderboardEntry>,
}

/// GET /leaderboard?limit=
pub async fn get_leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<ApiResponse<LeaderboardResponse>>> {
    let entries = state.leaderboard.top(query.limit).await?;

    Ok(Json(ApiResponse::success(LeaderboardResponse {
        limit: clamp_limit(query.limit),
        entries,
    })))
}
