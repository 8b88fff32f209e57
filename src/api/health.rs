use axum::{extract::State, Json};
use serde::Serialize;

use super::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: String,
    pub redis: String,
    pub chain: String,
    pub block_number: Option<u64>,
}

fn connectivity(ok: bool) -> String {
    if ok { "connected" } else { "disconnected" }.to_string()
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_ok = state.db.pool().acquire().await.is_ok();

    let mut redis = state.redis.clone();
    let redis_ok = redis::cmd("PING")
        .query_async::<String>(&mut redis)
        .await
        .is_ok();

    let block_number = match state.chain.block_number().await {
        Ok(n) => Some(n),
        Err(err) => {
            tracing::warn!("Health check RPC failed: {}", err);
            None
        }
    };

    let status = if db_ok && redis_ok && block_number.is_some() {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: connectivity(db_ok),
        redis: connectivity(redis_ok),
        chain: connectivity(block_number.is_some()),
        block_number,
    })
}
