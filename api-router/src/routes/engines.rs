use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::json;
use tracing::info;

use crate::{api_state::ApiState, error::ApiError};

/// Per-claim engine observability: lifecycle state plus the full snapshot
/// when one is active.
pub async fn engine_status(
    State(state): State<ApiState>,
    Path(claim_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let lifecycle = state.manager.engine_state(&claim_id).await;
    let engine = state.manager.engine_status(&claim_id, Utc::now()).await;

    Ok(Json(json!({
        "claim_id": claim_id,
        "state": lifecycle.as_str(),
        "engine": engine,
    })))
}

/// Administrative force-expire. Idempotent: expiring an absent engine is a
/// 200 with `expired: false`.
pub async fn force_expire(
    State(state): State<ApiState>,
    Path(claim_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let expired = state.manager.expire(&claim_id).await?;
    if expired {
        info!(claim_id, "engine force-expired");
    }
    Ok(Json(json!({ "claim_id": claim_id, "expired": expired })))
}

/// Manual bulk cleanup: one sweep over every live engine, same scan the
/// scheduler runs on its timer.
pub async fn sweep_engines(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let expired = state.manager.expire_overdue(Utc::now()).await?;
    Ok(Json(json!({ "expired_claims": expired })))
}
