use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub question: String,
}

/// Grounded Q&A over one claim's engine. Engine creation is lazy: the first
/// question on a ready claim builds the engine before answering.
pub async fn query_claim(
    State(state): State<ApiState>,
    Path(claim_id): Path<String>,
    Json(input): Json<QueryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let answer = state.query.answer(&claim_id, &input.question).await?;
    Ok(Json(answer))
}
