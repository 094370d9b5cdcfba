use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use common::storage::types::claim_document::{ClaimDocument, DocumentType};

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct RegisterDocumentRequest {
    /// Caller-supplied id makes registration idempotent; omitted ids get a
    /// fresh UUID.
    pub document_id: Option<String>,
    pub document_type: DocumentType,
    pub size_bytes: u64,
    pub content_ref: String,
}

/// Document registry feed. Stores the document; when the claim already has
/// an active engine the delta is indexed before the call returns.
pub async fn register_document(
    State(state): State<ApiState>,
    Path(claim_id): Path<String>,
    Json(input): Json<RegisterDocumentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if input.content_ref.trim().is_empty() {
        return Err(ApiError::ValidationError(
            "content_ref must not be empty".to_string(),
        ));
    }

    let document = match input.document_id {
        Some(id) => ClaimDocument::with_id(
            id,
            claim_id.clone(),
            input.document_type,
            input.size_bytes,
            input.content_ref,
        ),
        None => ClaimDocument::new(
            claim_id.clone(),
            input.document_type,
            input.size_bytes,
            input.content_ref,
        ),
    };

    let stored = document.register(&state.db).await?;

    info!(
        claim_id,
        document_id = %stored.id,
        document_type = %stored.document_type,
        size_bytes = stored.size_bytes,
        "document registered"
    );

    state
        .manager
        .add_documents(&claim_id, std::slice::from_ref(&stored))
        .await?;

    let readiness = state.manager.check_readiness(&claim_id).await?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "status": "success",
            "document_id": stored.id,
            "readiness": readiness,
        })),
    ))
}

/// `check_readiness` as an endpoint; unready claims are a 200 with the
/// unmet conditions, not an error.
pub async fn claim_readiness(
    State(state): State<ApiState>,
    Path(claim_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let readiness = state.manager.check_readiness(&claim_id).await?;
    Ok(Json(readiness))
}
