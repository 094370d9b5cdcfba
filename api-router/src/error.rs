use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::error::AppError;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Serialize, Clone)]
pub enum ApiError {
    #[error("Internal server error")]
    InternalError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Readiness thresholds unmet. Carries the unmet conditions so the
    /// caller knows what evidence is still missing.
    #[error("Claim not ready: {}", reasons.join("; "))]
    NotReady { reasons: Vec<String> },

    /// Retrieval could not ground an answer; responding anyway would
    /// fabricate.
    #[error("Insufficient grounding: {0}")]
    InsufficientGrounding(String),

    /// A dependency (embedding, indexing, answer generation) is down;
    /// retryable.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Database(_) | AppError::OpenAI(_) => {
                tracing::error!("Internal error: {:?}", err);
                Self::InternalError("Internal server error".to_string())
            }
            AppError::NotFound(msg) => Self::NotFound(msg),
            AppError::EngineNotFound(claim_id) => {
                Self::NotFound(format!("no live engine for claim {claim_id}"))
            }
            AppError::Validation(msg) => Self::ValidationError(msg),
            AppError::Auth(msg) => Self::Unauthorized(msg),
            AppError::NotReady { reasons } => Self::NotReady { reasons },
            AppError::InsufficientGrounding(msg) => Self::InsufficientGrounding(msg),
            AppError::CreationFailure(msg) | AppError::CapabilityUnavailable(msg) => {
                Self::ServiceUnavailable(msg)
            }
            _ => Self::InternalError("Internal server error".to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::InternalError(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::plain(message),
            ),
            Self::ValidationError(message) => {
                (StatusCode::BAD_REQUEST, ErrorResponse::plain(message))
            }
            Self::NotFound(message) => (StatusCode::NOT_FOUND, ErrorResponse::plain(message)),
            Self::Unauthorized(message) => {
                (StatusCode::UNAUTHORIZED, ErrorResponse::plain(message))
            }
            Self::NotReady { reasons } => (
                StatusCode::CONFLICT,
                ErrorResponse {
                    error: "claim not ready".to_string(),
                    status: "error".to_string(),
                    reasons: Some(reasons),
                },
            ),
            Self::InsufficientGrounding(message) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorResponse::plain(message),
            ),
            Self::ServiceUnavailable(message) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorResponse::plain(message),
            ),
        };

        (status, Json(body)).into_response()
    }
}

#[derive(Serialize, Debug)]
struct ErrorResponse {
    error: String,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasons: Option<Vec<String>>,
}

impl ErrorResponse {
    fn plain(error: String) -> Self {
        Self {
            error,
            status: "error".to_string(),
            reasons: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Debug;

    fn assert_status_code<T: IntoResponse + Debug>(response: T, expected_status: StatusCode) {
        let response = response.into_response();
        assert_eq!(response.status(), expected_status);
    }

    #[test]
    fn app_error_mapping_covers_the_domain_taxonomy() {
        let not_ready = AppError::NotReady {
            reasons: vec!["need 1 more document".into()],
        };
        assert!(matches!(
            ApiError::from(not_ready),
            ApiError::NotReady { reasons } if reasons.len() == 1
        ));

        let gone = AppError::EngineNotFound("CLM-1".into());
        assert!(matches!(ApiError::from(gone), ApiError::NotFound(_)));

        let grounding = AppError::InsufficientGrounding("nothing retrieved".into());
        assert!(matches!(
            ApiError::from(grounding),
            ApiError::InsufficientGrounding(_)
        ));

        let creation = AppError::CreationFailure("all documents failed".into());
        assert!(matches!(
            ApiError::from(creation),
            ApiError::ServiceUnavailable(_)
        ));

        let capability = AppError::CapabilityUnavailable("embedding down".into());
        assert!(matches!(
            ApiError::from(capability),
            ApiError::ServiceUnavailable(_)
        ));

        let internal = AppError::Io(std::io::Error::other("io error"));
        assert!(matches!(ApiError::from(internal), ApiError::InternalError(_)));
    }

    #[test]
    fn response_status_codes_follow_the_contract() {
        assert_status_code(
            ApiError::NotReady {
                reasons: vec!["need 1 more document".into()],
            },
            StatusCode::CONFLICT,
        );
        assert_status_code(
            ApiError::InsufficientGrounding("no grounding".into()),
            StatusCode::UNPROCESSABLE_ENTITY,
        );
        assert_status_code(
            ApiError::ServiceUnavailable("embedding down".into()),
            StatusCode::SERVICE_UNAVAILABLE,
        );
        assert_status_code(ApiError::NotFound("missing".into()), StatusCode::NOT_FOUND);
        assert_status_code(
            ApiError::Unauthorized("no key".into()),
            StatusCode::UNAUTHORIZED,
        );
        assert_status_code(
            ApiError::ValidationError("bad input".into()),
            StatusCode::BAD_REQUEST,
        );
        assert_status_code(
            ApiError::InternalError("secret detail".into()),
            StatusCode::INTERNAL_SERVER_ERROR,
        );
    }

    #[test]
    fn internal_errors_never_leak_detail() {
        let api_error = ApiError::InternalError("db password incorrect".to_string());
        assert_eq!(api_error.to_string(), "Internal server error");
    }
}
