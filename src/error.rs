//! Error types
//!
//! `VerifyError` is the verification taxonomy surfaced to callers as
//! `errorKind`. `ApiError` covers the remaining HTTP endpoints.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::orchestrator::VerificationStage;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Mission not found: {0}")]
    MissionNotFound(String),

    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    #[error("Evidence upload failed: {0}")]
    EvidenceUploadFailed(String),

    #[error("Authenticity judge unavailable: {0}")]
    JudgeUnavailable(String),

    #[error("Ledger write failed: {0}")]
    LedgerWriteFailed(String),

    /// The verified entry is durable but the balance was not updated yet.
    /// The reconciler retries the credit for `entry_id`.
    #[error("Credit for ledger entry {entry_id} not applied: {message}")]
    CreditApplicationFailed { entry_id: Uuid, message: String },

    #[error("Mission {mission_id} already completed by {user_id}")]
    DuplicateSubmission { user_id: String, mission_id: String },

    #[error("Timed out while {0}")]
    Timeout(VerificationStage),

    /// A registry or profile read failed before anything was written
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl VerifyError {
    /// Stable name reported as `errorKind`
    pub fn kind(&self) -> &'static str {
        match self {
            VerifyError::InvalidRequest(_) => "InvalidRequest",
            VerifyError::MissionNotFound(_) => "MissionNotFound",
            VerifyError::ProfileNotFound(_) => "ProfileNotFound",
            VerifyError::EvidenceUploadFailed(_) => "EvidenceUploadFailed",
            VerifyError::JudgeUnavailable(_) => "JudgeUnavailable",
            VerifyError::LedgerWriteFailed(_) => "LedgerWriteFailed",
            VerifyError::CreditApplicationFailed { .. } => "CreditApplicationFailed",
            VerifyError::DuplicateSubmission { .. } => "DuplicateSubmission",
            VerifyError::Timeout(_) => "Timeout",
            VerifyError::StorageUnavailable(_) => "StorageUnavailable",
        }
    }

    /// Whether resubmitting the same request may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VerifyError::EvidenceUploadFailed(_)
                | VerifyError::JudgeUnavailable(_)
                | VerifyError::LedgerWriteFailed(_)
                | VerifyError::Timeout(_)
                | VerifyError::StorageUnavailable(_)
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            VerifyError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            VerifyError::MissionNotFound(_) | VerifyError::ProfileNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            VerifyError::DuplicateSubmission { .. } => StatusCode::CONFLICT,
            VerifyError::EvidenceUploadFailed(_) => StatusCode::BAD_GATEWAY,
            VerifyError::JudgeUnavailable(_)
            | VerifyError::LedgerWriteFailed(_)
            | VerifyError::Timeout(_)
            | VerifyError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            VerifyError::CreditApplicationFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// ============================================================================
// API ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: &'static str,
    pub error: String,
    pub code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        // Internal details stay in the logs
        let message = match &self {
            ApiError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorBody {
            status: "error",
            error: message,
            code,
        };
        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_are_stable() {
        assert_eq!(
            VerifyError::MissionNotFound("m1".into()).kind(),
            "MissionNotFound"
        );
        assert_eq!(
            VerifyError::CreditApplicationFailed {
                entry_id: Uuid::nil(),
                message: "gone".into()
            }
            .kind(),
            "CreditApplicationFailed"
        );
        assert_eq!(VerifyError::Timeout(VerificationStage::Judging).kind(), "Timeout");
    }

    #[test]
    fn test_retryable_split() {
        assert!(VerifyError::JudgeUnavailable("down".into()).is_retryable());
        assert!(VerifyError::LedgerWriteFailed("io".into()).is_retryable());
        assert!(!VerifyError::InvalidRequest("missing".into()).is_retryable());
        assert!(!VerifyError::MissionNotFound("x".into()).is_retryable());
        assert!(!VerifyError::DuplicateSubmission {
            user_id: "u1".into(),
            mission_id: "m1".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            VerifyError::InvalidRequest(String::new()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            VerifyError::ProfileNotFound("u".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            VerifyError::Timeout(VerificationStage::RecordingLedger).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
