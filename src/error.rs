use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::models::SourceRole;

#[derive(Debug, thiserror::Error)]
pub enum CohortError {
    #[error("Source not found: {0}")]
    SourceNotFound(i64),

    #[error("No schema registered for source {source_id} and role {role}")]
    SchemaNotFound { source_id: i64, role: SourceRole },

    #[error("Concept not found: {0}")]
    ConceptNotFound(i64),

    #[error("error: concept type not supported for concept {concept_id} (class '{concept_class}')")]
    UnsupportedConceptType {
        concept_id: i64,
        concept_class: String,
    },

    #[error("No observations found for concept ids {0:?}")]
    NoObservations(Vec<i64>),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Query timed out after {0:?}")]
    Timeout(Duration),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl CohortError {
    /// True when the request itself was unusable (bad ids, unknown concepts,
    /// misuse), false when the system could not complete a valid request.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            CohortError::SourceNotFound(_)
                | CohortError::SchemaNotFound { .. }
                | CohortError::ConceptNotFound(_)
                | CohortError::UnsupportedConceptType { .. }
                | CohortError::NoObservations(_)
                | CohortError::InvalidArgument(_)
        )
    }
}

impl IntoResponse for CohortError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            CohortError::SourceNotFound(_)
            | CohortError::SchemaNotFound { .. }
            | CohortError::ConceptNotFound(_) => {
                (StatusCode::NOT_FOUND, "not-found", self.to_string())
            }
            CohortError::UnsupportedConceptType { .. }
            | CohortError::NoObservations(_)
            | CohortError::InvalidArgument(_) => {
                (StatusCode::BAD_REQUEST, "invalid", self.to_string())
            }
            CohortError::Timeout(_) => (
                StatusCode::GATEWAY_TIMEOUT,
                "timeout",
                self.to_string(),
            ),
            CohortError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "exception",
                "Database error occurred".to_string(),
            ),
            CohortError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "exception",
                "Internal server error".to_string(),
            ),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        (status, Json(json!({ "code": code, "message": message }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, CohortError>;
