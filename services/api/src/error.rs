//! services/api/src/error.rs
//!
//! Defines the error types for the API service: `StudyError` for the study
//! services and `ApiError`, the single place where errors become HTTP responses.

use crate::config::ConfigError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use study_core::ports::PortError;
use tracing::error;

/// Errors raised by the generation pipeline, the flashcard cache and the progress aggregator.
#[derive(Debug, thiserror::Error)]
pub enum StudyError {
    /// Bad input shape or an ownership mismatch. Nothing has been written.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    /// The document could not be turned into page text.
    #[error("Text extraction failed: {0}")]
    Extraction(String),

    #[error("No text could be extracted from the document")]
    NoExtractableText,

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Generation service returned malformed output: {0}")]
    MalformedOutput(String),

    #[error("The generation service produced no items for this document")]
    GenerationEmpty,

    /// A persistence failure or any other unexpected port error.
    #[error("Service Port Error: {0}")]
    Port(PortError),
}

impl From<PortError> for StudyError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound(what) => StudyError::NotFound(what),
            PortError::UnsupportedFormat(what) => StudyError::UnsupportedFormat(what),
            PortError::ExtractionFailed(what) => StudyError::Extraction(what),
            PortError::MalformedOutput(what) => StudyError::MalformedOutput(what),
            other => StudyError::Port(other),
        }
    }
}

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error raised by one of the study services.
    #[error(transparent)]
    Study(#[from] StudyError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents an error while applying the embedded migrations.
    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The request was malformed before it reached a study service.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Study(study) => match study {
                StudyError::Validation(_) => StatusCode::BAD_REQUEST,
                StudyError::NotFound(_) => StatusCode::NOT_FOUND,
                StudyError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                StudyError::Extraction(_) | StudyError::NoExtractableText => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                StudyError::Generation(_)
                | StudyError::MalformedOutput(_)
                | StudyError::GenerationEmpty => StatusCode::BAD_GATEWAY,
                StudyError::Port(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Port(PortError::NotFound(_)) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status.is_server_error() {
            error!("Request failed: {:?}", self);
            // Internal details stay in the logs.
            match &self {
                ApiError::Study(study) if status == StatusCode::BAD_GATEWAY => study.to_string(),
                _ => "Internal server error".to_string(),
            }
        } else {
            self.to_string()
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn study_errors_map_to_distinct_status_codes() {
        let cases = [
            (StudyError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (StudyError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (StudyError::UnsupportedFormat("x".into()), StatusCode::UNSUPPORTED_MEDIA_TYPE),
            (StudyError::Extraction("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (StudyError::NoExtractableText, StatusCode::UNPROCESSABLE_ENTITY),
            (StudyError::Generation("x".into()), StatusCode::BAD_GATEWAY),
            (StudyError::MalformedOutput("x".into()), StatusCode::BAD_GATEWAY),
            (StudyError::GenerationEmpty, StatusCode::BAD_GATEWAY),
            (
                StudyError::Port(PortError::Unexpected("db down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status_code(), expected);
        }
    }

    #[test]
    fn port_errors_are_tagged_when_converted() {
        assert!(matches!(
            StudyError::from(PortError::NotFound("doc".into())),
            StudyError::NotFound(_)
        ));
        assert!(matches!(
            StudyError::from(PortError::ExtractionFailed("bad pdf".into())),
            StudyError::Extraction(_)
        ));
        assert!(matches!(
            StudyError::from(PortError::Unexpected("boom".into())),
            StudyError::Port(_)
        ));
    }

    #[test]
    fn adapter_errors_never_answer_401() {
        // 401 belongs to the identity middleware alone.
        let errors = || {
            [
                PortError::NotFound("doc".into()),
                PortError::Unexpected("boom".into()),
                PortError::UnsupportedFormat("docx".into()),
                PortError::ExtractionFailed("bad pdf".into()),
                PortError::MalformedOutput("prose".into()),
            ]
        };
        for err in errors() {
            assert_ne!(ApiError::Port(err).status_code(), StatusCode::UNAUTHORIZED);
        }
        for err in errors() {
            assert_ne!(ApiError::from(StudyError::from(err)).status_code(), StatusCode::UNAUTHORIZED);
        }
    }
}
