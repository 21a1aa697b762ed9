use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error as ThisError;

use crate::api::models::upload::UploadResponse;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Shared secret missing or not matching
    #[error("Not authenticated")]
    Unauthenticated,

    /// File path chosen but no `file` part supplied
    #[error("No file part in upload")]
    MissingFile,

    /// Filename extension outside the allow-list
    #[error("Extension {extension:?} is not allowed")]
    UnsupportedExtension { extension: String },

    /// Payload larger than the configured ceiling
    #[error("Payload exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: u64 },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthenticated => StatusCode::UNAUTHORIZED,
            Error::MissingFile => StatusCode::BAD_REQUEST,
            Error::UnsupportedExtension { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Internal { .. } | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the `err` string clients see, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Unauthenticated => "bad token".to_string(),
            Error::MissingFile => "no file".to_string(),
            Error::UnsupportedExtension { .. } => "bad ext".to_string(),
            Error::PayloadTooLarge { .. } => "file too large".to_string(),
            Error::Internal { .. } | Error::Other(_) => "internal error".to_string(),
        }
    }

    fn outcome_label(&self) -> &'static str {
        match self {
            Error::Unauthenticated => "unauthenticated",
            Error::MissingFile => "missing_file",
            Error::UnsupportedExtension { .. } => "unsupported_extension",
            Error::PayloadTooLarge { .. } => "too_large",
            Error::Internal { .. } | Error::Other(_) => "internal_error",
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Unauthenticated => {
                tracing::info!("Authorization error: {}", self);
            }
            Error::MissingFile | Error::UnsupportedExtension { .. } | Error::PayloadTooLarge { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        metrics::counter!("relay_uploads_total", "outcome" => self.outcome_label()).increment(1);

        (self.status_code(), Json(UploadResponse::failed(self.user_message()))).into_response()
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
