use crate::db::errors::DbError;
use crate::platform::PlatformError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error as ThisError;

use crate::api::envelope;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Malformed or invalid request data
    #[error("{message}")]
    Validation { message: String },

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// Resource store failure
    #[error(transparent)]
    Database(#[from] DbError),

    /// Platform backend failure
    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// An app was recorded but its platform instance and record disagree.
    ///
    /// `platform_failed` distinguishes "the platform refused" from "the platform succeeded
    /// but the record could not be updated".
    #[error("App {short_name} was not fully provisioned: {reason}")]
    PartialProvisioning {
        short_name: String,
        reason: String,
        platform_failed: bool,
    },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },
}

impl Error {
    /// Shorthand for the error returned whenever a request body cannot be decoded
    pub fn invalid_json() -> Self {
        Error::Validation {
            message: "Invalid JSON".to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            // Every store failure is a server error, constraint violations included
            Error::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Platform(platform_err) => match platform_err {
                PlatformError::ConnectionLost => StatusCode::SERVICE_UNAVAILABLE,
                PlatformError::Timeout => StatusCode::GATEWAY_TIMEOUT,
                PlatformError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
                PlatformError::Connect { .. }
                | PlatformError::Handshake(_)
                | PlatformError::CommandFailed { .. }
                | PlatformError::Protocol(_) => StatusCode::BAD_GATEWAY,
            },
            Error::PartialProvisioning { platform_failed, .. } => {
                if *platform_failed {
                    StatusCode::BAD_GATEWAY
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            }
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message placed in the error envelope
    pub fn user_message(&self) -> String {
        match self {
            Error::Internal { .. } => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Database(DbError::Other(_)) | Error::Internal { .. } | Error::PartialProvisioning { .. } => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Database(_) => {
                tracing::warn!("Database constraint error: {}", self);
            }
            Error::Platform(_) => {
                tracing::warn!("Platform error: {}", self);
            }
            Error::Validation { .. } | Error::NotFound { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        (self.status_code(), Json(envelope::error(self.user_message()))).into_response()
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
