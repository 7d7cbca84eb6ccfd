//! Error types for the secrets gateway
//!
//! Every failure a handler can produce maps onto one of these variants, and
//! every variant maps onto exactly one HTTP status. Remote failures from the
//! Kubernetes API are classified in one place, [`Error::from_kube`].

use axum::extract::rejection::BytesRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::debug;

/// Result type for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for gateway operations
///
/// The display string of each variant is the message returned to the
/// caller, so it must never carry internal object representations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or unusable identity headers
    #[error("{0}")]
    Unauthorized(String),

    /// No owned namespace, cross-namespace access, or a platform denial
    #[error("{0}")]
    Forbidden(String),

    /// Malformed payload, disallowed type, bad encoding
    #[error("{0}")]
    Validation(String),

    /// Absent object, or an object this gateway does not manage
    #[error("{0}")]
    NotFound(String),

    /// Remote object already exists or changed underneath the caller
    #[error("{0}")]
    Conflict(String),

    /// Route exists but not for this method
    #[error("method not allowed")]
    MethodNotAllowed,

    /// Request body over the configured limit
    #[error("{0}")]
    PayloadTooLarge(String),

    /// Any other remote or local failure
    #[error("{context}: {message}")]
    Backend {
        /// What the gateway was trying to do
        context: String,
        /// Short description of the cause
        message: String,
    },
}

/// JSON body of every error response
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Human readable message
    pub error: String,
}

impl Error {
    /// The message used when an object is absent or unmanaged.
    ///
    /// Both cases share it so that callers cannot tell them apart.
    pub fn not_found() -> Self {
        Error::NotFound("not found".into())
    }

    /// Cross-namespace rejection
    pub fn cross_namespace() -> Self {
        Error::Forbidden("cross-namespace access is not allowed".into())
    }

    /// Create a backend error with context
    pub fn backend(context: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Backend {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Classify a Kubernetes client error into the gateway taxonomy.
    ///
    /// `fallback` names the operation and prefixes the message of anything
    /// that does not map onto a more specific variant.
    pub fn from_kube(err: kube::Error, fallback: &str) -> Self {
        debug!(error = %err, operation = fallback, "Mapping Kubernetes error");
        match err {
            kube::Error::Api(resp) => match resp.code {
                401 => Error::Unauthorized("unauthorized".into()),
                403 => Error::Forbidden("forbidden".into()),
                404 => Error::not_found(),
                409 if resp.reason == "AlreadyExists" => Error::Conflict("already exists".into()),
                409 => Error::Conflict("conflict".into()),
                422 => Error::Validation(resp.message),
                _ => Error::backend(fallback, resp.message),
            },
            other => Error::backend(fallback, other.to_string()),
        }
    }

    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Error::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Backend { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, axum::Json(body)).into_response()
    }
}

impl From<BytesRejection> for Error {
    fn from(rejection: BytesRejection) -> Self {
        debug!(error = %rejection, "Rejected request body");
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Error::PayloadTooLarge("request body too large".into())
        } else {
            Error::Validation("failed to read request body".into())
        }
    }
}
