//! Error kinds shared across the relay.
//!
//! Each layer owns its error enum; the HTTP gateway is the only place errors
//! are turned into responses (see [`GatewayError`]).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// A provider cannot be used as configured.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("unknown provider '{0}'")]
    UnknownProvider(String),

    #[error("provider '{provider}' has no credential (set {env_var})")]
    MissingCredential { provider: String, env_var: String },
}

/// A call to a remote model failed.
#[derive(Debug, Error)]
pub enum ModelInvocationError {
    /// HTTP request failed
    #[error("http request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Provider returned an error response
    #[error("provider error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Provider sent something that is not a chat completion chunk
    #[error("malformed provider response: {0}")]
    Malformed(String),

    /// Stream broke off for a reason other than a transport error
    #[error("stream failed: {0}")]
    Stream(String),
}

/// A request body does not conform to the query contract.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("query must not be empty")]
    EmptyQuery,

    #[error("thread_id must not be empty")]
    EmptyThreadId,

    #[error("{message}")]
    Body { status: u16, message: String },
}

impl ValidationError {
    fn status(&self) -> StatusCode {
        match self {
            ValidationError::EmptyQuery | ValidationError::EmptyThreadId => {
                StatusCode::BAD_REQUEST
            }
            ValidationError::Body { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_REQUEST)
            }
        }
    }
}

/// Failure of a chat turn before its first fragment.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    ModelInvocation(#[from] ModelInvocationError),
}

/// Everything the HTTP gateway can answer with instead of a stream.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Chat(#[from] ChatError),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self {
            GatewayError::Validation(e) => e.status(),
            GatewayError::Chat(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
