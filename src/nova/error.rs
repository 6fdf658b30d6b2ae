//! Error types for the Nova-compatible compute client.

use thiserror::Error;

use crate::compute::SpecError;

/// Errors raised by the Nova-compatible compute client.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum NovaComputeError {
    /// Raised when the client configuration is incomplete.
    #[error("configuration error: {0}")]
    Config(String),
    /// Raised when the creation request fails validation.
    #[error("invalid server spec: {0}")]
    Spec(#[from] SpecError),
    /// Raised when the request never reached the API.
    #[error("transport error: {message}")]
    Transport {
        /// Message reported by the HTTP client.
        message: String,
    },
    /// Raised when the API rejects a request.
    #[error("compute API returned {status}: {message}")]
    Api {
        /// HTTP status code of the response.
        status: u16,
        /// Response body, as text.
        message: String,
    },
    /// Raised when a successful response cannot be decoded.
    #[error("failed to decode compute API response: {message}")]
    Decode {
        /// Underlying decoding error message.
        message: String,
    },
}

impl From<reqwest::Error> for NovaComputeError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport {
            message: value.to_string(),
        }
    }
}
