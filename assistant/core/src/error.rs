//! Error Types
//!
//! `ApiError` describes what went wrong talking to the backend. `ChatError`
//! is what a send (or a session operation) reports on the error channel.
//! Neither carries user-facing prose; see [`crate::notice`] for that.

use thiserror::Error;

use crate::messages::SessionId;

/// Longest HTTP error body kept in a [`ChatError::Http`]
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Failure of a single backend call
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server answered with a non-2xx status
    #[error("server returned HTTP {status}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body, possibly empty
        body: String,
    },

    /// The response envelope reported `success: false`
    #[error("server rejected the request: {}", .message.as_deref().unwrap_or("no reason given"))]
    Rejected {
        /// Server-provided explanation
        message: Option<String>,
    },

    /// Connection, timeout or body transfer failure
    #[error("transport failure: {0}")]
    Transport(String),

    /// The response could not be decoded
    #[error("malformed response: {0}")]
    Decode(String),

    /// The endpoint URL could not be built from the configured base
    #[error("invalid endpoint URL: {0}")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Error reported by chat and session operations
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ChatError {
    /// No conversation could be created for the send
    #[error("session creation failed: {reason}")]
    SessionCreationFailed {
        /// Underlying failure
        reason: String,
    },

    /// The reply stream broke after it was opened
    #[error("reply stream interrupted after {received_chars} characters: {reason}")]
    StreamIo {
        /// Characters received before the failure
        received_chars: usize,
        /// Underlying I/O failure
        reason: String,
    },

    /// The server answered with a non-2xx status
    #[error("HTTP {status}{}", .message.as_ref().map(|m| format!(": {m}")).unwrap_or_default())]
    Http {
        /// HTTP status code
        status: u16,
        /// Trimmed response body, if any
        message: Option<String>,
    },

    /// The reply stream ended without any text
    #[error("the assistant returned an empty reply")]
    EmptyResponse,

    /// The send was cancelled by the caller
    #[error("send cancelled")]
    Cancelled,

    /// Another reply is still streaming for the same session
    #[error("a reply is already streaming for session {session}")]
    SendInProgress {
        /// Session that is busy
        session: SessionId,
    },

    /// Connection or protocol failure outside a stream
    #[error("network error: {reason}")]
    Network {
        /// Underlying failure
        reason: String,
    },

    /// The server refused the request in its response envelope
    #[error("request rejected: {reason}")]
    Rejected {
        /// Server-provided explanation
        reason: String,
    },

    /// Image text recognition failed or found nothing
    #[error("text recognition failed: {reason}")]
    Recognition {
        /// Why recognition produced no text
        reason: String,
    },

    /// A send task ended abnormally
    #[error("internal error: {reason}")]
    Internal {
        /// Panic or join failure description
        reason: String,
    },
}

impl From<ApiError> for ChatError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Http { status, body } => {
                let body = body.trim();
                let message = (!body.is_empty())
                    .then(|| body.chars().take(MAX_ERROR_BODY_CHARS).collect::<String>());
                Self::Http { status, message }
            }
            ApiError::Rejected { message } => Self::Rejected {
                reason: message.unwrap_or_else(|| "no reason given".to_string()),
            },
            ApiError::Transport(reason) | ApiError::InvalidUrl(reason) => Self::Network { reason },
            ApiError::Decode(reason) => Self::Network {
                reason: format!("malformed response: {reason}"),
            },
        }
    }
}
