//! User-facing notices
//!
//! Fixed texts written into the conversation and the presentation of
//! [`ChatError`] for display.

use crate::error::ChatError;

/// Reply content when the stream ended without any text
pub const EMPTY_REPLY_NOTICE: &str =
    "Sorry, the assistant service is temporarily unavailable, please retry later.";

/// Reply content when the stream failed before any text arrived
pub const CONNECTION_FAILED_NOTICE: &str =
    "Sorry, the connection to the assistant service failed, please retry later.";

/// Appended to a partial reply when the stream failed
pub const TRUNCATION_MARKER: &str = "\n\n[connection interrupted]";

/// Reply content when the send was cancelled before any text arrived
pub const CANCELLED_NOTICE: &str = "Reply cancelled.";

/// Appended to a partial reply when the send was cancelled
pub const CANCELLED_MARKER: &str = "\n\n[cancelled]";

/// Transient assistant message shown while an image is being recognized
pub const RECOGNIZING_NOTICE: &str = "Recognizing image text...";

/// Render an error for display to the user
///
/// HTTP failures always include the status code.
#[must_use]
pub fn user_notice(error: &ChatError) -> String {
    match error {
        ChatError::SessionCreationFailed { reason } => {
            format!("Could not start a conversation: {reason}")
        }
        ChatError::StreamIo { reason, .. } => {
            format!("The assistant connection was interrupted: {reason}")
        }
        ChatError::Http { status, .. } => format!("Send failed: HTTP {status}"),
        ChatError::EmptyResponse => EMPTY_REPLY_NOTICE.to_string(),
        ChatError::Cancelled => CANCELLED_NOTICE.to_string(),
        ChatError::SendInProgress { .. } => {
            "Please wait for the current reply to finish.".to_string()
        }
        ChatError::Network { reason } => format!("Network error: {reason}"),
        ChatError::Rejected { reason } => format!("Request rejected: {reason}"),
        ChatError::Recognition { reason } => format!("Recognition failed: {reason}"),
        ChatError::Internal { reason } => format!("Something went wrong: {reason}"),
    }
}
