//! Chat Messages
//!
//! Identifiers and the message record shown in a conversation.
//!
//! # Design Philosophy
//!
//! Messages are immutable once published. The conversation list holds them
//! behind `Arc`, and a streaming update swaps in a new record for one
//! identifier while every other record stays pointer-identical. Observers can
//! therefore diff snapshots cheaply with `Arc::ptr_eq`.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique message identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    /// Generate a new unique message ID
    #[must_use]
    pub fn new() -> Self {
        Self(format!("msg-{}", Uuid::new_v4()))
    }

    /// Borrow the raw identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Conversation session identifier, issued by the backend
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Wrap a backend-issued identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who authored a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Message typed (or scanned) by the user
    User,
    /// Reply or notice from the assistant
    Assistant,
}

impl MessageRole {
    /// Map a backend role string. Anything other than `"user"` is the assistant.
    #[must_use]
    pub fn from_wire(role: &str) -> Self {
        if role.eq_ignore_ascii_case("user") {
            Self::User
        } else {
            Self::Assistant
        }
    }
}

/// A message in the conversation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique message ID
    pub id: MessageId,
    /// Who sent this message
    pub role: MessageRole,
    /// Message content (replaced wholesale while a reply streams)
    pub content: String,
    /// When the message was created (Unix timestamp ms)
    pub timestamp: u64,
}

impl ChatMessage {
    /// Create a new message
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role,
            content: content.into(),
            timestamp: now_ms(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Create the empty assistant message a streamed reply is written into
    #[must_use]
    pub fn placeholder() -> Self {
        Self::new(MessageRole::Assistant, String::new())
    }

    /// Copy of this message with different content and the same identity
    #[must_use]
    pub fn with_content(&self, content: String) -> Self {
        Self {
            id: self.id.clone(),
            role: self.role,
            content,
            timestamp: self.timestamp,
        }
    }

    /// Whether the user wrote this message
    #[must_use]
    pub fn is_user(&self) -> bool {
        self.role == MessageRole::User
    }
}

/// Published snapshot of a conversation
///
/// The outer `Arc` makes snapshots cheap to hand out; every write builds a
/// fresh vector rather than mutating one an observer may hold.
pub type MessageList = Arc<Vec<Arc<ChatMessage>>>;

/// Get current time in milliseconds since epoch
pub(crate) fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
