//! Assistant Backend Traits
//!
//! Trait definition and wire types for the remote assistant service. The chat
//! service and session manager only talk to the backend through
//! [`AssistantApi`], so tests can script a backend without a network.
//!
//! # Design Philosophy
//!
//! The trait hands back raw material: an unparsed byte stream for chat replies
//! and decoded DTOs for everything else. Decoding the reply text, reconciling
//! message state and mapping failures to user notices all happen above this
//! layer.

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::stream::BoxStream;
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ApiError;
use crate::messages::{ChatMessage, MessageId, MessageRole, SessionId};

/// Raw body of a streamed chat reply
pub type ByteStream = BoxStream<'static, std::io::Result<Vec<u8>>>;

// ============================================
// Requests
// ============================================

/// Body of a streamed chat call
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// Conversation the message belongs to
    pub session_id: SessionId,
    /// Prompt text sent to the assistant
    pub message: String,
    /// Owning user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl ChatRequest {
    /// Create a request for a session
    pub fn new(session_id: SessionId, message: impl Into<String>) -> Self {
        Self {
            session_id,
            message: message.into(),
            user_id: None,
        }
    }

    /// Set the owning user
    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// Body of a session creation call
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    /// Owning user
    pub user_id: String,
    /// Conversation title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Optional first message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CreateSessionRequest {
    /// Create a request for a user
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            title: None,
            message: None,
        }
    }

    /// Set the conversation title
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

// ============================================
// Responses
// ============================================

/// Standard response wrapper used by every non-streaming endpoint
#[derive(Clone, Debug, Deserialize)]
pub struct Envelope<T> {
    /// Whether the server accepted the request
    pub success: bool,
    /// Payload, absent on failure and for acknowledgements
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    /// Server-provided explanation
    #[serde(default)]
    pub message: Option<String>,
}

impl<T> Envelope<T> {
    /// Unwrap the payload, treating `success: false` as a rejection
    ///
    /// # Errors
    ///
    /// `Rejected` when the server reported failure, `Decode` when a successful
    /// envelope has no payload.
    pub fn into_data(self) -> Result<T, ApiError> {
        if !self.success {
            return Err(ApiError::Rejected {
                message: self.message,
            });
        }
        self.data
            .ok_or_else(|| ApiError::Decode("response envelope has no data".to_string()))
    }

    /// Check an acknowledgement that carries no payload
    ///
    /// # Errors
    ///
    /// `Rejected` when the server reported failure.
    pub fn into_ack(self) -> Result<(), ApiError> {
        if self.success {
            Ok(())
        } else {
            Err(ApiError::Rejected {
                message: self.message,
            })
        }
    }
}

/// Newly created conversation session
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Backend-issued identifier
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Conversation title
    #[serde(default)]
    pub title: Option<String>,
    /// Creation time (Unix ms)
    #[serde(default)]
    pub created_at: Option<i64>,
}

/// Conversation as listed by the backend
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    /// Conversation identifier
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Conversation title
    #[serde(default)]
    pub title: String,
    /// Preview of the latest message
    #[serde(default)]
    pub last_message: Option<String>,
    /// Number of messages
    #[serde(default)]
    pub message_count: u32,
    /// Creation time (Unix ms)
    #[serde(default)]
    pub created_at: Option<i64>,
    /// Last update time (Unix ms)
    #[serde(default)]
    pub updated_at: Option<i64>,
}

/// Stored message of a conversation
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDto {
    /// Message identifier
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Message text
    #[serde(default)]
    pub content: String,
    /// `"user"` or anything else for the assistant
    #[serde(default)]
    pub role: String,
    /// Creation time (Unix ms)
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl From<MessageDto> for ChatMessage {
    fn from(dto: MessageDto) -> Self {
        let mut message = ChatMessage::new(MessageRole::from_wire(&dto.role), dto.content);
        message.id = MessageId(dto.id);
        if let Some(timestamp) = dto.timestamp.and_then(|t| u64::try_from(t).ok()) {
            message.timestamp = timestamp;
        }
        message
    }
}

/// Schedule as stored by the backend
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleDto {
    /// Server identifier, may be blank
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    /// Schedule title
    #[serde(default)]
    pub title: String,
    /// Date as `YYYY-MM-DD`
    pub date: String,
    /// Time as `HH:mm:ss` or `HH:mm`, may be blank
    #[serde(default)]
    pub time: String,
    /// Where it happens
    #[serde(default)]
    pub location: Option<String>,
    /// Free-form notes
    #[serde(default)]
    pub description: Option<String>,
}

/// Accept identifiers the backend sends either as strings or as numbers
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Null => Ok(String::new()),
        other => Err(de::Error::custom(format!(
            "expected string or number identifier, got {other}"
        ))),
    }
}

/// Decode an envelope from a response body
///
/// # Errors
///
/// `Decode` for malformed JSON, otherwise whatever [`Envelope::into_data`] reports.
pub fn decode_envelope<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    let envelope: Envelope<T> =
        serde_json::from_slice(body).map_err(|e| ApiError::Decode(e.to_string()))?;
    envelope.into_data()
}

// ============================================
// Backend Trait
// ============================================

/// Remote assistant service
///
/// Implement this trait to point the chat core at a different transport.
#[async_trait]
pub trait AssistantApi: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Create a new conversation session
    async fn create_session(&self, request: &CreateSessionRequest)
        -> Result<SessionInfo, ApiError>;

    /// Send a chat message and return the streamed reply body
    ///
    /// Non-2xx responses are reported as [`ApiError::Http`] before any body
    /// is read.
    async fn open_chat_stream(&self, request: &ChatRequest) -> Result<ByteStream, ApiError>;

    /// List a user's conversations
    async fn list_conversations(&self, user_id: &str)
        -> Result<Vec<ConversationSummary>, ApiError>;

    /// Fetch the stored messages of a conversation
    async fn conversation_messages(&self, conversation_id: &str)
        -> Result<Vec<MessageDto>, ApiError>;

    /// Delete a conversation
    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ApiError>;

    /// List all schedules of a user
    async fn list_schedules(&self, user_id: &str) -> Result<Vec<ScheduleDto>, ApiError>;

    /// List a user's schedules between two dates, inclusive
    async fn schedules_in_range(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ScheduleDto>, ApiError>;
}
