//! HTTP Backend Implementation
//!
//! [`AssistantApi`] over the assistant service's REST endpoints.
//!
//! # Endpoints
//!
//! - `POST api/ai/chat` - streamed chat reply (plain text, chunked)
//! - `POST api/ai/chat/new` - create a conversation session
//! - `GET api/conversation/list/{userId}` - list conversations
//! - `GET api/conversation/messages/{id}` - conversation history
//! - `DELETE api/conversation/delete/{id}` - delete a conversation
//! - `GET api/schedule/list/{userId}` - list schedules
//! - `GET api/schedule/range` - schedules between two dates
//!
//! Every endpoint but the chat stream answers with an [`Envelope`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::StreamExt;
use reqwest::Url;
use serde::de::DeserializeOwned;

use super::traits::{
    decode_envelope, AssistantApi, ByteStream, ChatRequest, ConversationSummary,
    CreateSessionRequest, Envelope, MessageDto, ScheduleDto, SessionInfo,
};
use crate::config::AssistantConfig;
use crate::error::ApiError;

/// Connection timing for the HTTP client
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ApiTimeouts {
    /// Time allowed to establish a connection
    pub connect: Duration,
    /// Longest silence allowed between reads (covers slow token generation)
    pub read: Duration,
    /// Total time allowed for a non-streaming call
    pub request: Duration,
}

impl Default for ApiTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            read: Duration::from_secs(300),
            request: Duration::from_secs(30),
        }
    }
}

/// Assistant service client
#[derive(Clone, Debug)]
pub struct HttpAssistantApi {
    /// Base URL, always ending in `/`
    base_url: Url,
    /// HTTP client
    http_client: reqwest::Client,
    /// Total timeout for non-streaming calls
    request_timeout: Duration,
}

impl HttpAssistantApi {
    /// Create a client for a base URL
    ///
    /// # Errors
    ///
    /// `InvalidUrl` for an unparseable base URL, `Transport` if the HTTP
    /// client cannot be built.
    pub fn new(base_url: &str, timeouts: ApiTimeouts) -> Result<Self, ApiError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(timeouts.connect)
            .read_timeout(timeouts.read)
            .build()?;
        Self::with_client(base_url, http_client, timeouts.request)
    }

    /// Create a client around a preconfigured `reqwest::Client`
    ///
    /// # Errors
    ///
    /// `InvalidUrl` for an unparseable base URL.
    pub fn with_client(
        base_url: &str,
        http_client: reqwest::Client,
        request_timeout: Duration,
    ) -> Result<Self, ApiError> {
        let mut normalized = base_url.trim().to_string();
        if !normalized.ends_with('/') {
            normalized.push('/');
        }
        let base_url =
            Url::parse(&normalized).map_err(|e| ApiError::InvalidUrl(format!("{base_url}: {e}")))?;
        Ok(Self {
            base_url,
            http_client,
            request_timeout,
        })
    }

    /// Create from the loaded configuration
    ///
    /// # Errors
    ///
    /// Same as [`HttpAssistantApi::new`].
    pub fn from_config(config: &AssistantConfig) -> Result<Self, ApiError> {
        Self::new(&config.base_url, config.timeouts())
    }

    /// The normalized base URL
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Resolve a path below the base URL
    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path)
            .map_err(|e| ApiError::InvalidUrl(format!("{path}: {e}")))
    }

    /// Resolve a path with one identifier segment, percent-encoding the id
    fn endpoint_with_id(&self, path: &str, id: &str) -> Result<Url, ApiError> {
        let mut url = self.endpoint(path)?;
        url.path_segments_mut()
            .map_err(|()| ApiError::InvalidUrl(format!("{path}: base URL cannot hold a path")))?
            .pop_if_empty()
            .push(id);
        Ok(url)
    }

    /// Execute a non-streaming request and unwrap its envelope
    async fn fetch<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ApiError> {
        let body = self.execute(request).await?;
        decode_envelope(&body)
    }

    /// Execute a non-streaming request and return the raw body of a 2xx response
    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<Vec<u8>, ApiError> {
        let response = request.timeout(self.request_timeout).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl AssistantApi for HttpAssistantApi {
    fn name(&self) -> &str {
        "HTTP"
    }

    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<SessionInfo, ApiError> {
        let url = self.endpoint("api/ai/chat/new")?;
        self.fetch(self.http_client.post(url).json(request)).await
    }

    async fn open_chat_stream(&self, request: &ChatRequest) -> Result<ByteStream, ApiError> {
        let url = self.endpoint("api/ai/chat")?;

        // No total timeout here: a reply may stream for minutes. The client's
        // read timeout still bounds every silent gap.
        let response = self.http_client.post(url).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), session = %request.session_id, "Chat stream rejected");
            return Err(ApiError::Http {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(session = %request.session_id, "Chat stream opened");

        Ok(response
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(std::io::Error::other)
            })
            .boxed())
    }

    async fn list_conversations(
        &self,
        user_id: &str,
    ) -> Result<Vec<ConversationSummary>, ApiError> {
        let url = self.endpoint_with_id("api/conversation/list/", user_id)?;
        self.fetch(self.http_client.get(url)).await
    }

    async fn conversation_messages(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<MessageDto>, ApiError> {
        let url = self.endpoint_with_id("api/conversation/messages/", conversation_id)?;
        self.fetch(self.http_client.get(url)).await
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ApiError> {
        let url = self.endpoint_with_id("api/conversation/delete/", conversation_id)?;
        let body = self.execute(self.http_client.delete(url)).await?;
        let envelope: Envelope<serde_json::Value> =
            serde_json::from_slice(&body).map_err(|e| ApiError::Decode(e.to_string()))?;
        envelope.into_ack()
    }

    async fn list_schedules(&self, user_id: &str) -> Result<Vec<ScheduleDto>, ApiError> {
        let url = self.endpoint_with_id("api/schedule/list/", user_id)?;
        self.fetch(self.http_client.get(url)).await
    }

    async fn schedules_in_range(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ScheduleDto>, ApiError> {
        let url = self.endpoint("api/schedule/range")?;
        let query = [
            ("userId", user_id.to_string()),
            ("startDate", start.format("%Y-%m-%d").to_string()),
            ("endDate", end.format("%Y-%m-%d").to_string()),
        ];
        self.fetch(self.http_client.get(url).query(&query)).await
    }
}
