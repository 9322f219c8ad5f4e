//! Assistant Backend Integration
//!
//! Abstracted access to the remote assistant service through a common trait.
//!
//! # Available Backends
//!
//! - **HTTP**: the REST service the mobile and desktop clients talk to
//!
//! # Usage
//!
//! ```ignore
//! use assistant_core::backend::{AssistantApi, ChatRequest, HttpAssistantApi};
//!
//! let api = HttpAssistantApi::from_config(&config)?;
//! let body = api.open_chat_stream(&ChatRequest::new(session_id, "Hello!")).await?;
//! ```

mod http;
mod traits;

pub use http::{ApiTimeouts, HttpAssistantApi};
pub use traits::{
    decode_envelope, AssistantApi, ByteStream, ChatRequest, ConversationSummary,
    CreateSessionRequest, Envelope, MessageDto, ScheduleDto, SessionInfo,
};
