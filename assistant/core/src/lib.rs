//! Assistant Core - Headless Chat & Scheduling for QuickPlan
//!
//! This crate provides the client-side core of the QuickPlan assistant,
//! independent of any UI framework. A mobile app, a desktop shell or the
//! bundled command-line client render what it publishes.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         UI Surfaces                               │
//! │     (subscribe to ChatState / AppState watch channels)           │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 │ send / cancel / load / delete
//! ┌───────────────────────────────┼──────────────────────────────────┐
//! │                       ASSISTANT CORE                              │
//! │  ┌────────────────────────────┴───────────────────────────────┐  │
//! │  │                      ChatService                            │  │
//! │  │  ┌──────────────┐  ┌────────────────┐  ┌─────────────────┐ │  │
//! │  │  │   Session    │  │ FragmentReader │  │    Message      │ │  │
//! │  │  │   Manager    │  │  (UTF-8 text)  │  │  Accumulator    │ │  │
//! │  │  └──────────────┘  └────────────────┘  └─────────────────┘ │  │
//! │  └────────────────────────────┬───────────────────────────────┘  │
//! │                               │ AssistantApi                      │
//! └───────────────────────────────┼──────────────────────────────────┘
//!                                 ▼
//!                       Assistant REST service
//! ```
//!
//! # Key Types
//!
//! - [`ChatService`]: sends messages and streams replies into state
//! - [`ChatState`]: observable message list, session, loading flag and errors
//! - [`SessionManager`]: creates, loads and deletes conversations
//! - [`AssistantApi`]: backend trait, implemented over HTTP by [`HttpAssistantApi`]
//! - [`UrgencySummary`]: schedule counts per urgency window
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use assistant_core::{AppState, ChatService, ChatSettings, HttpAssistantApi, load_config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     let app = AppState::new();
//!     let api = Arc::new(HttpAssistantApi::from_config(&config)?);
//!     let chat = ChatService::new(api, Arc::clone(app.chat()), ChatSettings::from_config(&config));
//!
//!     let mut updates = app.chat().subscribe_messages();
//!     let outcome = chat.send_message("Buy milk tomorrow").await;
//!     println!("{outcome:?}");
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod app_state;
pub mod backend;
pub mod chat;
pub mod config;
pub mod error;
pub mod messages;
pub mod notice;
pub mod ocr;
pub mod schedule;
pub mod session;
pub mod state;
pub mod streaming;

// Re-export main types for convenience
pub use app_state::{AppState, UserProfile};
pub use backend::{
    ApiTimeouts, AssistantApi, ByteStream, ChatRequest, ConversationSummary,
    CreateSessionRequest, HttpAssistantApi, MessageDto, ScheduleDto, SessionInfo,
};
pub use chat::{ChatService, ChatSettings, SendControl, SendHandle, SendOutcome, SendPhase};
pub use config::{
    default_config_path, load_config, load_config_from_path, AssistantConfig, ConfigError,
    ConfigOverrides, ConfigSource,
};
pub use error::{ApiError, ChatError};
pub use messages::{ChatMessage, MessageId, MessageList, MessageRole, SessionId};
pub use notice::user_notice;
pub use ocr::{CommandRecognizer, ImageSource, TextRecognizer};
pub use schedule::{parse_schedules, Schedule, ScheduleParseError, UrgencyBucket, UrgencySummary};
pub use session::SessionManager;
pub use state::{ActivityGuard, ChatState};
pub use streaming::{FinalReply, FragmentReader, MessageAccumulator, DEFAULT_FRAGMENT_CHARS};
