//! Chat Service
//!
//! The send operation: takes user input, makes sure a session exists, streams
//! the assistant's reply into a placeholder message and settles the outcome.
//!
//! # Send Lifecycle
//!
//! ```text
//!   Idle ──► SessionPending ──► Streaming ──► Finalized
//!              │ (no session)      │
//!              ▼                   ▼
//!            Failed              Failed   (I/O error, HTTP error, cancel)
//! ```
//!
//! A send always ends in `Finalized` or `Failed`, and failures are published
//! on the error channel of [`ChatState`] rather than returned as `Err`.
//!
//! # Concurrency
//!
//! Each session has at most one reply streaming at a time. A second send for
//! a busy session is rejected with [`ChatError::SendInProgress`] and its
//! messages are rolled back.
//!
//! Every running send is also registered with the service from its first
//! step, so [`ChatService::cancel_all`] reaches sends still waiting for a
//! session. A send leaves its slot and the loading flag before it reports a
//! terminal phase.

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::backend::{AssistantApi, ChatRequest};
use crate::config::{AssistantConfig, DEFAULT_CONVERSATION_TITLE, DEFAULT_USER_ID};
use crate::error::ChatError;
use crate::messages::{ChatMessage, MessageId, SessionId};
use crate::notice::RECOGNIZING_NOTICE;
use crate::ocr::{ImageSource, TextRecognizer};
use crate::session::SessionManager;
use crate::state::ChatState;
use crate::streaming::{FragmentReader, MessageAccumulator, DEFAULT_FRAGMENT_CHARS};

// ============================================
// Settings & Outcomes
// ============================================

/// Per-user settings of the chat service
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatSettings {
    /// User messages are sent for
    pub user_id: String,
    /// Title for conversations created on first send
    pub conversation_title: String,
    /// Maximum characters per streamed fragment
    pub fragment_chars: usize,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            user_id: DEFAULT_USER_ID.to_string(),
            conversation_title: DEFAULT_CONVERSATION_TITLE.to_string(),
            fragment_chars: DEFAULT_FRAGMENT_CHARS,
        }
    }
}

impl ChatSettings {
    /// Settings for a user with default title and fragment size
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    /// Take user, title and fragment size from the loaded configuration
    #[must_use]
    pub fn from_config(config: &AssistantConfig) -> Self {
        Self {
            user_id: config.user_id.clone(),
            conversation_title: config.conversation_title.clone(),
            fragment_chars: config.fragment_chars,
        }
    }

    /// Set the fragment size
    #[must_use]
    pub fn with_fragment_chars(mut self, chars: usize) -> Self {
        self.fragment_chars = chars;
        self
    }
}

/// Where a send is in its lifecycle
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendPhase {
    /// Not started
    Idle,
    /// Waiting for a session to be created
    SessionPending,
    /// Reply is streaming into the placeholder
    Streaming,
    /// Reply has its final content
    Finalized,
    /// Send ended with an error
    Failed(ChatError),
}

impl SendPhase {
    /// Whether the send has ended
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finalized | Self::Failed(_))
    }
}

/// How a send ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Blank input; nothing was sent
    Skipped,
    /// The reply finished streaming
    Completed {
        /// The reply message
        message_id: MessageId,
        /// Final reply content
        content: String,
        /// Set when the content is a fallback notice
        warning: Option<ChatError>,
    },
    /// The send failed
    Failed {
        /// What went wrong (also published on the error channel)
        error: ChatError,
        /// The reply message, when a partial or fallback reply remains
        message_id: Option<MessageId>,
    },
}

impl SendOutcome {
    /// The error of a failed send
    #[must_use]
    pub fn error(&self) -> Option<&ChatError> {
        match self {
            Self::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    /// The reply message, when the send got as far as a reply
    #[must_use]
    pub fn reply_id(&self) -> Option<&MessageId> {
        match self {
            Self::Completed { message_id, .. } => Some(message_id),
            Self::Failed { message_id, .. } => message_id.as_ref(),
            Self::Skipped => None,
        }
    }
}

// ============================================
// Send Control
// ============================================

/// Shared control block of one send
#[derive(Debug)]
pub struct SendControl {
    cancel: watch::Sender<bool>,
    phase: watch::Sender<SendPhase>,
    reply_id: OnceLock<MessageId>,
}

impl SendControl {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            cancel: watch::Sender::new(false),
            phase: watch::Sender::new(SendPhase::Idle),
            reply_id: OnceLock::new(),
        })
    }

    /// Request cancellation
    ///
    /// Returns `false` if the send had already ended.
    pub fn cancel(&self) -> bool {
        if self.phase.borrow().is_terminal() {
            return false;
        }
        self.cancel.send_replace(true);
        true
    }

    /// Whether cancellation was requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> SendPhase {
        self.phase.borrow().clone()
    }

    /// Subscribe to phase changes
    #[must_use]
    pub fn subscribe_phase(&self) -> watch::Receiver<SendPhase> {
        self.phase.subscribe()
    }

    /// Placeholder the reply streams into, once it exists
    #[must_use]
    pub fn reply_id(&self) -> Option<&MessageId> {
        self.reply_id.get()
    }

    fn set_phase(&self, phase: SendPhase) {
        self.phase.send_replace(phase);
    }

    /// Resolves once cancellation is requested
    async fn cancelled(&self) {
        let mut rx = self.cancel.subscribe();
        // The sender lives in `self`, so this only returns on cancellation
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

/// Handle to a send running in its own task
#[derive(Debug)]
pub struct SendHandle {
    control: Arc<SendControl>,
    task: JoinHandle<SendOutcome>,
}

impl SendHandle {
    /// Request cancellation
    ///
    /// Returns `false` if the send had already ended.
    pub fn cancel(&self) -> bool {
        self.control.cancel()
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> SendPhase {
        self.control.phase()
    }

    /// Subscribe to phase changes
    #[must_use]
    pub fn subscribe_phase(&self) -> watch::Receiver<SendPhase> {
        self.control.subscribe_phase()
    }

    /// Control block, usable after the handle is consumed by [`SendHandle::outcome`]
    #[must_use]
    pub fn control(&self) -> Arc<SendControl> {
        Arc::clone(&self.control)
    }

    /// Placeholder the reply streams into, once it exists
    #[must_use]
    pub fn reply_id(&self) -> Option<MessageId> {
        self.control.reply_id().cloned()
    }

    /// Wait for the send to end
    pub async fn outcome(self) -> SendOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => SendOutcome::Failed {
                error: ChatError::Internal {
                    reason: e.to_string(),
                },
                message_id: None,
            },
        }
    }
}

/// Removes a send's entry from a table when the send ends
struct SlotGuard<'a, K: Eq + Hash> {
    slots: &'a DashMap<K, Arc<SendControl>>,
    key: K,
    control: Arc<SendControl>,
}

impl<K: Eq + Hash> Drop for SlotGuard<'_, K> {
    fn drop(&mut self) {
        self.slots
            .remove_if(&self.key, |_, held| Arc::ptr_eq(held, &self.control));
    }
}

// ============================================
// Chat Service
// ============================================

/// Sends messages and streams replies into [`ChatState`]
pub struct ChatService<A: AssistantApi> {
    api: Arc<A>,
    state: Arc<ChatState>,
    sessions: SessionManager<A>,
    settings: ChatSettings,
    /// Sends currently holding a session
    in_flight: DashMap<SessionId, Arc<SendControl>>,
    /// Every send that has not ended, whatever its phase
    sends: DashMap<u64, Arc<SendControl>>,
    next_send: AtomicU64,
}

impl<A: AssistantApi> ChatService<A> {
    /// Create a chat service
    pub fn new(api: Arc<A>, state: Arc<ChatState>, settings: ChatSettings) -> Self {
        let sessions = SessionManager::new(
            Arc::clone(&api),
            Arc::clone(&state),
            settings.user_id.clone(),
            settings.conversation_title.clone(),
        );
        Self {
            api,
            state,
            sessions,
            settings,
            in_flight: DashMap::new(),
            sends: DashMap::new(),
            next_send: AtomicU64::new(0),
        }
    }

    /// Observable state
    #[must_use]
    pub fn state(&self) -> &Arc<ChatState> {
        &self.state
    }

    /// Session manager
    #[must_use]
    pub fn sessions(&self) -> &SessionManager<A> {
        &self.sessions
    }

    /// Service settings
    #[must_use]
    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    /// Whether a reply is streaming for a session
    #[must_use]
    pub fn is_streaming(&self, session: &SessionId) -> bool {
        self.in_flight.contains_key(session)
    }

    /// Send a message and wait for the reply to finish
    pub async fn send_message(&self, content: &str) -> SendOutcome {
        let control = SendControl::new();
        let key = self.register(&control);
        self.run_send(content.to_string(), content.to_string(), control, key)
            .await
    }

    /// Send a message shown as `display` while the assistant receives `prompt`
    pub async fn send_with_display(&self, display: &str, prompt: &str) -> SendOutcome {
        let control = SendControl::new();
        let key = self.register(&control);
        self.run_send(display.to_string(), prompt.to_string(), control, key)
            .await
    }

    /// Cancel the send streaming for a session
    ///
    /// Returns `false` if nothing was streaming.
    pub fn cancel_session(&self, session: &SessionId) -> bool {
        self.in_flight
            .get(session)
            .is_some_and(|control| control.cancel())
    }

    /// Cancel every send that has not ended, including those still waiting
    /// for a session
    pub fn cancel_all(&self) {
        for entry in self.sends.iter() {
            entry.value().cancel();
        }
    }

    /// Number of sends that have not ended
    #[must_use]
    pub fn active_sends(&self) -> usize {
        self.sends.len()
    }

    /// Cancel running sends and start a fresh local conversation
    pub fn start_new_conversation(&self) {
        self.cancel_all();
        self.sessions.start_new_conversation();
    }

    /// Recognize the text in an image and ask the assistant to schedule it
    pub async fn send_recognized_image<R>(&self, recognizer: &R, image: &ImageSource) -> SendOutcome
    where
        R: TextRecognizer + ?Sized,
    {
        let notice = self.state.push_message(ChatMessage::assistant(RECOGNIZING_NOTICE));
        let recognized = {
            let _activity = self.state.begin_activity();
            recognizer.recognize(image).await
        };
        self.state.remove_messages(&[notice]);

        let text = match recognized {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => return self.recognition_failed("no text was found in the image".to_string()),
            Err(e) => {
                tracing::warn!(recognizer = recognizer.name(), error = %e, "Image recognition failed");
                return self.recognition_failed(format!("{e:#}"));
            }
        };

        tracing::info!(
            recognizer = recognizer.name(),
            chars = text.chars().count(),
            "Sending recognized image text"
        );
        self.send_with_display(
            &format!("📷 Recognized text:\n{text}"),
            &format!("Please add a schedule for me: {text}"),
        )
        .await
    }

    fn recognition_failed(&self, reason: String) -> SendOutcome {
        self.state
            .push_message(ChatMessage::assistant(format!("Recognition failed: {reason}")));
        let error = ChatError::Recognition { reason };
        self.state.set_error(error.clone());
        SendOutcome::Failed {
            error,
            message_id: None,
        }
    }

    // ============================================
    // Send Pipeline
    // ============================================

    /// Make a send reachable by [`ChatService::cancel_all`]
    fn register(&self, control: &Arc<SendControl>) -> u64 {
        let key = self.next_send.fetch_add(1, Ordering::Relaxed);
        self.sends.insert(key, Arc::clone(control));
        key
    }

    async fn run_send(
        &self,
        display: String,
        prompt: String,
        control: Arc<SendControl>,
        key: u64,
    ) -> SendOutcome {
        let registration = SlotGuard {
            slots: &self.sends,
            key,
            control: Arc::clone(&control),
        };
        if prompt.trim().is_empty() {
            control.set_phase(SendPhase::Finalized);
            return SendOutcome::Skipped;
        }

        let activity = self.state.begin_activity();
        self.state.clear_error();

        let placeholder = ChatMessage::placeholder();
        let reply_id = placeholder.id.clone();
        let _ = control.reply_id.set(reply_id.clone());
        let pending = self
            .state
            .push_in_flight(vec![ChatMessage::user(display), placeholder]);

        let outcome = self.drive(&prompt, &reply_id, &pending, &control).await;
        self.state.release_in_flight(&pending);
        drop(activity);
        drop(registration);

        control.set_phase(match outcome.error() {
            Some(error) => SendPhase::Failed(error.clone()),
            None => SendPhase::Finalized,
        });

        // Only sends that reached the backend can have changed the list
        if outcome.reply_id().is_some() {
            self.sessions.refresh_conversations_quietly().await;
        }
        outcome
    }

    async fn drive(
        &self,
        prompt: &str,
        reply_id: &MessageId,
        pending: &[MessageId],
        control: &Arc<SendControl>,
    ) -> SendOutcome {
        // SessionPending
        let session = if let Some(id) = self.state.session_id() {
            id
        } else {
            control.set_phase(SendPhase::SessionPending);
            let created = tokio::select! {
                biased;
                () = control.cancelled() => Err(ChatError::Cancelled),
                result = self.sessions.ensure_session() => result,
            };
            match created {
                Ok(_) if control.is_cancelled() => {
                    return self.abort(pending, ChatError::Cancelled);
                }
                Ok(id) => id,
                Err(error) => return self.abort(pending, error),
            }
        };

        // One reply per session
        let claimed = match self.in_flight.entry(session.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(control));
                true
            }
        };
        if !claimed {
            return self.abort(pending, ChatError::SendInProgress { session });
        }
        let _slot = SlotGuard {
            slots: &self.in_flight,
            key: session.clone(),
            control: Arc::clone(control),
        };

        // Streaming
        control.set_phase(SendPhase::Streaming);
        let request = ChatRequest::new(session.clone(), prompt).with_user(self.settings.user_id.clone());
        let opened = tokio::select! {
            biased;
            () = control.cancelled() => Err(ChatError::Cancelled),
            result = self.api.open_chat_stream(&request) => result.map_err(ChatError::from),
        };
        let body = match opened {
            Ok(body) => body,
            Err(error) => {
                // The question stays; only the reply placeholder goes
                return self.abort(std::slice::from_ref(reply_id), error);
            }
        };

        let mut reader = FragmentReader::new(body, self.settings.fragment_chars);
        let mut accumulator = MessageAccumulator::new(Arc::clone(&self.state), reply_id.clone());

        loop {
            let next = tokio::select! {
                biased;
                () = control.cancelled() => Err(ChatError::Cancelled),
                read = reader.next_fragment() => read.map_err(|e| ChatError::StreamIo {
                    received_chars: accumulator.char_count(),
                    reason: e.to_string(),
                }),
            };

            match next {
                Ok(Some(fragment)) => {
                    tracing::trace!(session = %session, chars = fragment.chars().count(), "Reply fragment");
                    accumulator.append(&fragment);
                }
                Ok(None) => break,
                Err(error) => {
                    reader.close();
                    tracing::warn!(
                        session = %session,
                        fragments = accumulator.fragment_count(),
                        error = %error,
                        "Reply stream ended early"
                    );
                    accumulator.fail(&error);
                    return SendOutcome::Failed {
                        error,
                        message_id: Some(reply_id.clone()),
                    };
                }
            }
        }

        reader.close();
        let fragments = accumulator.fragment_count();
        let reply = accumulator.finish();
        if let Some(warning) = &reply.warning {
            tracing::warn!(session = %session, warning = %warning, "Reply was empty");
        } else {
            tracing::info!(
                session = %session,
                fragments,
                chars = reply.content.chars().count(),
                "Reply complete"
            );
        }
        SendOutcome::Completed {
            message_id: reply_id.clone(),
            content: reply.content,
            warning: reply.warning,
        }
    }

    /// End a send before any reply text exists, removing `rollback` messages
    ///
    /// The error is not reported when the messages already left the
    /// conversation.
    fn abort(&self, rollback: &[MessageId], error: ChatError) -> SendOutcome {
        tracing::warn!(error = %error, "Send failed before streaming");
        if self.state.remove_messages(rollback) {
            self.state.set_error(error.clone());
        }
        SendOutcome::Failed {
            error,
            message_id: None,
        }
    }
}

impl<A: AssistantApi + 'static> ChatService<A> {
    /// Send a message from a new task and return immediately
    pub fn spawn_send(self: &Arc<Self>, content: impl Into<String>) -> SendHandle {
        let content = content.into();
        let control = SendControl::new();
        let key = self.register(&control);
        let service = Arc::clone(self);
        let task_control = Arc::clone(&control);
        let task = tokio::spawn(async move {
            service
                .run_send(content.clone(), content, task_control, key)
                .await
        });
        SendHandle { control, task }
    }
}

impl<A: AssistantApi> std::fmt::Debug for ChatService<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatService")
            .field("backend", &self.api.name())
            .field("settings", &self.settings)
            .field("in_flight", &self.in_flight.len())
            .field("sends", &self.sends.len())
            .finish_non_exhaustive()
    }
}
