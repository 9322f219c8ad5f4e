//! Session Management
//!
//! Makes sure a conversation exists before a message is sent, and manages the
//! conversation list around it.
//!
//! # Design Philosophy
//!
//! The backend issues session identifiers, so a send that finds no session has
//! to create one first. Several sends can race for that, which is why creation
//! runs under an async mutex and re-checks the session after acquiring it:
//! whoever gets the lock first creates the session, everyone queued behind it
//! reuses the result.
//!
//! Replacing the current conversation (new, loaded or deleted) bumps a
//! generation counter. A session whose creation started before the bump is
//! never installed.

use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex;

use crate::backend::{AssistantApi, CreateSessionRequest};
use crate::error::ChatError;
use crate::messages::{ChatMessage, SessionId};
use crate::state::ChatState;

/// Owns the current session and the conversation list
pub struct SessionManager<A: AssistantApi> {
    api: Arc<A>,
    state: Arc<ChatState>,
    user_id: String,
    conversation_title: String,
    /// Serializes session creation
    creation: Mutex<()>,
    /// Bumped whenever the current conversation is replaced
    generation: SyncMutex<u64>,
}

impl<A: AssistantApi> SessionManager<A> {
    /// Create a session manager for a user
    pub fn new(
        api: Arc<A>,
        state: Arc<ChatState>,
        user_id: impl Into<String>,
        conversation_title: impl Into<String>,
    ) -> Self {
        Self {
            api,
            state,
            user_id: user_id.into(),
            conversation_title: conversation_title.into(),
            creation: Mutex::new(()),
            generation: SyncMutex::new(0),
        }
    }

    /// The user sessions are created for
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Current session, if any
    #[must_use]
    pub fn current(&self) -> Option<SessionId> {
        self.state.session_id()
    }

    /// Return the current session, creating one if there is none
    ///
    /// Makes no network call when a session is already set. A newly created
    /// session starts with an empty message list, except for the messages of
    /// sends that are still in flight.
    ///
    /// # Errors
    ///
    /// `SessionCreationFailed` when the backend call fails. The error is also
    /// published on the error channel and the session stays unset.
    ///
    /// `Cancelled` when the conversation was replaced while the session was
    /// being created. The created session is dropped.
    pub async fn ensure_session(&self) -> Result<SessionId, ChatError> {
        if let Some(id) = self.state.session_id() {
            return Ok(id);
        }
        let generation = *self.generation.lock();

        let _creation = self.creation.lock().await;

        // Someone else may have created it while we waited for the lock
        if let Some(id) = self.state.session_id() {
            tracing::debug!(session = %id, "Reusing session created by a concurrent send");
            return Ok(id);
        }

        let request =
            CreateSessionRequest::new(self.user_id.clone()).with_title(self.conversation_title.clone());

        match self.api.create_session(&request).await {
            Ok(info) => {
                let id = SessionId::new(info.id);
                {
                    let current = self.generation.lock();
                    if *current != generation {
                        tracing::info!(session = %id, "Conversation replaced during session creation; dropping session");
                        return Err(ChatError::Cancelled);
                    }
                    self.state.discard_settled();
                    self.state.set_session(Some(id.clone()));
                }
                tracing::info!(
                    session = %id,
                    backend = self.api.name(),
                    "Created conversation session"
                );
                Ok(id)
            }
            Err(e) => {
                let error = ChatError::SessionCreationFailed {
                    reason: e.to_string(),
                };
                tracing::warn!(error = %e, "Failed to create conversation session");
                self.state.set_error(error.clone());
                Err(error)
            }
        }
    }

    /// Forget the current session locally
    ///
    /// The next send creates a new one. Nothing is sent to the backend.
    pub fn start_new_conversation(&self) {
        self.replace_conversation(|state| {
            state.set_session(None);
            state.clear_messages();
            state.clear_error();
        });
        tracing::debug!("Started a new local conversation");
    }

    /// Swap the current conversation under a new generation
    fn replace_conversation(&self, swap: impl FnOnce(&ChatState)) {
        let mut generation = self.generation.lock();
        *generation += 1;
        swap(&self.state);
    }

    /// Reload the conversation list
    ///
    /// # Errors
    ///
    /// The backend failure, also published on the error channel.
    pub async fn refresh_conversations(&self) -> Result<(), ChatError> {
        let _activity = self.state.begin_activity();
        match self.api.list_conversations(&self.user_id).await {
            Ok(conversations) => {
                tracing::debug!(count = conversations.len(), "Refreshed conversation list");
                self.state.set_conversations(conversations);
                Ok(())
            }
            Err(e) => {
                let error = ChatError::from(e);
                tracing::warn!(error = %error, "Failed to refresh conversation list");
                self.state.set_error(error.clone());
                Err(error)
            }
        }
    }

    /// Reload the conversation list, logging instead of reporting failures
    pub async fn refresh_conversations_quietly(&self) {
        match self.api.list_conversations(&self.user_id).await {
            Ok(conversations) => self.state.set_conversations(conversations),
            Err(e) => tracing::debug!(error = %e, "Background conversation refresh failed"),
        }
    }

    /// Open a stored conversation
    ///
    /// Replaces the message list with the server history and adopts the
    /// conversation as the current session.
    ///
    /// # Errors
    ///
    /// The backend failure, also published on the error channel. Local state
    /// is left untouched on failure.
    pub async fn load_conversation(&self, conversation_id: &str) -> Result<(), ChatError> {
        let _activity = self.state.begin_activity();
        self.state.clear_error();

        match self.api.conversation_messages(conversation_id).await {
            Ok(history) => {
                let messages: Vec<ChatMessage> = history.into_iter().map(ChatMessage::from).collect();
                tracing::info!(
                    conversation = conversation_id,
                    messages = messages.len(),
                    "Loaded conversation"
                );
                self.replace_conversation(|state| {
                    state.set_messages(messages);
                    state.set_session(Some(SessionId::new(conversation_id)));
                });
                Ok(())
            }
            Err(e) => {
                let error = ChatError::from(e);
                tracing::warn!(conversation = conversation_id, error = %error, "Failed to load conversation");
                self.state.set_error(error.clone());
                Err(error)
            }
        }
    }

    /// Delete a conversation on the backend
    ///
    /// Deleting the current conversation also clears the local session and
    /// messages. The conversation list is refreshed afterwards.
    ///
    /// # Errors
    ///
    /// The backend failure, also published on the error channel.
    pub async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ChatError> {
        {
            let _activity = self.state.begin_activity();
            if let Err(e) = self.api.delete_conversation(conversation_id).await {
                let error = ChatError::from(e);
                tracing::warn!(conversation = conversation_id, error = %error, "Failed to delete conversation");
                self.state.set_error(error.clone());
                return Err(error);
            }
        }

        if self
            .state
            .session_id()
            .is_some_and(|current| current.as_str() == conversation_id)
        {
            self.replace_conversation(|state| {
                state.set_session(None);
                state.clear_messages();
            });
        }
        tracing::info!(conversation = conversation_id, "Deleted conversation");

        self.refresh_conversations().await
    }
}

impl<A: AssistantApi> std::fmt::Debug for SessionManager<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("backend", &self.api.name())
            .field("user_id", &self.user_id)
            .field("session", &self.state.session_id())
            .finish_non_exhaustive()
    }
}
