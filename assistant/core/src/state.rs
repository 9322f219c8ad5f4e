//! Observable Chat State
//!
//! Everything a chat screen renders: the message list, the current session,
//! the conversation list, a loading flag and the last error. Each value lives
//! in a `tokio::sync::watch` channel so any number of surfaces can subscribe
//! and read consistent snapshots without locking the writer.
//!
//! # Design Philosophy
//!
//! Writers never mutate a published list in place. Every change builds a new
//! `Vec` that reuses the `Arc` of each untouched message, so a snapshot taken
//! by an observer stays valid forever and unchanged messages compare equal by
//! pointer across snapshots.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::backend::ConversationSummary;
use crate::error::ChatError;
use crate::messages::{ChatMessage, MessageId, MessageList, SessionId};
use crate::notice::user_notice;

/// Observable chat state shared by the chat service and its observers
#[derive(Debug)]
pub struct ChatState {
    /// Current conversation
    messages: watch::Sender<MessageList>,
    /// Current session, `None` until first use
    session_id: watch::Sender<Option<SessionId>>,
    /// Conversations listed by the backend
    conversations: watch::Sender<Vec<ConversationSummary>>,
    /// Whether any operation is running
    loading: watch::Sender<bool>,
    /// Last reported error
    error: watch::Sender<Option<ChatError>>,
    /// Operations holding the loading flag; `loading` is published under this lock
    active_operations: Mutex<usize>,
    /// Messages that belong to sends still running
    in_flight: Mutex<HashSet<MessageId>>,
}

impl Default for ChatState {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatState {
    /// Create empty state
    #[must_use]
    pub fn new() -> Self {
        Self {
            messages: watch::Sender::new(Arc::new(Vec::new())),
            session_id: watch::Sender::new(None),
            conversations: watch::Sender::new(Vec::new()),
            loading: watch::Sender::new(false),
            error: watch::Sender::new(None),
            active_operations: Mutex::new(0),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    // ============================================
    // Messages
    // ============================================

    /// Snapshot of the current conversation
    #[must_use]
    pub fn messages(&self) -> MessageList {
        Arc::clone(&self.messages.borrow())
    }

    /// Subscribe to conversation updates
    #[must_use]
    pub fn subscribe_messages(&self) -> watch::Receiver<MessageList> {
        self.messages.subscribe()
    }

    /// Find a message by ID in the current snapshot
    #[must_use]
    pub fn message(&self, id: &MessageId) -> Option<Arc<ChatMessage>> {
        self.messages.borrow().iter().find(|m| &m.id == id).cloned()
    }

    /// Append a message
    pub fn push_message(&self, message: ChatMessage) -> MessageId {
        let id = message.id.clone();
        self.rewrite(|current| {
            let mut next = current.to_vec();
            next.push(Arc::new(message));
            next
        });
        id
    }

    /// Append the messages of a send and mark them as in flight
    ///
    /// In-flight messages survive [`ChatState::discard_settled`] until
    /// [`ChatState::release_in_flight`] is called for them.
    pub fn push_in_flight(&self, messages: Vec<ChatMessage>) -> Vec<MessageId> {
        let ids: Vec<MessageId> = messages.iter().map(|m| m.id.clone()).collect();
        self.messages.send_modify(|current| {
            self.in_flight.lock().extend(ids.iter().cloned());
            let mut next = current.to_vec();
            next.extend(messages.into_iter().map(Arc::new));
            *current = Arc::new(next);
        });
        ids
    }

    /// Forget the in-flight mark of a finished send
    pub fn release_in_flight(&self, ids: &[MessageId]) {
        let mut in_flight = self.in_flight.lock();
        for id in ids {
            in_flight.remove(id);
        }
    }

    /// Replace the content of one message
    ///
    /// Every other message keeps its `Arc`. Returns `false` when no message
    /// has the ID (it was removed), in which case nothing is published.
    pub fn update_content(&self, id: &MessageId, content: String) -> bool {
        self.messages.send_if_modified(|current| {
            let Some(position) = current.iter().position(|m| &m.id == id) else {
                return false;
            };
            let mut next = current.to_vec();
            next[position] = Arc::new(current[position].with_content(content));
            *current = Arc::new(next);
            true
        })
    }

    /// Remove messages by ID
    ///
    /// Returns `false` when none of them was present.
    pub fn remove_messages(&self, ids: &[MessageId]) -> bool {
        self.messages.send_if_modified(|current| {
            if !current.iter().any(|m| ids.contains(&m.id)) {
                return false;
            }
            let next: Vec<_> = current
                .iter()
                .filter(|m| !ids.contains(&m.id))
                .cloned()
                .collect();
            *current = Arc::new(next);
            true
        })
    }

    /// Drop every message that does not belong to a running send
    pub fn discard_settled(&self) {
        self.messages.send_modify(|current| {
            let in_flight = self.in_flight.lock();
            let next: Vec<_> = current
                .iter()
                .filter(|m| in_flight.contains(&m.id))
                .cloned()
                .collect();
            *current = Arc::new(next);
        });
    }

    /// Replace the whole conversation
    pub fn set_messages(&self, messages: Vec<ChatMessage>) {
        self.messages
            .send_replace(Arc::new(messages.into_iter().map(Arc::new).collect()));
    }

    /// Empty the conversation
    pub fn clear_messages(&self) {
        self.messages.send_replace(Arc::new(Vec::new()));
    }

    /// Publish a list derived from the current one
    fn rewrite(&self, f: impl FnOnce(&[Arc<ChatMessage>]) -> Vec<Arc<ChatMessage>>) {
        self.messages.send_modify(|current| {
            *current = Arc::new(f(current.as_slice()));
        });
    }

    // ============================================
    // Session
    // ============================================

    /// Current session ID
    #[must_use]
    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id.borrow().clone()
    }

    /// Subscribe to session changes
    #[must_use]
    pub fn subscribe_session(&self) -> watch::Receiver<Option<SessionId>> {
        self.session_id.subscribe()
    }

    /// Set or clear the current session
    pub fn set_session(&self, session_id: Option<SessionId>) {
        self.session_id.send_replace(session_id);
    }

    // ============================================
    // Conversations
    // ============================================

    /// Conversations from the last refresh
    #[must_use]
    pub fn conversations(&self) -> Vec<ConversationSummary> {
        self.conversations.borrow().clone()
    }

    /// Subscribe to conversation list updates
    #[must_use]
    pub fn subscribe_conversations(&self) -> watch::Receiver<Vec<ConversationSummary>> {
        self.conversations.subscribe()
    }

    /// Replace the conversation list
    pub fn set_conversations(&self, conversations: Vec<ConversationSummary>) {
        self.conversations.send_replace(conversations);
    }

    // ============================================
    // Loading & Errors
    // ============================================

    /// Whether any operation is running
    #[must_use]
    pub fn is_loading(&self) -> bool {
        *self.loading.borrow()
    }

    /// Subscribe to the loading flag
    #[must_use]
    pub fn subscribe_loading(&self) -> watch::Receiver<bool> {
        self.loading.subscribe()
    }

    /// Raise the loading flag until the returned guard drops
    ///
    /// Guards nest: the flag clears when the last one drops.
    #[must_use]
    pub fn begin_activity(&self) -> ActivityGuard<'_> {
        let mut active = self.active_operations.lock();
        *active += 1;
        if *active == 1 {
            self.loading.send_replace(true);
        }
        ActivityGuard { state: self }
    }

    /// Last reported error
    #[must_use]
    pub fn error(&self) -> Option<ChatError> {
        self.error.borrow().clone()
    }

    /// Last reported error, rendered for display
    #[must_use]
    pub fn error_notice(&self) -> Option<String> {
        self.error.borrow().as_ref().map(user_notice)
    }

    /// Subscribe to error reports
    #[must_use]
    pub fn subscribe_error(&self) -> watch::Receiver<Option<ChatError>> {
        self.error.subscribe()
    }

    /// Report an error
    pub fn set_error(&self, error: ChatError) {
        self.error.send_replace(Some(error));
    }

    /// Clear the last error
    pub fn clear_error(&self) {
        self.error.send_if_modified(|current| current.take().is_some());
    }

    /// Reset everything to the signed-out state
    pub fn reset(&self) {
        self.in_flight.lock().clear();
        self.clear_messages();
        self.set_session(None);
        self.set_conversations(Vec::new());
        self.clear_error();
    }
}

/// Holds the loading flag raised by [`ChatState::begin_activity`]
#[derive(Debug)]
pub struct ActivityGuard<'a> {
    state: &'a ChatState,
}

impl Drop for ActivityGuard<'_> {
    fn drop(&mut self) {
        let mut active = self.state.active_operations.lock();
        *active = active.saturating_sub(1);
        if *active == 0 {
            self.state.loading.send_replace(false);
        }
    }
}
