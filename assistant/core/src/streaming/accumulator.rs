//! Message Accumulator
//!
//! Collects the fragments of one streamed reply and republishes the running
//! text into the reply's placeholder message.
//!
//! The accumulator is consumed by [`MessageAccumulator::finish`] or
//! [`MessageAccumulator::fail`], so nothing can write to the placeholder after
//! the reply has its final content.

use std::sync::Arc;

use crate::error::ChatError;
use crate::messages::MessageId;
use crate::notice::{
    CANCELLED_MARKER, CANCELLED_NOTICE, CONNECTION_FAILED_NOTICE, EMPTY_REPLY_NOTICE,
    TRUNCATION_MARKER,
};
use crate::state::ChatState;

/// Final content of a reply that streamed to completion
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinalReply {
    /// Content written into the placeholder
    pub content: String,
    /// Set when the content is a fallback rather than server text
    pub warning: Option<ChatError>,
}

/// Running text of one streamed reply
#[derive(Debug)]
pub struct MessageAccumulator {
    state: Arc<ChatState>,
    target: MessageId,
    buffer: String,
    fragments: usize,
}

impl MessageAccumulator {
    /// Accumulate into the placeholder `target`
    #[must_use]
    pub fn new(state: Arc<ChatState>, target: MessageId) -> Self {
        Self {
            state,
            target,
            buffer: String::new(),
            fragments: 0,
        }
    }

    /// Append a fragment and publish the full text so far
    pub fn append(&mut self, fragment: &str) {
        if fragment.is_empty() {
            return;
        }
        self.buffer.push_str(fragment);
        self.fragments += 1;
        if !self.state.update_content(&self.target, self.buffer.clone()) {
            tracing::debug!(message = %self.target, "Placeholder is gone; fragment not shown");
        }
    }

    /// Text accumulated so far
    #[must_use]
    pub fn content(&self) -> &str {
        &self.buffer
    }

    /// Fragments applied so far
    #[must_use]
    pub fn fragment_count(&self) -> usize {
        self.fragments
    }

    /// Characters accumulated so far
    #[must_use]
    pub fn char_count(&self) -> usize {
        self.buffer.chars().count()
    }

    /// The placeholder being written
    #[must_use]
    pub fn target(&self) -> &MessageId {
        &self.target
    }

    /// Finalize after end of stream
    ///
    /// An empty reply is replaced by a fixed notice and flagged with
    /// [`ChatError::EmptyResponse`].
    #[must_use]
    pub fn finish(self) -> FinalReply {
        let (content, warning) = if self.buffer.is_empty() {
            (EMPTY_REPLY_NOTICE.to_string(), Some(ChatError::EmptyResponse))
        } else {
            (self.buffer, None)
        };
        self.state.update_content(&self.target, content.clone());
        FinalReply { content, warning }
    }

    /// Finalize after a failure or cancellation and report the error
    ///
    /// Partial text is kept with a marker appended; with no text at all the
    /// placeholder gets a fixed notice. Nothing is reported when the
    /// placeholder has already left the conversation.
    pub fn fail(self, error: &ChatError) -> String {
        let content = match (self.buffer.is_empty(), error) {
            (true, ChatError::Cancelled) => CANCELLED_NOTICE.to_string(),
            (true, _) => CONNECTION_FAILED_NOTICE.to_string(),
            (false, ChatError::Cancelled) => format!("{}{CANCELLED_MARKER}", self.buffer),
            (false, _) => format!("{}{TRUNCATION_MARKER}", self.buffer),
        };
        if self.state.update_content(&self.target, content.clone()) {
            self.state.set_error(error.clone());
        } else {
            tracing::debug!(message = %self.target, error = %error, "Reply failed after leaving the conversation");
        }
        content
    }
}
