//! Application State
//!
//! Process-wide preferences and the signed-in user, built once at startup and
//! handed to whatever needs them. Signing out resets the user, the theme and
//! the chat state together.

use std::sync::Arc;

use tokio::sync::watch;

use crate::state::ChatState;

/// The signed-in user
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserProfile {
    /// Backend user identifier
    pub user_id: String,
    /// Name shown in the UI
    pub display_name: Option<String>,
}

impl UserProfile {
    /// Profile without a display name
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: None,
        }
    }

    /// Set the display name
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// Shared application state
#[derive(Debug)]
pub struct AppState {
    dark_mode: watch::Sender<bool>,
    user: watch::Sender<Option<UserProfile>>,
    chat: Arc<ChatState>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    /// Signed-out state with the light theme
    #[must_use]
    pub fn new() -> Self {
        Self {
            dark_mode: watch::Sender::new(false),
            user: watch::Sender::new(None),
            chat: Arc::new(ChatState::new()),
        }
    }

    /// Chat state shared with the chat service
    #[must_use]
    pub fn chat(&self) -> &Arc<ChatState> {
        &self.chat
    }

    /// Whether the dark theme is on
    #[must_use]
    pub fn is_dark_mode(&self) -> bool {
        *self.dark_mode.borrow()
    }

    /// Subscribe to theme changes
    #[must_use]
    pub fn subscribe_dark_mode(&self) -> watch::Receiver<bool> {
        self.dark_mode.subscribe()
    }

    /// Switch the theme
    pub fn set_dark_mode(&self, enabled: bool) {
        self.dark_mode.send_if_modified(|current| {
            let changed = *current != enabled;
            *current = enabled;
            changed
        });
    }

    /// Flip the theme, returning the new value
    pub fn toggle_dark_mode(&self) -> bool {
        let mut enabled = false;
        self.dark_mode.send_modify(|current| {
            *current = !*current;
            enabled = *current;
        });
        enabled
    }

    /// The signed-in user
    #[must_use]
    pub fn user(&self) -> Option<UserProfile> {
        self.user.borrow().clone()
    }

    /// ID of the signed-in user
    #[must_use]
    pub fn current_user_id(&self) -> Option<String> {
        self.user.borrow().as_ref().map(|u| u.user_id.clone())
    }

    /// Subscribe to sign-in changes
    #[must_use]
    pub fn subscribe_user(&self) -> watch::Receiver<Option<UserProfile>> {
        self.user.subscribe()
    }

    /// Sign a user in
    pub fn sign_in(&self, profile: UserProfile) {
        tracing::info!(user = %profile.user_id, "Signed in");
        self.user.send_replace(Some(profile));
    }

    /// Sign out and reset theme and chat state
    pub fn sign_out(&self) {
        if let Some(previous) = self.user.send_replace(None) {
            tracing::info!(user = %previous.user_id, "Signed out");
        }
        self.set_dark_mode(false);
        self.chat.reset();
    }
}
