//! Incremental terminal output of assistant replies

use std::collections::HashSet;
use std::sync::Arc;

use assistant_core::{ChatMessage, MessageId};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Prints assistant messages as they grow
///
/// Only the newly streamed part of a message is written on each update.
/// Messages that existed when the printer was created are never printed.
pub struct ReplyPrinter<W> {
    out: W,
    known: HashSet<MessageId>,
    current: Option<MessageId>,
    printed: String,
}

impl<W: AsyncWrite + Unpin> ReplyPrinter<W> {
    /// Printer that ignores everything in `existing`
    pub fn new(out: W, existing: &[Arc<ChatMessage>]) -> Self {
        Self {
            out,
            known: existing.iter().map(|m| m.id.clone()).collect(),
            current: None,
            printed: String::new(),
        }
    }

    /// Print whatever the newest assistant message gained since the last call
    pub async fn show(&mut self, messages: &[Arc<ChatMessage>]) -> std::io::Result<()> {
        let Some(latest) = messages
            .iter()
            .rev()
            .find(|m| !m.is_user() && !self.known.contains(&m.id))
        else {
            return Ok(());
        };

        if self.current.as_ref() != Some(&latest.id) {
            if !self.printed.is_empty() {
                self.out.write_all(b"\n").await?;
            }
            self.current = Some(latest.id.clone());
            self.printed.clear();
        }

        match latest.content.strip_prefix(self.printed.as_str()) {
            Some("") => return Ok(()),
            Some(delta) => self.out.write_all(delta.as_bytes()).await?,
            // Content was replaced rather than extended
            None => {
                self.out.write_all(b"\n").await?;
                self.out.write_all(latest.content.as_bytes()).await?;
            }
        }
        self.printed.clone_from(&latest.content);
        self.out.flush().await
    }

    /// End the output with a newline
    pub async fn finish(mut self) -> std::io::Result<W> {
        if !self.printed.is_empty() {
            self.out.write_all(b"\n").await?;
        }
        self.out.flush().await?;
        Ok(self.out)
    }
}
