//! Fragment Reader
//!
//! Turns the raw body of a chat reply into text fragments of bounded size.
//!
//! Network chunks do not respect character boundaries, so bytes are decoded
//! incrementally: an incomplete UTF-8 sequence at the end of a chunk is held
//! back until the next chunk completes it. Invalid sequences become U+FFFD, as
//! does an incomplete sequence left over when the stream ends.

use futures::StreamExt;

use crate::backend::ByteStream;

/// Default fragment size in characters
pub const DEFAULT_FRAGMENT_CHARS: usize = 256;

/// Incremental decoder over a reply body
pub struct FragmentReader {
    /// Body stream, `None` once released
    stream: Option<ByteStream>,
    /// Undecoded bytes (an incomplete UTF-8 sequence at most)
    pending: Vec<u8>,
    /// Decoded text not yet handed out
    decoded: String,
    /// Maximum characters per fragment
    block_chars: usize,
    /// Characters handed out so far
    chars_read: usize,
}

impl FragmentReader {
    /// Wrap a reply body, yielding fragments of at most `block_chars` characters
    #[must_use]
    pub fn new(stream: ByteStream, block_chars: usize) -> Self {
        Self {
            stream: Some(stream),
            pending: Vec::new(),
            decoded: String::new(),
            block_chars: block_chars.max(1),
            chars_read: 0,
        }
    }

    /// Read the next fragment
    ///
    /// Returns `Ok(None)` at end of stream. The stream is released on end of
    /// stream and on error. Text decoded before a failure has already been
    /// handed out when the error is returned.
    ///
    /// # Errors
    ///
    /// The I/O error that broke the body stream.
    pub async fn next_fragment(&mut self) -> std::io::Result<Option<String>> {
        loop {
            if !self.decoded.is_empty() {
                return Ok(Some(self.take_block()));
            }

            let Some(stream) = self.stream.as_mut() else {
                return Ok(None);
            };

            match stream.next().await {
                Some(Ok(bytes)) => self.decode(&bytes),
                Some(Err(err)) => {
                    self.close();
                    return Err(err);
                }
                None => {
                    self.flush_pending();
                    self.close();
                }
            }
        }
    }

    /// Release the body stream
    ///
    /// Idempotent. Text already decoded stays readable.
    pub fn close(&mut self) {
        if self.stream.take().is_some() {
            tracing::trace!(chars_read = self.chars_read, "Reply stream released");
        }
    }

    /// Whether the body stream is still held
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Characters handed out so far
    #[must_use]
    pub fn chars_read(&self) -> usize {
        self.chars_read
    }

    /// Split off up to `block_chars` characters from the decoded buffer
    fn take_block(&mut self) -> String {
        let split_at = self
            .decoded
            .char_indices()
            .nth(self.block_chars)
            .map_or(self.decoded.len(), |(index, _)| index);
        let rest = self.decoded.split_off(split_at);
        let block = std::mem::replace(&mut self.decoded, rest);
        self.chars_read += block.chars().count();
        block
    }

    /// Decode as much of `pending + bytes` as forms complete characters
    fn decode(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);

        let mut consumed = 0;
        while consumed < self.pending.len() {
            match std::str::from_utf8(&self.pending[consumed..]) {
                Ok(valid) => {
                    self.decoded.push_str(valid);
                    consumed = self.pending.len();
                }
                Err(err) => {
                    let valid_end = consumed + err.valid_up_to();
                    self.decoded
                        .push_str(&String::from_utf8_lossy(&self.pending[consumed..valid_end]));
                    match err.error_len() {
                        Some(invalid_len) => {
                            self.decoded.push(char::REPLACEMENT_CHARACTER);
                            consumed = valid_end + invalid_len;
                        }
                        None => {
                            // Incomplete sequence: wait for the next chunk
                            consumed = valid_end;
                            break;
                        }
                    }
                }
            }
        }

        self.pending.drain(..consumed);
    }

    /// Decode whatever is left at end of stream
    fn flush_pending(&mut self) {
        if !self.pending.is_empty() {
            self.decoded
                .push_str(&String::from_utf8_lossy(&self.pending));
            self.pending.clear();
        }
    }
}

impl std::fmt::Debug for FragmentReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FragmentReader")
            .field("open", &self.is_open())
            .field("pending_bytes", &self.pending.len())
            .field("buffered_chars", &self.decoded.chars().count())
            .field("block_chars", &self.block_chars)
            .field("chars_read", &self.chars_read)
            .finish()
    }
}
