//! Reply Streaming
//!
//! The two halves of turning a chat reply body into on-screen text:
//!
//! ```text
//!   ByteStream ──► FragmentReader ──► MessageAccumulator ──► ChatState
//!   (network)      (UTF-8 blocks)      (running buffer)       (watch)
//! ```
//!
//! The reader knows nothing about messages and the accumulator knows nothing
//! about bytes. [`crate::chat::ChatService`] wires them together and decides
//! when a reply is finished, failed or cancelled.

mod accumulator;
mod reader;

pub use accumulator::{FinalReply, MessageAccumulator};
pub use reader::{FragmentReader, DEFAULT_FRAGMENT_CHARS};
