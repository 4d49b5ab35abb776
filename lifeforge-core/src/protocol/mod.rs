//! Reply protocol decoding
//!
//! The LLM answers in free text that loosely follows a convention: prose for
//! the user, then a sentinel token, then a structured segment. This module
//! turns such replies into typed records.
//!
//! ## Design Principles
//!
//! 1. **One grammar**: every sentinel and label lives in [`Grammar`]
//! 2. **Prose always survives**: a broken structured segment never costs the
//!    user the answer text
//! 3. **Absence is not failure**: a missing sentinel or an empty payload
//!    yields an empty result with no error
//!
//! | Extractor | Sentinel | Payload |
//! |-----------|----------|---------|
//! | [`ContextUpdateExtractor`] | `|||UPDATE_DATA|||` | [`ContextPatch`](crate::types::ContextPatch) |
//! | [`CalendarEventExtractor`] | `|||CALENDAR_EVENT|||` | `Vec<EventCandidate>` |

mod calendar_event;
mod context_update;
mod grammar;
pub mod timestamp;

pub use calendar_event::{CalendarEventExtractor, WireEvent};
pub use context_update::ContextUpdateExtractor;
pub use grammar::Grammar;

use crate::error::Error;

/// Result of decoding one reply.
///
/// `payload` and `error` are independent: when the structured segment fails
/// to decode, `payload` is empty, `error` is set, and `prose` is still the
/// best-effort answer text.
#[derive(Debug)]
pub struct ParsedReply<T> {
    /// Text to show the user
    pub prose: String,
    /// Structured data recovered from the reply
    pub payload: T,
    /// Decode failure of the structured segment, if any
    pub error: Option<Error>,
}

impl<T: Default> ParsedReply<T> {
    /// A reply without structured data: the trimmed text is all prose.
    pub fn unstructured(reply: &str) -> Self {
        Self {
            prose: reply.trim().to_string(),
            payload: T::default(),
            error: None,
        }
    }
}

/// Trait implemented by every reply extractor.
///
/// Extraction is pure and never fails as a whole; structural problems are
/// reported through [`ParsedReply::error`].
pub trait ReplyExtractor {
    /// Structured data produced by this extractor
    type Payload;

    /// Split `reply` into prose and payload.
    fn extract(&self, reply: &str) -> ParsedReply<Self::Payload>;
}
