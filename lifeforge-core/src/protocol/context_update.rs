//! Context-update extractor
//!
//! Decodes replies of the form:
//!
//! ```text
//! Ответ: <prose>
//! |||UPDATE_DATA|||
//! Цели: run 5k, read more
//! Недавние действия: bought shoes
//! Прогресс: running:2/10, books:1
//! ```
//!
//! Malformed lines degrade to "no update"; this extractor never reports an
//! error.

use std::collections::BTreeMap;

use super::{Grammar, ParsedReply, ReplyExtractor};
use crate::types::ContextPatch;

/// Extractor for `|||UPDATE_DATA|||` replies.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextUpdateExtractor {
    grammar: Grammar,
}

impl ContextUpdateExtractor {
    /// Create an extractor for the current grammar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an extractor for a specific grammar version.
    pub fn with_grammar(grammar: Grammar) -> Self {
        Self { grammar }
    }

    /// Parse the lines of an update block into a patch.
    fn parse_block(&self, block: &str) -> ContextPatch {
        let mut patch = ContextPatch::default();

        for line in block.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if let Some(rest) = line.strip_prefix(self.grammar.goals_label) {
                patch.goals = split_list(rest);
            } else if let Some(rest) = line.strip_prefix(self.grammar.recent_label) {
                patch.recent5 = split_list(rest);
            } else if let Some(rest) = line.strip_prefix(self.grammar.progress_label) {
                patch.progress.extend(split_pairs(rest));
            } else {
                tracing::trace!(line, "Ignoring unlabeled update line");
            }
        }

        patch
    }
}

impl ReplyExtractor for ContextUpdateExtractor {
    type Payload = ContextPatch;

    fn extract(&self, reply: &str) -> ParsedReply<ContextPatch> {
        let Some(block) = self.grammar.segment(reply, self.grammar.update_sentinel) else {
            return ParsedReply::unstructured(reply);
        };

        ParsedReply {
            prose: self.grammar.prose(reply),
            payload: self.parse_block(block),
            error: None,
        }
    }
}

/// Comma-separated items, trimmed, empty items dropped.
fn split_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Comma-separated `key:value` pairs split on the first colon.
///
/// Items without a colon or with an empty key or value are dropped.
fn split_pairs(text: &str) -> BTreeMap<String, String> {
    text.split(',')
        .filter_map(|item| {
            let (key, value) = item.split_once(':')?;
            let (key, value) = (key.trim(), value.trim());
            if key.is_empty() || value.is_empty() {
                return None;
            }
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(reply: &str) -> ParsedReply<ContextPatch> {
        ContextUpdateExtractor::new().extract(reply)
    }

    #[test]
    fn test_reply_without_sentinel_is_all_prose() {
        let parsed = extract("  Just chatting today.\n");
        assert_eq!(parsed.prose, "Just chatting today.");
        assert!(parsed.payload.is_empty());
        assert!(parsed.error.is_none());
    }

    #[test]
    fn test_goals_and_progress() {
        let parsed = extract("Ответ: Done|||UPDATE_DATA|||Цели: A, B\nПрогресс: x:1, y:2");
        assert_eq!(parsed.prose, "Done");
        assert_eq!(parsed.payload.goals, vec!["A", "B"]);
        assert!(parsed.payload.recent5.is_empty());
        assert_eq!(parsed.payload.progress.len(), 2);
        assert_eq!(parsed.payload.progress["x"], "1");
        assert_eq!(parsed.payload.progress["y"], "2");
        assert!(parsed.error.is_none());
    }

    #[test]
    fn test_recent_actions_and_noise() {
        let reply = "Ok\n|||UPDATE_DATA|||\n\
                     Недавние действия: gym, , groceries\n\
                     Mood: great\n\
                     Прогресс: broken, :nokey, novalue:, time: 10:30";
        let parsed = extract(reply);
        assert_eq!(parsed.payload.recent5, vec!["gym", "groceries"]);
        assert!(parsed.payload.goals.is_empty());
        assert_eq!(parsed.payload.progress.len(), 1);
        assert_eq!(parsed.payload.progress["time"], "10:30");
    }

    #[test]
    fn test_progress_lines_accumulate() {
        let parsed = extract("x|||UPDATE_DATA|||Прогресс: a:1, b:2\nПрогресс: b:3");
        assert_eq!(parsed.payload.progress["a"], "1");
        assert_eq!(parsed.payload.progress["b"], "3");
    }

    #[test]
    fn test_only_first_segment_is_used() {
        let parsed = extract("x|||UPDATE_DATA|||Цели: A|||UPDATE_DATA|||Цели: B");
        assert_eq!(parsed.payload.goals, vec!["A"]);
    }

    #[test]
    fn test_empty_block_is_empty_patch() {
        let parsed = extract("Ответ: hello |||UPDATE_DATA|||   ");
        assert_eq!(parsed.prose, "hello");
        assert!(parsed.payload.is_empty());
        assert!(parsed.error.is_none());
    }

    #[test]
    fn test_split_pairs_first_colon() {
        let pairs = split_pairs("url: http://x, k:v");
        assert_eq!(pairs["url"], "http://x");
        assert_eq!(pairs["k"], "v");
    }
}
