//! Core domain types for lifeforge
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Context** | Persisted per-user state carried across chat turns |
//! | **Patch** | A partial Context update extracted from one reply |
//! | **Event candidate** | A decoded calendar event not yet created externally |
//! | **Journal entry** | A free-text diary record with a mood score |

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================
// Context
// ============================================

/// Accumulated user state across conversations.
///
/// `goals`, `recent5` and `progress` are never absent: an empty container
/// stands for "nothing recorded".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// Stable per user/session (single-user deployments use a fixed id)
    pub id: i64,
    /// Current goals; duplicates are kept
    #[serde(default)]
    pub goals: Vec<String>,
    /// Short rolling log of recent actions
    #[serde(default)]
    pub recent5: Vec<String>,
    /// Progress markers, last write wins per key
    #[serde(default)]
    pub progress: BTreeMap<String, String>,
}

impl Context {
    /// An empty context with the given id.
    pub fn empty(id: i64) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }
}

/// A partial context update.
///
/// Empty fields mean "no update for this field".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContextPatch {
    pub goals: Vec<String>,
    pub recent5: Vec<String>,
    pub progress: BTreeMap<String, String>,
}

impl ContextPatch {
    /// True when applying this patch cannot change anything.
    pub fn is_empty(&self) -> bool {
        self.goals.is_empty() && self.recent5.is_empty() && self.progress.is_empty()
    }
}

// ============================================
// Calendar events
// ============================================

/// A proposed calendar event extracted from LLM output.
///
/// Has no identity until an external calendar assigns one.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventCandidate {
    /// Always true once the candidate leaves the extractor
    pub is_event: bool,
    pub title: String,
    /// Absent means "unspecified", the calendar layer picks a default
    pub start_time: Option<DateTime<FixedOffset>>,
    /// Absent defaults to one hour when materialized
    #[serde(rename = "duration")]
    pub duration_hours: Option<f64>,
    /// FREQ-style keyword, opaque to the protocol layer
    pub recurrence: Option<String>,
    pub description: Option<String>,
}

impl EventCandidate {
    /// True when the title carries something other than whitespace.
    pub fn has_title(&self) -> bool {
        !self.title.trim().is_empty()
    }
}

// ============================================
// Journal
// ============================================

/// A stored journal entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: i64,
    pub entry_text: String,
    pub mood_score: i32,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a journal entry.
#[derive(Debug, Clone)]
pub struct NewJournalEntry<'a> {
    pub entry_text: &'a str,
    pub mood_score: i32,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_patch() {
        assert!(ContextPatch::default().is_empty());

        let patch = ContextPatch {
            goals: vec!["run".to_string()],
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }

    #[test]
    fn test_context_deserializes_missing_fields_as_empty() {
        let ctx: Context = serde_json::from_str(r#"{"id": 3}"#).unwrap();
        assert_eq!(ctx, Context::empty(3));
    }

    #[test]
    fn test_blank_title_is_not_a_title() {
        let event = EventCandidate {
            is_event: true,
            title: "   ".to_string(),
            start_time: None,
            duration_hours: None,
            recurrence: None,
            description: None,
        };
        assert!(!event.has_title());
    }
}
