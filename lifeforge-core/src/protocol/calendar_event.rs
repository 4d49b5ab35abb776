//! Calendar-event extractor
//!
//! Decodes replies of the form:
//!
//! ```text
//! Ответ: <prose>
//! |||CALENDAR_EVENT|||
//! {"is_event": true, "title": "Gym", "start_time": "2024-01-02T15:04:05Z", "duration": 1.5}
//! |||CALENDAR_EVENT|||
//! ```
//!
//! The payload is a single event object or an array of them.
//!
//! # Error Handling
//!
//! - **No sentinel, empty payload, `null`, `{}` or `[]`**: no events, no error.
//!   This is the common "nothing to schedule" answer.
//! - **Markdown code fence around the JSON**: unwrapped before decoding.
//! - **`is_event: false` or `null`, or a `null` array element**: record
//!   skipped silently.
//! - **Bad JSON or bad `start_time`**: the whole payload is dropped and
//!   [`Error::MalformedPayload`] is reported next to the prose.

use serde::Deserialize;

use super::{timestamp, Grammar, ParsedReply, ReplyExtractor};
use crate::error::{Error, Result};
use crate::types::EventCandidate;

/// Event record exactly as the LLM writes it.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct WireEvent {
    /// `null` or absent means not an event
    pub is_event: Option<bool>,
    pub title: Option<String>,
    pub start_time: Option<String>,
    /// Hours
    pub duration: Option<f64>,
    pub recurrence: Option<String>,
    pub description: Option<String>,
}

impl WireEvent {
    /// Convert into a domain candidate.
    ///
    /// Returns `Ok(None)` for records that are not events. A `start_time`
    /// matching no accepted layout is an error; a non-positive duration is
    /// treated as absent.
    pub fn into_candidate(self) -> Result<Option<EventCandidate>> {
        if !self.is_event.unwrap_or(false) {
            return Ok(None);
        }

        let title = self.title.unwrap_or_default();
        let start_time = match self.start_time.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(timestamp::normalize(raw).map_err(|e| {
                Error::MalformedPayload(format!("event {:?}: {}", title, e))
            })?),
            _ => None,
        };

        Ok(Some(EventCandidate {
            is_event: true,
            title,
            start_time,
            duration_hours: self.duration.filter(|h| h.is_finite() && *h > 0.0),
            recurrence: self.recurrence.filter(|r| !r.trim().is_empty()),
            description: self.description,
        }))
    }
}

/// Extractor for `|||CALENDAR_EVENT|||` replies.
#[derive(Debug, Clone, Copy, Default)]
pub struct CalendarEventExtractor {
    grammar: Grammar,
}

impl CalendarEventExtractor {
    /// Create an extractor for the current grammar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an extractor for a specific grammar version.
    pub fn with_grammar(grammar: Grammar) -> Self {
        Self { grammar }
    }

    /// Decode a non-empty JSON payload into accepted events.
    fn decode(&self, payload: &str) -> Result<Vec<EventCandidate>> {
        let records: Vec<Option<WireEvent>> = if payload.starts_with('[') {
            serde_json::from_str(payload)
        } else {
            serde_json::from_str::<WireEvent>(payload).map(|record| vec![Some(record)])
        }
        .map_err(|e| Error::MalformedPayload(format!("invalid event JSON: {}", e)))?;

        let mut events = Vec::with_capacity(records.len());
        for record in records.into_iter().flatten() {
            if let Some(event) = record.into_candidate()? {
                events.push(event);
            }
        }
        Ok(events)
    }
}

impl ReplyExtractor for CalendarEventExtractor {
    type Payload = Vec<EventCandidate>;

    fn extract(&self, reply: &str) -> ParsedReply<Vec<EventCandidate>> {
        let Some(segment) = self.grammar.segment(reply, self.grammar.calendar_sentinel) else {
            return ParsedReply::unstructured(reply);
        };

        let prose = self.grammar.prose(reply);
        let payload = unwrap_code_fence(segment);

        if is_empty_payload(payload) {
            return ParsedReply {
                prose,
                payload: Vec::new(),
                error: None,
            };
        }

        match self.decode(payload) {
            Ok(events) => ParsedReply {
                prose,
                payload: events,
                error: None,
            },
            Err(e) => ParsedReply {
                prose,
                payload: Vec::new(),
                error: Some(e),
            },
        }
    }
}

/// Empty, `null`, `{}` or `[]`, ignoring whitespace.
fn is_empty_payload(payload: &str) -> bool {
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    matches!(compact.as_str(), "" | "null" | "{}" | "[]")
}

/// Strip a surrounding Markdown code fence and its language tag.
fn unwrap_code_fence(payload: &str) -> &str {
    let trimmed = payload.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    inner
        .trim_start_matches(|c: char| c.is_ascii_alphabetic())
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn extract(reply: &str) -> ParsedReply<Vec<EventCandidate>> {
        CalendarEventExtractor::new().extract(reply)
    }

    #[test]
    fn test_reply_without_sentinel() {
        let parsed = extract("  No plans needed.  ");
        assert_eq!(parsed.prose, "No plans needed.");
        assert!(parsed.payload.is_empty());
        assert!(parsed.error.is_none());
    }

    #[test]
    fn test_empty_payloads_are_not_errors() {
        for payload in ["", "   ", "null", "{}", "[]", "[ ]", "{\n}", "```json\n[]\n```"] {
            let reply = format!("Ответ: ok|||CALENDAR_EVENT|||{}|||CALENDAR_EVENT|||", payload);
            let parsed = extract(&reply);
            assert_eq!(parsed.prose, "ok", "payload {:?}", payload);
            assert!(parsed.payload.is_empty(), "payload {:?}", payload);
            assert!(parsed.error.is_none(), "payload {:?}", payload);
        }
    }

    #[test]
    fn test_single_event() {
        let reply = r#"Ответ: Booked.
|||CALENDAR_EVENT|||
{"is_event": true, "title": "Gym", "start_time": "2024-01-02T15:04:05Z", "duration": 1.5}
|||CALENDAR_EVENT|||"#;
        let parsed = extract(reply);
        assert_eq!(parsed.prose, "Booked.");
        assert!(parsed.error.is_none());
        assert_eq!(parsed.payload.len(), 1);

        let event = &parsed.payload[0];
        assert_eq!(event.title, "Gym");
        assert_eq!(event.duration_hours, Some(1.5));
        assert_eq!(
            event.start_time.unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 2, 15, 4, 5).unwrap()
        );
        assert!(event.recurrence.is_none());
    }

    #[test]
    fn test_array_filters_non_events() {
        let reply = r#"ok|||CALENDAR_EVENT|||[{"is_event":false,"title":"Chat"},{"is_event":true,"title":"Call"}]"#;
        let parsed = extract(reply);
        assert!(parsed.error.is_none());
        assert_eq!(parsed.payload.len(), 1);
        assert_eq!(parsed.payload[0].title, "Call");
        assert!(parsed.payload[0].start_time.is_none());
    }

    #[test]
    fn test_single_non_event() {
        let parsed = extract(r#"hi|||CALENDAR_EVENT|||{"is_event": false, "title": "x"}"#);
        assert!(parsed.payload.is_empty());
        assert!(parsed.error.is_none());
    }

    #[test]
    fn test_bad_start_time_keeps_prose() {
        let reply = r#"Ответ: Sure thing|||CALENDAR_EVENT|||{"is_event":true,"title":"Gym","start_time":"not-a-date"}"#;
        let parsed = extract(reply);
        assert_eq!(parsed.prose, "Sure thing");
        assert!(parsed.payload.is_empty());
        assert!(matches!(parsed.error, Some(Error::MalformedPayload(_))));
    }

    #[test]
    fn test_invalid_json_keeps_prose() {
        let parsed = extract("Will do|||CALENDAR_EVENT|||{\"is_event\": true, \"title\": ");
        assert_eq!(parsed.prose, "Will do");
        assert!(parsed.payload.is_empty());
        assert!(matches!(parsed.error, Some(Error::MalformedPayload(_))));
    }

    #[test]
    fn test_trailing_text_after_second_sentinel_ignored() {
        let reply = r#"a|||CALENDAR_EVENT|||{"is_event":true,"title":"Run"}|||CALENDAR_EVENT|||garbage {"#;
        let parsed = extract(reply);
        assert!(parsed.error.is_none());
        assert_eq!(parsed.payload.len(), 1);
    }

    #[test]
    fn test_fenced_payload() {
        let reply = "a|||CALENDAR_EVENT|||\n```json\n{\"is_event\":true,\"title\":\"Dentist\",\"recurrence\":\"WEEKLY\"}\n```";
        let parsed = extract(reply);
        assert!(parsed.error.is_none());
        assert_eq!(parsed.payload[0].title, "Dentist");
        assert_eq!(parsed.payload[0].recurrence.as_deref(), Some("WEEKLY"));
    }

    #[test]
    fn test_empty_title_is_decoded() {
        let parsed = extract(r#"a|||CALENDAR_EVENT|||{"is_event":true}"#);
        assert_eq!(parsed.payload.len(), 1);
        assert!(!parsed.payload[0].has_title());
    }

    #[test]
    fn test_non_positive_duration_is_absent() {
        let record = WireEvent {
            is_event: Some(true),
            title: Some("Nap".to_string()),
            duration: Some(0.0),
            ..Default::default()
        };
        let event = record.into_candidate().unwrap().unwrap();
        assert!(event.duration_hours.is_none());
    }

    #[test]
    fn test_null_fields_decode() {
        let parsed = extract(
            r#"a|||CALENDAR_EVENT|||{"is_event":true,"title":"Call","start_time":null,"duration":null}"#,
        );
        assert!(parsed.error.is_none());
        assert_eq!(parsed.payload.len(), 1);
    }

    #[test]
    fn test_null_is_event_skips_record_only() {
        let reply = r#"ok|||CALENDAR_EVENT|||[{"is_event":null,"title":"x"},null,{"is_event":true,"title":"Call"}]"#;
        let parsed = extract(reply);
        assert!(parsed.error.is_none());
        assert_eq!(parsed.payload.len(), 1);
        assert_eq!(parsed.payload[0].title, "Call");

        let parsed = extract(r#"ok|||CALENDAR_EVENT|||{"is_event":null,"title":"x"}"#);
        assert!(parsed.error.is_none());
        assert!(parsed.payload.is_empty());
    }
}
