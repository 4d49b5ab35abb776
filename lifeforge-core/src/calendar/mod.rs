//! Calendar collaborators.
//!
//! The chat orchestrator reads a short textual preview of upcoming events and
//! creates events decoded from model replies. [`GoogleCalendar`] talks to the
//! Google Calendar v3 API; [`DisconnectedCalendar`] stands in when no
//! credentials are configured.

mod google;

pub use google::{EventDateTime, GoogleCalendar, GoogleEventBody};

use crate::config::CalendarConfig;
use crate::error::{Error, Result};
use crate::types::EventCandidate;

/// External calendar used by the chat orchestrator.
pub trait CalendarStore: Send + Sync {
    /// Human-readable summary of events in the next `days` days.
    ///
    /// Never fails: load errors are reported inside the returned text so the
    /// model still gets a prompt.
    fn preview(&self, days: u32) -> String;

    /// Materialise `event`, returning the id the calendar assigned.
    fn create_event(&self, event: &EventCandidate) -> Result<String>;
}

/// Build the configured calendar.
///
/// A disabled calendar, or one whose token cannot be resolved, yields a
/// [`DisconnectedCalendar`].
pub fn create_calendar(config: &CalendarConfig) -> Result<Box<dyn CalendarStore>> {
    if !config.enabled {
        return Ok(Box::new(DisconnectedCalendar));
    }

    match config.resolve_access_token() {
        Ok(token) => Ok(Box::new(GoogleCalendar::new(config, token)?)),
        Err(e) => {
            tracing::warn!(error = %e, "Calendar enabled but no access token, running disconnected");
            Ok(Box::new(DisconnectedCalendar))
        }
    }
}

/// Calendar used when Google credentials are missing.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisconnectedCalendar;

const NOT_CONNECTED: &str = "calendar is not connected";

impl CalendarStore for DisconnectedCalendar {
    fn preview(&self, _days: u32) -> String {
        format!("Error to load calendar: {NOT_CONNECTED}")
    }

    fn create_event(&self, _event: &EventCandidate) -> Result<String> {
        Err(Error::Calendar(NOT_CONNECTED.to_string()))
    }
}

/// One upcoming event as shown in the preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewItem {
    /// Start as the calendar reported it (date-time, or date for all-day events)
    pub start: String,
    pub summary: String,
}

/// Render the preview text fed into prompts.
pub fn format_preview(items: &[PreviewItem]) -> String {
    if items.is_empty() {
        return "No events".to_string();
    }

    let mut preview = String::from("Closest events:\n");
    for item in items {
        preview.push_str(&format!("- {}: {}\n", item.start, item.summary));
    }
    preview
}
