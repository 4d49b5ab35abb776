//! Google Calendar API v3 client.

use chrono::{DateTime, Duration, DurationRound, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use super::{format_preview, CalendarStore, PreviewItem};
use crate::config::CalendarConfig;
use crate::error::{Error, Result};
use crate::types::EventCandidate;

const CALENDAR_API: &str = "https://www.googleapis.com/calendar/v3";

// ============================================================================
// API types
// ============================================================================

#[derive(Debug, Deserialize)]
struct EventListResponse {
    #[serde(default)]
    items: Vec<ListedEvent>,
}

#[derive(Debug, Deserialize)]
struct ListedEvent {
    #[serde(default)]
    summary: Option<String>,
    start: Option<ListedDateTime>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListedDateTime {
    date_time: Option<String>,
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InsertedEvent {
    id: String,
}

/// Start or end of an event being created.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDateTime {
    pub date_time: String,
    pub time_zone: String,
}

/// Request body for `events.insert`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoogleEventBody {
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start: EventDateTime,
    pub end: EventDateTime,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recurrence: Vec<String>,
}

impl GoogleEventBody {
    /// Materialise a candidate.
    ///
    /// A missing start becomes the next full hour after `now`, a missing
    /// duration one hour. A duration that puts the end outside the
    /// representable range is an [`Error::Calendar`].
    pub fn from_candidate(
        candidate: &EventCandidate,
        now: DateTime<FixedOffset>,
        time_zone: &str,
    ) -> Result<Self> {
        let start = candidate.start_time.unwrap_or_else(|| next_full_hour(now));
        let hours = candidate.duration_hours.unwrap_or(1.0);
        let end = Duration::try_milliseconds((hours * 3_600_000.0).round() as i64)
            .and_then(|length| start.checked_add_signed(length))
            .ok_or_else(|| {
                Error::Calendar(format!(
                    "event {:?}: duration of {} hours is out of range",
                    candidate.title, hours
                ))
            })?;

        let recurrence = candidate
            .recurrence
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(|r| {
                if r.starts_with("RRULE:") {
                    r.to_string()
                } else {
                    format!("RRULE:FREQ={}", r.to_uppercase())
                }
            })
            .into_iter()
            .collect();

        Ok(Self {
            summary: candidate.title.clone(),
            description: candidate.description.clone(),
            start: EventDateTime {
                date_time: start.to_rfc3339(),
                time_zone: time_zone.to_string(),
            },
            end: EventDateTime {
                date_time: end.to_rfc3339(),
                time_zone: time_zone.to_string(),
            },
            recurrence,
        })
    }
}

fn next_full_hour(now: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    now.duration_trunc(Duration::hours(1)).unwrap_or(now) + Duration::hours(1)
}

// ============================================================================
// Client
// ============================================================================

/// Calendar backed by the Google Calendar REST API.
pub struct GoogleCalendar {
    access_token: String,
    calendar_id: String,
    time_zone: String,
    runtime: tokio::runtime::Runtime,
    http: reqwest::Client,
}

impl GoogleCalendar {
    pub fn new(config: &CalendarConfig, access_token: String) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Calendar(format!("failed to build tokio runtime: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| Error::Calendar(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            access_token,
            calendar_id: config.calendar_id.clone(),
            time_zone: config.time_zone.clone(),
            runtime,
            http,
        })
    }

    fn events_url(&self) -> String {
        format!(
            "{}/calendars/{}/events",
            CALENDAR_API,
            urlencoding::encode(&self.calendar_id)
        )
    }

    /// Upcoming single events between now and `days` days ahead.
    pub fn list_upcoming(&self, days: u32) -> Result<Vec<PreviewItem>> {
        let now = Utc::now();
        let time_min = now.to_rfc3339();
        let time_max = (now + Duration::days(i64::from(days))).to_rfc3339();

        self.runtime.block_on(async {
            let resp = self
                .http
                .get(self.events_url())
                .bearer_auth(&self.access_token)
                .query(&[
                    ("timeMin", time_min.as_str()),
                    ("timeMax", time_max.as_str()),
                    ("singleEvents", "true"),
                    ("orderBy", "startTime"),
                ])
                .send()
                .await
                .map_err(|e| Error::Calendar(format!("list request failed: {e}")))?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(Error::Calendar(format!(
                    "list returned {}: {}",
                    status.as_u16(),
                    body
                )));
            }

            let body: EventListResponse = resp
                .json()
                .await
                .map_err(|e| Error::Calendar(format!("list response decode failed: {e}")))?;

            Ok(body
                .items
                .into_iter()
                .map(|item| PreviewItem {
                    start: item
                        .start
                        .and_then(|s| s.date_time.or(s.date))
                        .unwrap_or_default(),
                    summary: item.summary.unwrap_or_default(),
                })
                .collect())
        })
    }
}

impl CalendarStore for GoogleCalendar {
    fn preview(&self, days: u32) -> String {
        match self.list_upcoming(days) {
            Ok(items) => format_preview(&items),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load calendar preview");
                format!("Error to load calendar: {e}")
            }
        }
    }

    fn create_event(&self, event: &EventCandidate) -> Result<String> {
        let body =
            GoogleEventBody::from_candidate(event, Utc::now().fixed_offset(), &self.time_zone)?;

        self.runtime.block_on(async {
            let resp = self
                .http
                .post(self.events_url())
                .bearer_auth(&self.access_token)
                .json(&body)
                .send()
                .await
                .map_err(|e| Error::Calendar(format!("insert request failed: {e}")))?;

            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                return Err(Error::Calendar(format!(
                    "insert returned {}: {}",
                    status.as_u16(),
                    text
                )));
            }

            let created: InsertedEvent = resp
                .json()
                .await
                .map_err(|e| Error::Calendar(format!("insert response decode failed: {e}")))?;
            tracing::info!(id = %created.id, summary = %body.summary, "Calendar event created");
            Ok(created.id)
        })
    }
}
