//! Timestamp normalization for event start times.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};

use crate::error::{Error, Result};

/// Accepted timestamp layouts, tried in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Offset-aware RFC 3339 (`2024-01-02T15:04:05+03:00`)
    Rfc3339,
    /// UTC with a literal `Z` and no offset (`2024-01-02T15:04:05Z`)
    UtcSuffixed,
}

pub const LAYOUTS: &[Layout] = &[Layout::Rfc3339, Layout::UtcSuffixed];

impl Layout {
    fn parse(self, value: &str) -> Option<DateTime<FixedOffset>> {
        match self {
            Layout::Rfc3339 => DateTime::parse_from_rfc3339(value).ok(),
            Layout::UtcSuffixed => NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%SZ")
                .ok()
                .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc).into()),
        }
    }
}

/// Parse `value` with the first matching layout.
///
/// The offset is kept exactly as the layout encodes it.
pub fn normalize(value: &str) -> Result<DateTime<FixedOffset>> {
    let trimmed = value.trim();
    LAYOUTS
        .iter()
        .find_map(|layout| layout.parse(trimmed))
        .ok_or_else(|| Error::TimestampFormat {
            value: value.to_string(),
        })
}
