//! Response rendering for the two caller kinds: the embedded web UI gets an
//! HTML fragment, everything else a JSON object.

use serde_json::json;

use super::ChatOutcome;
use crate::types::EventCandidate;

const EMPTY_PROSE: &str = "✅ Task completed!";

/// Minimum preview length counted as "the calendar had something to say".
const PREVIEW_THRESHOLD: usize = 50;

/// JSON reply object.
pub fn render_json(outcome: &ChatOutcome) -> String {
    let response = if outcome.prose.is_empty() {
        EMPTY_PROSE
    } else {
        outcome.prose.as_str()
    };

    let mut body = json!({
        "response": response,
        "events_count": outcome.events.len(),
        "calendar_preview": outcome
            .calendar_preview
            .as_ref()
            .is_some_and(|p| p.len() > PREVIEW_THRESHOLD),
        "status": "success",
    });

    if let Some(context) = &outcome.context {
        body["context"] = json!(context);
    }
    if !outcome.created_ids.is_empty() {
        body["created_event_ids"] = json!(outcome.created_ids);
    }

    body.to_string()
}

/// HTML fragment for the embedded UI.
pub fn render_html(outcome: &ChatOutcome) -> String {
    format!(
        r#"
<div class="message p-4 rounded-2xl bg-gradient-to-r from-green-100 to-emerald-50 border border-green-200 max-w-3xl animate-slide-in mb-4">
    <div class="mb-1 font-semibold text-green-800">🤖 LifeForge AI:</div>
    <div class="text-gray-800">{}</div>
    {}
</div>"#,
        html_escape(&outcome.prose),
        events_html(&outcome.events)
    )
}

fn events_html(events: &[EventCandidate]) -> String {
    let titled: Vec<&EventCandidate> = events.iter().filter(|e| e.has_title()).collect();
    if titled.is_empty() {
        return r#"<div class="mt-2 text-xs text-green-600">✅ Calendar checked, dont need new events</div>"#
            .to_string();
    }

    let mut html = String::from(r#"<div class="mt-3 pt-3 border-t border-green-200 space-y-2">"#);
    html.push_str(r#"<div class="text-sm font-semibold text-green-700">📅 Created events:</div>"#);

    for (i, event) in titled.iter().enumerate() {
        let when = event
            .start_time
            .map(|t| t.format("%d.%m в %H:%M").to_string())
            .unwrap_or_else(|| "сегодня".to_string());
        let duration = event
            .duration_hours
            .map(duration_phrase)
            .unwrap_or_default();

        html.push_str(&format!(
            r#"
    <div class="p-2 bg-green-50 rounded-lg border border-green-200">
        <div class="font-medium text-green-800">{}. {}</div>
        <div class="text-xs text-green-600">⏰ {} • {}</div>
    </div>"#,
            i + 1,
            html_escape(&event.title),
            when,
            duration
        ));
    }

    html.push_str("</div>");
    html
}

/// Russian phrase for a duration given in hours.
pub fn duration_phrase(hours: f64) -> String {
    if hours == 1.0 {
        "1 час".to_string()
    } else if hours < 1.0 {
        format!("{:.0} минут", hours * 60.0)
    } else {
        format!("{:.1} часа", hours)
    }
}

pub fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
