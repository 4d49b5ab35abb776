//! Chat orchestration.
//!
//! One turn: build a prompt from the stored context and calendar preview,
//! ask the LLM, split the reply into prose and structured data, apply the
//! side effects, render a response.
//!
//! ```text
//! ReceiveMessage → BuildPrompt → AwaitLLM → Extract → ApplySideEffects → Respond
//! ```
//!
//! Only an empty message, a bad request shape or an LLM failure fails the
//! turn. Broken structured data, calendar failures and storage failures on
//! the write path are logged and the user still gets the prose.

mod prompt;
mod render;

pub use prompt::{build_prompt, PromptInputs};
pub use render::{duration_phrase, html_escape, render_html, render_json};

use std::sync::Arc;

use serde_json::{json, Value};

use crate::calendar::CalendarStore;
use crate::config::ChatConfig;
use crate::db::{ContextStore, EventArchive};
use crate::error::{Error, Result};
use crate::llm::LlmClient;
use crate::merge::merge_with_limit;
use crate::protocol::{
    CalendarEventExtractor, ContextUpdateExtractor, Grammar, ParsedReply, ReplyExtractor,
};
use crate::types::{Context, ContextPatch, EventCandidate};

/// Collaborators of the chat orchestrator.
pub struct ChatDeps {
    pub llm: Arc<dyn LlmClient>,
    pub contexts: Arc<dyn ContextStore>,
    pub calendar: Arc<dyn CalendarStore>,
    /// Local copy of every event handed to the calendar
    pub archive: Option<Arc<dyn EventArchive>>,
}

/// Result of one chat turn, before rendering.
#[derive(Debug, Clone, Default)]
pub struct ChatOutcome {
    /// Answer text for the user
    pub prose: String,
    /// Events decoded from the reply
    pub events: Vec<EventCandidate>,
    /// Ids assigned by the calendar to events created this turn
    pub created_ids: Vec<String>,
    /// Context after merging, when it was updated and saved
    pub context: Option<Context>,
    /// Preview text fed into the prompt
    pub calendar_preview: Option<String>,
    /// Decode failures of structured segments
    pub parse_errors: Vec<String>,
}

/// Transport-neutral view of an inbound chat request.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub method: String,
    pub content_type: Option<String>,
    /// Caller is the embedded web UI (`HX-Request: true`)
    pub hx_request: bool,
    pub body: String,
}

impl ChatRequest {
    /// A POST with a JSON `{"text": ..}` body.
    pub fn json_text(text: &str, hx_request: bool) -> Self {
        Self {
            method: "POST".to_string(),
            content_type: Some("application/json".to_string()),
            hx_request,
            body: json!({ "text": text }).to_string(),
        }
    }

    /// Extract the user's message from the body.
    pub fn message(&self) -> Result<String> {
        let content_type = self.content_type.as_deref().unwrap_or_default();
        let message = if content_type.contains("application/json") {
            json_message(&self.body)?
        } else {
            form_message(&self.body)?
        };

        let message = message.trim();
        if message.is_empty() {
            return Err(Error::EmptyInput);
        }
        Ok(message.to_string())
    }
}

/// `text` field of a JSON object, key matched case-insensitively.
fn json_message(body: &str) -> Result<String> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| Error::BadRequest(format!("invalid JSON format: {e}")))?;
    let object = value
        .as_object()
        .ok_or_else(|| Error::BadRequest("expected a JSON object".to_string()))?;

    match object.iter().find(|(key, _)| key.eq_ignore_ascii_case("text")) {
        None | Some((_, Value::Null)) => Ok(String::new()),
        Some((_, Value::String(text))) => Ok(text.clone()),
        Some((key, _)) => Err(Error::BadRequest(format!("`{key}` must be a string"))),
    }
}

/// `message` field of a url-encoded form, falling back to `text`.
fn form_message(body: &str) -> Result<String> {
    let mut message = None;
    let mut text = None;

    for pair in body.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let slot = match form_decode(key)?.as_str() {
            "message" => &mut message,
            "text" => &mut text,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(form_decode(value)?);
        }
    }

    Ok(message
        .filter(|m| !m.is_empty())
        .or(text)
        .unwrap_or_default())
}

fn form_decode(raw: &str) -> Result<String> {
    urlencoding::decode(&raw.replace('+', " "))
        .map(|s| s.into_owned())
        .map_err(|e| Error::BadRequest(format!("invalid form encoding: {e}")))
}

/// Rendered response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl ChatResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn error(error: &Error) -> Self {
        let message = match error {
            Error::EmptyInput => "No message provided".to_string(),
            Error::Llm(_) => "AI service error".to_string(),
            other => other.to_string(),
        };
        Self {
            status: error.status_code(),
            content_type: "application/json",
            body: json!({ "error": message }).to_string(),
        }
    }
}

/// The chat orchestrator.
pub struct ChatService {
    deps: ChatDeps,
    config: ChatConfig,
    preview_days: u32,
    grammar: Grammar,
}

impl ChatService {
    pub fn new(deps: ChatDeps, config: ChatConfig, preview_days: u32) -> Self {
        Self {
            deps,
            config,
            preview_days,
            grammar: Grammar::V1,
        }
    }

    /// Handle a request end to end, never failing: errors become error responses.
    pub fn handle(&self, request: &ChatRequest) -> ChatResponse {
        tracing::info!(method = %request.method, hx = request.hx_request, "Chat request");

        if !request.method.eq_ignore_ascii_case("POST") {
            return ChatResponse::error(&Error::MethodNotAllowed(request.method.clone()));
        }

        let outcome = request.message().and_then(|message| self.chat(&message));
        match outcome {
            Ok(outcome) if request.hx_request => ChatResponse {
                status: 200,
                content_type: "text/html; charset=utf-8",
                body: render_html(&outcome),
            },
            Ok(outcome) => ChatResponse {
                status: 200,
                content_type: "application/json",
                body: render_json(&outcome),
            },
            Err(e) => {
                tracing::warn!(error = %e, "Chat request failed");
                ChatResponse::error(&e)
            }
        }
    }

    /// Run one chat turn for `message`.
    pub fn chat(&self, message: &str) -> Result<ChatOutcome> {
        let message = message.trim();
        if message.is_empty() {
            return Err(Error::EmptyInput);
        }

        let mode = self.config.mode;
        let context = if mode.uses_context() {
            Some(self.load_context()?)
        } else {
            None
        };
        let calendar_preview = mode
            .uses_calendar()
            .then(|| self.deps.calendar.preview(self.preview_days));
        if let Some(preview) = &calendar_preview {
            tracing::debug!(chars = preview.chars().count(), "Calendar preview loaded");
        }

        let prompt = build_prompt(
            &self.grammar,
            &PromptInputs {
                mode,
                context: context.as_ref(),
                calendar_preview: calendar_preview.as_deref(),
                message,
            },
        );
        let reply = self.deps.llm.generate(&prompt)?;

        let mut outcome = ChatOutcome {
            calendar_preview,
            ..Default::default()
        };

        let calendar = mode
            .uses_calendar()
            .then(|| CalendarEventExtractor::with_grammar(self.grammar).extract(&reply));
        let update = mode
            .uses_context()
            .then(|| ContextUpdateExtractor::with_grammar(self.grammar).extract(&reply));

        outcome.prose = match (&calendar, &update) {
            (Some(parsed), None) => parsed.prose.clone(),
            (None, Some(parsed)) => parsed.prose.clone(),
            _ => self.grammar.prose(&reply),
        };

        if let Some(parsed) = calendar {
            let events = self.take_payload(parsed, &mut outcome.parse_errors);
            outcome.created_ids = self.create_events(&events);
            outcome.events = events;
        }

        if let (Some(parsed), Some(old)) = (update, context.as_ref()) {
            let patch = self.take_payload(parsed, &mut outcome.parse_errors);
            outcome.context = self.apply_patch(old, &patch);
        }

        tracing::info!(
            events = outcome.events.len(),
            created = outcome.created_ids.len(),
            context_updated = outcome.context.is_some(),
            "Chat turn complete"
        );
        Ok(outcome)
    }

    fn load_context(&self) -> Result<Context> {
        let id = self.config.context_id;
        Ok(self
            .deps
            .contexts
            .get(id)?
            .unwrap_or_else(|| Context::empty(id)))
    }

    fn take_payload<T>(&self, parsed: ParsedReply<T>, errors: &mut Vec<String>) -> T {
        if let Some(e) = parsed.error {
            tracing::warn!(error = %e, "Structured segment dropped");
            errors.push(e.to_string());
        }
        parsed.payload
    }

    /// Create every titled event; one failure does not stop the others.
    fn create_events(&self, events: &[EventCandidate]) -> Vec<String> {
        let mut created = Vec::new();

        for event in events {
            if !event.has_title() {
                tracing::warn!(?event, "Skipping event without title");
                continue;
            }

            let external_id = match self.deps.calendar.create_event(event) {
                Ok(id) => {
                    tracing::info!(title = %event.title, id = %id, "Event created");
                    created.push(id.clone());
                    Some(id)
                }
                Err(e) => {
                    tracing::error!(title = %event.title, error = %e, "Failed to create event");
                    None
                }
            };

            if let Some(archive) = &self.deps.archive {
                if let Err(e) = archive.record_event(event, external_id.as_deref()) {
                    tracing::error!(title = %event.title, error = %e, "Failed to archive event");
                }
            }
        }

        created
    }

    /// Merge and persist a patch, returning the saved context.
    fn apply_patch(&self, old: &Context, patch: &ContextPatch) -> Option<Context> {
        if patch.is_empty() {
            return None;
        }

        let merged = merge_with_limit(old, patch, self.config.recent_limit);
        match self.deps.contexts.save(&merged) {
            Ok(()) => {
                tracing::info!(id = merged.id, "Context saved");
                Some(merged)
            }
            Err(e) => {
                tracing::error!(id = merged.id, error = %e, "Failed to save context");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChatMode;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct ScriptedLlm {
        reply: Result<String>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err(Error::Llm("timeout".to_string())),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    impl LlmClient for ScriptedLlm {
        fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match &self.reply {
                Ok(reply) => Ok(reply.clone()),
                Err(_) => Err(Error::Llm("timeout".to_string())),
            }
        }
    }

    #[derive(Default)]
    struct MemoryContexts {
        records: Mutex<HashMap<i64, Context>>,
        fail_save: bool,
    }

    impl ContextStore for MemoryContexts {
        fn get(&self, id: i64) -> Result<Option<Context>> {
            Ok(self.records.lock().unwrap().get(&id).cloned())
        }

        fn save(&self, context: &Context) -> Result<()> {
            if self.fail_save {
                return Err(Error::Config("read-only store".to_string()));
            }
            self.records
                .lock()
                .unwrap()
                .insert(context.id, context.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingCalendar {
        created: Mutex<Vec<EventCandidate>>,
        fail_titles: Vec<String>,
    }

    impl CalendarStore for RecordingCalendar {
        fn preview(&self, _days: u32) -> String {
            "No events".to_string()
        }

        fn create_event(&self, event: &EventCandidate) -> Result<String> {
            if self.fail_titles.contains(&event.title) {
                return Err(Error::Calendar("quota exceeded".to_string()));
            }
            let mut created = self.created.lock().unwrap();
            created.push(event.clone());
            Ok(format!("evt-{}", created.len()))
        }
    }

    fn service(
        llm: Arc<ScriptedLlm>,
        contexts: Arc<MemoryContexts>,
        calendar: Arc<RecordingCalendar>,
        mode: ChatMode,
    ) -> ChatService {
        ChatService::new(
            ChatDeps {
                llm,
                contexts,
                calendar,
                archive: None,
            },
            ChatConfig {
                mode,
                ..Default::default()
            },
            5,
        )
    }

    #[test]
    fn calendar_turn_creates_titled_events_only() {
        let calendar = Arc::new(RecordingCalendar::default());
        let chat = service(
            ScriptedLlm::replying(
                r#"Ответ: Записал.|||CALENDAR_EVENT|||[{"is_event":true,"title":"Gym","duration":1},{"is_event":true,"title":""}]"#,
            ),
            Arc::new(MemoryContexts::default()),
            calendar.clone(),
            ChatMode::Calendar,
        );

        let outcome = chat.chat("запиши зал").unwrap();
        assert_eq!(outcome.prose, "Записал.");
        assert_eq!(outcome.events.len(), 2);
        assert_eq!(outcome.created_ids, vec!["evt-1".to_string()]);
        assert_eq!(calendar.created.lock().unwrap()[0].title, "Gym");
        assert!(outcome.context.is_none());
    }

    #[test]
    fn calendar_failure_does_not_stop_other_events() {
        let calendar = Arc::new(RecordingCalendar {
            fail_titles: vec!["A".to_string()],
            ..Default::default()
        });
        let chat = service(
            ScriptedLlm::replying(
                r#"ok|||CALENDAR_EVENT|||[{"is_event":true,"title":"A"},{"is_event":true,"title":"B"}]"#,
            ),
            Arc::new(MemoryContexts::default()),
            calendar.clone(),
            ChatMode::Calendar,
        );

        let outcome = chat.chat("two events").unwrap();
        assert_eq!(outcome.created_ids, vec!["evt-1".to_string()]);
        assert_eq!(calendar.created.lock().unwrap()[0].title, "B");
    }

    #[test]
    fn malformed_payload_keeps_prose() {
        let chat = service(
            ScriptedLlm::replying(
                r#"Готово|||CALENDAR_EVENT|||{"is_event":true,"title":"X","start_time":"not-a-date"}"#,
            ),
            Arc::new(MemoryContexts::default()),
            Arc::new(RecordingCalendar::default()),
            ChatMode::Calendar,
        );

        let outcome = chat.chat("hi").unwrap();
        assert_eq!(outcome.prose, "Готово");
        assert!(outcome.events.is_empty());
        assert_eq!(outcome.parse_errors.len(), 1);
    }

    #[test]
    fn context_turn_merges_and_saves() {
        let contexts = Arc::new(MemoryContexts::default());
        let mut stored = Context::empty(1);
        stored.progress.insert("a".to_string(), "1".to_string());
        contexts.save(&stored).unwrap();

        let llm = ScriptedLlm::replying("Ответ: Done|||UPDATE_DATA|||Цели: A, B\nПрогресс: x:1, a:2");
        let chat = service(
            llm.clone(),
            contexts.clone(),
            Arc::new(RecordingCalendar::default()),
            ChatMode::Context,
        );

        let outcome = chat.chat("update").unwrap();
        assert_eq!(outcome.prose, "Done");

        let saved = contexts.get(1).unwrap().unwrap();
        assert_eq!(saved.goals, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(saved.progress.get("a").map(String::as_str), Some("2"));
        assert_eq!(saved.progress.get("x").map(String::as_str), Some("1"));
        assert_eq!(outcome.context, Some(saved));

        let prompt = llm.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("Прогресс: a:1"));
    }

    #[test]
    fn empty_patch_is_not_saved() {
        let contexts = Arc::new(MemoryContexts::default());
        let chat = service(
            ScriptedLlm::replying("just prose"),
            contexts.clone(),
            Arc::new(RecordingCalendar::default()),
            ChatMode::Context,
        );

        let outcome = chat.chat("hello").unwrap();
        assert_eq!(outcome.prose, "just prose");
        assert!(outcome.context.is_none());
        assert!(contexts.get(1).unwrap().is_none());
    }

    #[test]
    fn save_failure_is_not_fatal() {
        let contexts = Arc::new(MemoryContexts {
            fail_save: true,
            ..Default::default()
        });
        let chat = service(
            ScriptedLlm::replying("ok|||UPDATE_DATA|||Цели: A"),
            contexts,
            Arc::new(RecordingCalendar::default()),
            ChatMode::Context,
        );

        let outcome = chat.chat("hello").unwrap();
        assert_eq!(outcome.prose, "ok");
        assert!(outcome.context.is_none());
    }

    #[test]
    fn both_mode_splits_segments() {
        let calendar = Arc::new(RecordingCalendar::default());
        let contexts = Arc::new(MemoryContexts::default());
        let chat = service(
            ScriptedLlm::replying(
                "Ответ: Хорошо|||CALENDAR_EVENT|||{\"is_event\":true,\"title\":\"Run\"}|||UPDATE_DATA|||Недавние действия: бег",
            ),
            contexts.clone(),
            calendar.clone(),
            ChatMode::Both,
        );

        let outcome = chat.chat("бегал").unwrap();
        assert_eq!(outcome.prose, "Хорошо");
        assert_eq!(outcome.created_ids.len(), 1);
        assert_eq!(
            contexts.get(1).unwrap().unwrap().recent5,
            vec!["бег".to_string()]
        );
        assert!(outcome.parse_errors.is_empty());
    }

    #[test]
    fn llm_failure_is_fatal() {
        let chat = service(
            ScriptedLlm::failing(),
            Arc::new(MemoryContexts::default()),
            Arc::new(RecordingCalendar::default()),
            ChatMode::Calendar,
        );

        let response = chat.handle(&ChatRequest::json_text("hi", false));
        assert_eq!(response.status, 500);
        assert!(response.body.contains("AI service error"));
    }

    #[test]
    fn handle_rejects_bad_requests() {
        let llm = ScriptedLlm::replying("unused");
        let chat = service(
            llm.clone(),
            Arc::new(MemoryContexts::default()),
            Arc::new(RecordingCalendar::default()),
            ChatMode::Calendar,
        );

        let get = ChatRequest {
            method: "GET".to_string(),
            ..Default::default()
        };
        assert_eq!(chat.handle(&get).status, 405);

        let empty = ChatRequest::json_text("   ", false);
        let response = chat.handle(&empty);
        assert_eq!(response.status, 400);
        assert!(response.body.contains("No message provided"));

        let broken = ChatRequest {
            body: "{not json".to_string(),
            ..ChatRequest::json_text("", false)
        };
        assert_eq!(chat.handle(&broken).status, 400);

        assert!(llm.prompts.lock().unwrap().is_empty());
    }

    #[test]
    fn handle_renders_by_caller() {
        let chat = service(
            ScriptedLlm::replying("Привет"),
            Arc::new(MemoryContexts::default()),
            Arc::new(RecordingCalendar::default()),
            ChatMode::Calendar,
        );

        let json = chat.handle(&ChatRequest::json_text("hi", false));
        assert!(json.is_success());
        assert_eq!(json.content_type, "application/json");
        let body: Value = serde_json::from_str(&json.body).unwrap();
        assert_eq!(body["response"], "Привет");

        let html = chat.handle(&ChatRequest::json_text("hi", true));
        assert!(html.content_type.starts_with("text/html"));
        assert!(html.body.contains("Привет"));
    }

    #[test]
    fn request_message_decoding() {
        let json = ChatRequest {
            body: r#"{"Text": "hello"}"#.to_string(),
            ..ChatRequest::json_text("", false)
        };
        assert_eq!(json.message().unwrap(), "hello");

        let form = ChatRequest {
            method: "POST".to_string(),
            content_type: Some("application/x-www-form-urlencoded".to_string()),
            body: "message=&text=%D0%BF%D1%80%D0%B8%D0%B2%D0%B5%D1%82+%D0%BC%D0%B8%D1%80".to_string(),
            ..Default::default()
        };
        assert_eq!(form.message().unwrap(), "привет мир");

        let form = ChatRequest {
            body: "message=a%2Bb&text=ignored".to_string(),
            ..form
        };
        assert_eq!(form.message().unwrap(), "a+b");

        let missing = ChatRequest {
            body: "other=1".to_string(),
            ..form
        };
        assert!(matches!(missing.message(), Err(Error::EmptyInput)));
    }
}
