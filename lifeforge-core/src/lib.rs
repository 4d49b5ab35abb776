//! # lifeforge-core
//!
//! Core library for lifeforge - a personal assistant that turns LLM replies
//! into calendar events and long-lived user context.
//!
//! This library provides:
//! - The reply protocol: sentinels, labels and the extractors that split a
//!   reply into prose and structured data
//! - Context merging and the chat orchestrator
//! - LLM and Google Calendar clients
//! - Database storage layer with SQLite (context, journal, event archive)
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Example
//!
//! ```rust,no_run
//! use lifeforge_core::protocol::{CalendarEventExtractor, ReplyExtractor};
//!
//! let reply = r#"Ответ: Записал!|||CALENDAR_EVENT|||{"is_event": true, "title": "Gym"}"#;
//! let parsed = CalendarEventExtractor::new().extract(reply);
//! assert_eq!(parsed.prose, "Записал!");
//! assert_eq!(parsed.payload[0].title, "Gym");
//! ```

// Re-export commonly used items at the crate root
pub use chat::{ChatDeps, ChatOutcome, ChatRequest, ChatResponse, ChatService};
pub use config::Config;
pub use db::{ContextStore, Database, EventArchive};
pub use error::{Error, Result};
pub use merge::merge;
pub use types::*;

// Public modules
pub mod calendar;
pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod logging;
pub mod merge;
pub mod protocol;
pub mod types;
