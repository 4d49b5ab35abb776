//! Database repository layer
//!
//! Provides query and insert operations for contexts, journal entries and the
//! event archive.

use crate::error::Result;
use crate::types::*;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use super::{ContextStore, EventArchive};

/// An archived event row.
#[derive(Debug, Clone, Serialize)]
pub struct ArchivedEvent {
    pub id: i64,
    pub event: EventCandidate,
    /// Id assigned by the external calendar, when creation succeeded
    pub external_id: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Database handle with connection pooling (single connection for now)
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.connection();
        super::schema::run_migrations(&conn)
    }

    /// Get the underlying connection (for advanced use)
    pub fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ============================================
    // Context operations
    // ============================================

    /// Get a context by id
    ///
    /// Missing or unreadable lists and maps load as empty containers.
    pub fn get_context(&self, id: i64) -> Result<Option<Context>> {
        let conn = self.connection();
        let context = conn
            .query_row(
                "SELECT id, goals, recent5, progress FROM contexts WHERE id = ?1",
                [id],
                Self::row_to_context,
            )
            .optional()?;
        Ok(context)
    }

    /// Insert or replace a context
    pub fn save_context(&self, context: &Context) -> Result<()> {
        let conn = self.connection();
        conn.execute(
            r#"
            INSERT INTO contexts (id, goals, recent5, progress, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                goals = excluded.goals,
                recent5 = excluded.recent5,
                progress = excluded.progress,
                updated_at = excluded.updated_at
            "#,
            params![
                context.id,
                serde_json::to_string(&context.goals)?,
                serde_json::to_string(&context.recent5)?,
                serde_json::to_string(&context.progress)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn row_to_context(row: &Row) -> rusqlite::Result<Context> {
        let goals: Option<String> = row.get("goals")?;
        let recent5: Option<String> = row.get("recent5")?;
        let progress: Option<String> = row.get("progress")?;

        Ok(Context {
            id: row.get("id")?,
            goals: decode_or_default(goals.as_deref(), "goals"),
            recent5: decode_or_default(recent5.as_deref(), "recent5"),
            progress: decode_or_default(progress.as_deref(), "progress"),
        })
    }

    // ============================================
    // Journal operations
    // ============================================

    /// Insert a journal entry, returning its id
    pub fn create_journal_entry(&self, entry: &NewJournalEntry<'_>) -> Result<i64> {
        let conn = self.connection();
        conn.execute(
            "INSERT INTO journal_entries (entry_text, mood_score, created_at) VALUES (?1, ?2, ?3)",
            params![
                entry.entry_text,
                entry.mood_score,
                entry.created_at.to_rfc3339()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// List the newest journal entries first
    pub fn list_journal_entries(&self, limit: usize) -> Result<Vec<JournalEntry>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, entry_text, mood_score, created_at
            FROM journal_entries
            ORDER BY created_at DESC, id DESC
            LIMIT ?1
            "#,
        )?;
        let entries = stmt
            .query_map([limit as i64], Self::row_to_journal_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    fn row_to_journal_entry(row: &Row) -> rusqlite::Result<JournalEntry> {
        let created_at_str: String = row.get("created_at")?;
        Ok(JournalEntry {
            id: row.get("id")?,
            entry_text: row.get("entry_text")?,
            mood_score: row.get("mood_score")?,
            created_at: parse_stored_timestamp(&created_at_str, "journal_entries.created_at"),
        })
    }

    // ============================================
    // Event archive operations
    // ============================================

    /// Archive an event candidate, returning the row id
    pub fn insert_event(&self, event: &EventCandidate, external_id: Option<&str>) -> Result<i64> {
        let conn = self.connection();
        conn.execute(
            r#"
            INSERT INTO events (is_event, title, start_time, duration_hours, recurrence,
                                description, external_id, recorded_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                event.is_event,
                event.title,
                event.start_time.map(|t| t.to_rfc3339()),
                event.duration_hours,
                event.recurrence,
                event.description,
                external_id,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// List archived events, most recently recorded first
    pub fn list_events(&self, limit: usize) -> Result<Vec<ArchivedEvent>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, is_event, title, start_time, duration_hours, recurrence,
                   description, external_id, recorded_at
            FROM events
            ORDER BY id DESC
            LIMIT ?1
            "#,
        )?;
        let events = stmt
            .query_map([limit as i64], Self::row_to_archived_event)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(events)
    }

    fn row_to_archived_event(row: &Row) -> rusqlite::Result<ArchivedEvent> {
        let start_time: Option<String> = row.get("start_time")?;
        let recorded_at_str: String = row.get("recorded_at")?;

        Ok(ArchivedEvent {
            id: row.get("id")?,
            event: EventCandidate {
                is_event: row.get("is_event")?,
                title: row.get("title")?,
                start_time: start_time.and_then(|s| {
                    DateTime::parse_from_rfc3339(&s)
                        .map_err(|e| {
                            tracing::warn!(value = %s, error = %e, "Unreadable events.start_time, dropping it");
                        })
                        .ok()
                }),
                duration_hours: row.get("duration_hours")?,
                recurrence: row.get("recurrence")?,
                description: row.get("description")?,
            },
            external_id: row.get("external_id")?,
            recorded_at: parse_stored_timestamp(&recorded_at_str, "events.recorded_at"),
        })
    }
}

/// Parse a stored rfc3339 timestamp, falling back to the current time.
fn parse_stored_timestamp(raw: &str, column: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            tracing::warn!(column, value = raw, error = %e, "Unreadable timestamp, using current time");
            Utc::now()
        })
}

/// Decode a JSON column, falling back to an empty value.
fn decode_or_default<T: serde::de::DeserializeOwned + Default>(raw: Option<&str>, column: &str) -> T {
    match raw {
        None | Some("") | Some("null") => T::default(),
        Some(json) => serde_json::from_str(json).unwrap_or_else(|e| {
            tracing::warn!(column, error = %e, "Unreadable context column, using empty value");
            T::default()
        }),
    }
}

impl ContextStore for Database {
    fn get(&self, id: i64) -> Result<Option<Context>> {
        self.get_context(id)
    }

    fn save(&self, context: &Context) -> Result<()> {
        self.save_context(context)
    }
}

impl EventArchive for Database {
    fn record_event(&self, event: &EventCandidate, external_id: Option<&str>) -> Result<()> {
        self.insert_event(event, external_id).map(|_| ())
    }
}
