//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: context and journal
    r#"
    CREATE TABLE IF NOT EXISTS contexts (
        id               INTEGER PRIMARY KEY,
        goals            JSON NOT NULL DEFAULT '[]',
        recent5          JSON NOT NULL DEFAULT '[]',
        progress         JSON NOT NULL DEFAULT '{}',
        updated_at       DATETIME NOT NULL
    );

    CREATE TABLE IF NOT EXISTS journal_entries (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        entry_text       TEXT NOT NULL,
        mood_score       INTEGER NOT NULL,
        created_at       DATETIME NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_journal_created ON journal_entries(created_at);
    "#,
    // Version 2: archive of events proposed by the assistant
    r#"
    CREATE TABLE IF NOT EXISTS events (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        is_event         INTEGER NOT NULL,
        title            TEXT NOT NULL,
        start_time       DATETIME,
        duration_hours   REAL,
        recurrence       TEXT,
        description      TEXT,
        external_id      TEXT,
        recorded_at      DATETIME NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_events_start ON events(start_time);
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute_batch(&format!("PRAGMA user_version = {}", version))?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}
