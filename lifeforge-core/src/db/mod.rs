//! Database layer for lifeforge
//!
//! This module provides the storage layer using SQLite with:
//! - Schema migrations
//! - Repository pattern for queries
//! - The storage collaborator traits used by the chat orchestrator

pub mod repo;
pub mod schema;

pub use repo::{ArchivedEvent, Database};

use crate::error::Result;
use crate::types::{Context, EventCandidate};

/// Persistence for context records.
///
/// No locking is implied: concurrent savers of one id are last-writer-wins.
pub trait ContextStore: Send + Sync {
    /// Fetch a context by id, `None` if it was never saved.
    fn get(&self, id: i64) -> Result<Option<Context>>;

    /// Insert or replace a context.
    fn save(&self, context: &Context) -> Result<()>;
}

/// Local record of events proposed by the assistant.
pub trait EventArchive: Send + Sync {
    /// Store `event` along with the id the external calendar assigned, if any.
    fn record_event(&self, event: &EventCandidate, external_id: Option<&str>) -> Result<()>;
}
