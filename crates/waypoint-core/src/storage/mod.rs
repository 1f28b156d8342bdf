//! Pluggable durable storage for resources, sub-resources and history.
//!
//! A [`Backend`] persists everything one store operation produces in a single
//! atomic [`Commit`], guarded by a compare-and-swap on the resource version.
//! Two backends ship: [`MemoryBackend`] and [`SqliteBackend`].

pub mod memory;
pub mod migrations;
pub mod schema;
pub mod sqlite;

pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

use crate::history::{Event, HistoryLog};
use crate::model::{Resource, ResourceId, Subresource};

/// Errors raised by storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data could not be decoded.
    #[error("corrupt stored data: {0}")]
    Corrupt(String),

    /// The stored version moved underneath the writer.
    #[error("'{id}' is at version {actual}, write expected {expected}")]
    Conflict {
        id: ResourceId,
        expected: u64,
        actual: u64,
    },

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Everything one store operation writes.
#[derive(Debug, Clone, PartialEq)]
pub struct Commit {
    /// Version the stored resource must have; `None` inserts a new resource.
    pub previous_version: Option<u64>,
    /// The resource after the operation.
    pub resource: Resource,
    /// A newly appended collection item, if any.
    pub subresource: Option<Subresource>,
    /// Events continuing the resource's history, in order.
    pub events: Vec<Event>,
}

/// Durable storage for the resource store.
pub trait Backend: HistoryLog {
    /// Short name for logs (`memory`, `sqlite`).
    fn name(&self) -> &'static str;

    /// Current stored form of a resource.
    ///
    /// # Errors
    ///
    /// Fails when the backend cannot be read.
    fn load(&self, id: &ResourceId) -> Result<Option<Resource>, StorageError>;

    /// Atomically write `commit`: all of it or none of it.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Conflict`] if the stored version is not
    /// `commit.previous_version` (or the resource already exists on insert),
    /// and other variants when the write fails.
    fn commit(&self, commit: &Commit) -> Result<(), StorageError>;

    /// Items of one collection in creation order.
    ///
    /// # Errors
    ///
    /// Fails when the backend cannot be read.
    fn subresources(
        &self,
        parent: &ResourceId,
        collection: &str,
    ) -> Result<Vec<Subresource>, StorageError>;

    /// Stored resource ids in id order, optionally only those of one type.
    ///
    /// # Errors
    ///
    /// Fails when the backend cannot be read.
    fn resource_ids(&self, type_name: Option<&str>) -> Result<Vec<ResourceId>, StorageError>;
}

/// Check that `commit.events` continue a history whose last sequence number
/// is `head_seq`.
fn check_sequence(commit: &Commit, head_seq: u64) -> Result<(), StorageError> {
    for (offset, event) in (1..).zip(&commit.events) {
        if event.resource_id != commit.resource.id || event.seq != head_seq + offset {
            return Err(StorageError::Corrupt(format!(
                "event #{} for '{}' does not continue history at #{head_seq}",
                event.seq, event.resource_id
            )));
        }
    }
    Ok(())
}
