//! SQLite-backed durable store.
//!
//! Runtime defaults follow the usual conservative choices:
//! - `journal_mode = WAL` so readers never block the writer
//! - `busy_timeout = 5s` so a second process waits instead of failing
//! - `foreign_keys = ON` so collection items always have a parent
//!
//! Commits run in `BEGIN IMMEDIATE` transactions and compare-and-swap on the
//! stored version, so two processes sharing a file cannot lose an update.

use super::{Backend, Commit, StorageError, check_sequence, migrations};
use crate::history::canonical::canonicalize_json;
use crate::history::{Event, EventData, EventKind, EventSeq, HistoryLog};
use crate::model::{Actor, Fields, Resource, ResourceId, StateId, Subresource, SubresourceId};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

/// Busy timeout used for store connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Durable backend over one SQLite database file.
#[derive(Debug)]
pub struct SqliteBackend {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteBackend {
    /// Open (or create) the database at `path`, apply runtime pragmas and
    /// migrate the schema to the latest version.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the database
    /// cannot be opened, configured or migrated.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut conn = Connection::open(path)?;
        configure_connection(&conn)?;
        let version = migrations::migrate(&mut conn)?;
        debug!(path = %path.display(), schema_version = version, "opened sqlite store");
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// A private, non-persistent database.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot be initialized.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let mut conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Database file, or `None` for in-memory databases.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}

fn to_sql_int(value: u64) -> Result<i64, StorageError> {
    i64::try_from(value).map_err(|_| StorageError::Corrupt(format!("{value} exceeds i64")))
}

fn from_sql_int(value: i64) -> Result<u64, StorageError> {
    u64::try_from(value).map_err(|_| StorageError::Corrupt(format!("negative counter {value}")))
}

fn from_micros(us: i64) -> Result<DateTime<Utc>, StorageError> {
    DateTime::from_timestamp_micros(us)
        .ok_or_else(|| StorageError::Corrupt(format!("timestamp {us} out of range")))
}

fn insert_event(conn: &Connection, event: &Event) -> Result<(), StorageError> {
    let data_json = canonicalize_json(&event.data.to_json_value()?);
    conn.execute(
        "INSERT INTO events (resource_id, seq, version, at_us, actor, operation, kind, data_json, prev_hash, event_hash)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            event.resource_id.as_str(),
            to_sql_int(event.seq)?,
            to_sql_int(event.version)?,
            event.at.timestamp_micros(),
            event.actor.as_str(),
            event.operation.as_str(),
            event.kind.as_str(),
            data_json,
            event.prev_hash.as_deref(),
            event.event_hash.as_str(),
        ],
    )?;
    Ok(())
}

struct RawEvent {
    resource_id: String,
    seq: i64,
    version: i64,
    at_us: i64,
    actor: String,
    operation: String,
    kind: String,
    data_json: String,
    prev_hash: Option<String>,
    event_hash: String,
}

impl RawEvent {
    fn decode(self) -> Result<Event, StorageError> {
        let kind: EventKind = self
            .kind
            .parse()
            .map_err(|e: crate::history::UnknownEventKind| StorageError::Corrupt(e.to_string()))?;
        let data = EventData::deserialize_for(kind, &self.data_json)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;
        Ok(Event {
            seq: from_sql_int(self.seq)?,
            resource_id: ResourceId::from(self.resource_id),
            version: from_sql_int(self.version)?,
            at: from_micros(self.at_us)?,
            actor: Actor::new(self.actor),
            operation: self.operation.into(),
            kind,
            data,
            prev_hash: self.prev_hash,
            event_hash: self.event_hash,
        })
    }
}

impl HistoryLog for SqliteBackend {
    fn append(&self, event: &Event) -> Result<(), StorageError> {
        insert_event(&self.conn(), event)
    }

    fn list(&self, id: &ResourceId) -> Result<EventSeq, StorageError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT resource_id, seq, version, at_us, actor, operation, kind, data_json, prev_hash, event_hash
             FROM events WHERE resource_id = ?1 ORDER BY seq",
        )?;
        let rows = stmt.query_map([id.as_str()], |row| {
            Ok(RawEvent {
                resource_id: row.get(0)?,
                seq: row.get(1)?,
                version: row.get(2)?,
                at_us: row.get(3)?,
                actor: row.get(4)?,
                operation: row.get(5)?,
                kind: row.get(6)?,
                data_json: row.get(7)?,
                prev_hash: row.get(8)?,
                event_hash: row.get(9)?,
            })
        })?;
        let mut events = Vec::new();
        for raw in rows {
            events.push(raw?.decode()?);
        }
        Ok(EventSeq::new(events))
    }
}

impl Backend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn load(&self, id: &ResourceId) -> Result<Option<Resource>, StorageError> {
        let conn = self.conn();
        let raw = conn
            .query_row(
                "SELECT type_name, state, version, fields_json, created_at_us, updated_at_us
                 FROM resources WHERE resource_id = ?1",
                [id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, i64>(5)?,
                    ))
                },
            )
            .optional()?;
        let Some((type_name, state, version, fields_json, created_us, updated_us)) = raw else {
            return Ok(None);
        };
        Ok(Some(Resource {
            id: id.clone(),
            type_name,
            state: StateId::from(state),
            version: from_sql_int(version)?,
            fields: serde_json::from_str(&fields_json)?,
            created_at: from_micros(created_us)?,
            updated_at: from_micros(updated_us)?,
        }))
    }

    fn commit(&self, commit: &Commit) -> Result<(), StorageError> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let resource = &commit.resource;
        let id = resource.id.as_str();

        let stored: Option<i64> = tx
            .query_row(
                "SELECT version FROM resources WHERE resource_id = ?1",
                [id],
                |row| row.get(0),
            )
            .optional()?;
        let stored = stored.map(from_sql_int).transpose()?;
        let conflict = |actual: Option<u64>| StorageError::Conflict {
            id: resource.id.clone(),
            expected: commit.previous_version.unwrap_or_default(),
            actual: actual.unwrap_or_default(),
        };
        match (commit.previous_version, stored) {
            (None, None) => {}
            (Some(expected), Some(actual)) if expected == actual => {}
            (_, actual) => return Err(conflict(actual)),
        }

        let head: Option<i64> = tx.query_row(
            "SELECT MAX(seq) FROM events WHERE resource_id = ?1",
            [id],
            |row| row.get(0),
        )?;
        check_sequence(commit, head.map(from_sql_int).transpose()?.unwrap_or(0))?;

        let fields_json = serde_json::to_string(&resource.fields)?;
        match commit.previous_version {
            None => {
                tx.execute(
                    "INSERT INTO resources (resource_id, type_name, state, version, fields_json, created_at_us, updated_at_us)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        id,
                        resource.type_name,
                        resource.state.as_str(),
                        to_sql_int(resource.version)?,
                        fields_json,
                        resource.created_at.timestamp_micros(),
                        resource.updated_at.timestamp_micros(),
                    ],
                )?;
            }
            Some(expected) => {
                let updated = tx.execute(
                    "UPDATE resources
                     SET state = ?1, version = ?2, fields_json = ?3, updated_at_us = ?4
                     WHERE resource_id = ?5 AND version = ?6",
                    params![
                        resource.state.as_str(),
                        to_sql_int(resource.version)?,
                        fields_json,
                        resource.updated_at.timestamp_micros(),
                        id,
                        to_sql_int(expected)?,
                    ],
                )?;
                if updated == 0 {
                    return Err(conflict(stored));
                }
            }
        }

        if let Some(item) = &commit.subresource {
            tx.execute(
                "INSERT INTO subresources (subresource_id, parent_id, collection, fields_json, created_by, created_at_us)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    item.id.as_str(),
                    item.parent.as_str(),
                    item.collection,
                    serde_json::to_string(&item.fields)?,
                    item.created_by.as_str(),
                    item.created_at.timestamp_micros(),
                ],
            )?;
        }

        for event in &commit.events {
            insert_event(&tx, event)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn subresources(
        &self,
        parent: &ResourceId,
        collection: &str,
    ) -> Result<Vec<Subresource>, StorageError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT subresource_id, fields_json, created_by, created_at_us
             FROM subresources WHERE parent_id = ?1 AND collection = ?2 ORDER BY position",
        )?;
        let rows = stmt.query_map(params![parent.as_str(), collection], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;
        let mut items = Vec::new();
        for row in rows {
            let (id, fields_json, created_by, created_us) = row?;
            let fields: Fields = serde_json::from_str(&fields_json)?;
            items.push(Subresource {
                id: SubresourceId::from(id),
                parent: parent.clone(),
                collection: collection.to_string(),
                fields,
                created_by: Actor::new(created_by),
                created_at: from_micros(created_us)?,
            });
        }
        Ok(items)
    }

    fn resource_ids(&self, type_name: Option<&str>) -> Result<Vec<ResourceId>, StorageError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT resource_id FROM resources
             WHERE ?1 IS NULL OR type_name = ?1
             ORDER BY resource_id",
        )?;
        let ids = stmt
            .query_map([type_name], |row| row.get::<_, String>(0))?
            .map(|id| id.map(ResourceId::from))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }
}
