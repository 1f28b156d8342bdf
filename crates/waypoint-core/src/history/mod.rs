//! Append-only, per-resource audit history.
//!
//! Every committed mutation of a resource appends one or more [`Event`]s.
//! Events of one resource are numbered 1, 2, 3, ... and chained by BLAKE3
//! hashes (see [`hash`]), so a stored history can be checked for tampering
//! and replayed into a snapshot (see [`replay`]).

pub mod canonical;
pub mod data;
pub mod hash;
pub mod replay;
pub mod types;

pub use data::{AppendData, Cause, CreateData, DataParseError, EventData, TransitionData, UpdateData};
pub use hash::{ChainError, compute_event_hash, verify_chain};
pub use replay::{ReplayError, Snapshot, replay, replay_checked};
pub use types::{EventKind, UnknownEventKind};

use crate::model::{Actor, OperationId, ResourceId};
use crate::storage::StorageError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One immutable history record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    /// Position in the resource's history, starting at 1.
    pub seq: u64,
    pub resource_id: ResourceId,
    /// Resource version after this event.
    pub version: u64,
    /// Never earlier than the previous event's timestamp.
    pub at: DateTime<Utc>,
    pub actor: Actor,
    /// Shared by every event produced by one store operation.
    pub operation: OperationId,
    pub kind: EventKind,
    pub data: EventData,
    /// Hash of the previous event; `None` for the first.
    pub prev_hash: Option<String>,
    /// `blake3:<hex>` over every other field.
    pub event_hash: String,
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct EventRaw {
            seq: u64,
            resource_id: ResourceId,
            version: u64,
            at: DateTime<Utc>,
            actor: Actor,
            operation: OperationId,
            kind: EventKind,
            data: serde_json::Value,
            prev_hash: Option<String>,
            event_hash: String,
        }

        let raw = EventRaw::deserialize(deserializer)?;
        let data = EventData::deserialize_for(raw.kind, &raw.data.to_string())
            .map_err(serde::de::Error::custom)?;

        Ok(Self {
            seq: raw.seq,
            resource_id: raw.resource_id,
            version: raw.version,
            at: raw.at,
            actor: raw.actor,
            operation: raw.operation,
            kind: raw.kind,
            data,
            prev_hash: raw.prev_hash,
            event_hash: raw.event_hash,
        })
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "#{} v{} {} {} {}",
            self.seq,
            self.version,
            self.at.format("%Y-%m-%dT%H:%M:%S%.6fZ"),
            self.actor,
            self.kind
        )?;
        match &self.data {
            EventData::Create(d) => write!(f, " state={}", d.state),
            EventData::Update(d) => {
                let names: Vec<&str> = d.changes.keys().map(String::as_str).collect();
                write!(f, " fields={}", names.join(","))
            }
            EventData::Transition(d) => write!(f, " {} -> {} via {}", d.from, d.to, d.transition),
            EventData::Append(d) => write!(f, " {}/{}", d.collection, d.subresource),
        }
    }
}

/// Durable, append-only event storage.
pub trait HistoryLog: Send + Sync {
    /// Append one event after the current head of its resource.
    ///
    /// # Errors
    ///
    /// Fails only when the backend cannot persist the event.
    fn append(&self, event: &Event) -> Result<(), StorageError>;

    /// Snapshot of a resource's events in sequence order. Empty for unknown ids.
    ///
    /// # Errors
    ///
    /// Fails when the backend cannot be read.
    fn list(&self, id: &ResourceId) -> Result<EventSeq, StorageError>;

    /// Latest event of a resource.
    ///
    /// # Errors
    ///
    /// Fails when the backend cannot be read.
    fn head(&self, id: &ResourceId) -> Result<Option<Event>, StorageError> {
        Ok(self.list(id)?.as_slice().last().cloned())
    }
}

/// A finite, restartable sequence of events.
///
/// Iterates over a snapshot taken when the sequence was produced; events
/// appended afterwards are not observed. Clone it or call [`rewind`] to
/// iterate again.
///
/// [`rewind`]: EventSeq::rewind
#[derive(Debug, Clone)]
pub struct EventSeq {
    events: Arc<[Event]>,
    cursor: usize,
}

impl EventSeq {
    #[must_use]
    pub fn new(events: impl Into<Arc<[Event]>>) -> Self {
        Self {
            events: events.into(),
            cursor: 0,
        }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Restart iteration from the first event.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    /// Total number of events in the snapshot, regardless of the cursor.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Event] {
        &self.events
    }

    #[must_use]
    pub fn last(&self) -> Option<&Event> {
        self.events.last()
    }
}

impl Iterator for EventSeq {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        let event = self.events.get(self.cursor)?.clone();
        self.cursor += 1;
        Some(event)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.events.len().saturating_sub(self.cursor);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for EventSeq {}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::{Fields, StateId};
    use chrono::TimeZone;
    use serde_json::json;

    pub(crate) fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_762_934_400 + secs, 0)
            .single()
            .expect("valid timestamp")
    }

    /// A sealed two-event history: create in `draft`, then submit.
    pub(crate) fn sample_history() -> Vec<Event> {
        let id = ResourceId::from("lr-1");
        let fields: Fields = serde_json::from_value(json!({
            "employee": "alice",
            "from": "2025-11-12",
            "to": "2025-11-15",
            "status": "draft",
        }))
        .expect("fields");
        let mut create = Event {
            seq: 1,
            resource_id: id.clone(),
            version: 1,
            at: at(0),
            actor: Actor::new("alice"),
            operation: OperationId::from("op-1"),
            kind: EventKind::Create,
            data: EventData::Create(CreateData {
                type_name: "leave-request".into(),
                state_field: "status".into(),
                state: StateId::from("draft"),
                fields,
            }),
            prev_hash: None,
            event_hash: String::new(),
        };
        hash::seal(&mut create).expect("seal");
        let mut submit = Event {
            seq: 2,
            resource_id: id,
            version: 2,
            at: at(60),
            actor: Actor::new("alice"),
            operation: OperationId::from("op-2"),
            kind: EventKind::Transition,
            data: EventData::Transition(TransitionData {
                from: StateId::from("draft"),
                to: StateId::from("submitted"),
                transition: "submit".into(),
                cause: Cause::Explicit,
            }),
            prev_hash: Some(create.event_hash.clone()),
            event_hash: String::new(),
        };
        hash::seal(&mut submit).expect("seal");
        vec![create, submit]
    }

    #[test]
    fn event_json_round_trip_keeps_typed_payload() {
        let events = sample_history();
        let json = serde_json::to_string(&events[1]).expect("serialize");
        let back: Event = serde_json::from_str(&json).expect("parse");
        assert_eq!(back, events[1]);
    }

    #[test]
    fn display_is_one_line_summary() {
        let events = sample_history();
        assert_eq!(
            events[1].to_string(),
            "#2 v2 2025-11-12T08:01:00.000000Z alice resource.transition draft -> submitted via submit"
        );
    }

    #[test]
    fn event_seq_is_restartable() {
        let mut seq = EventSeq::new(sample_history());
        assert_eq!(seq.len(), 2);
        assert_eq!(seq.next().map(|e| e.seq), Some(1));
        let copy = seq.clone();
        assert_eq!(seq.next().map(|e| e.seq), Some(2));
        assert!(seq.next().is_none());
        assert_eq!(copy.map(|e| e.seq).collect::<Vec<_>>(), vec![2]);
        seq.rewind();
        assert_eq!(seq.count(), 2);
    }
}
