//! Rebuild a resource snapshot from its history alone.

use super::{Cause, Event, EventData};
use crate::machine::{ResourceType, schema};
use crate::model::{Fields, OperationId, ResourceId, StateId};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Resource state as reconstructed from events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub id: ResourceId,
    pub type_name: String,
    pub state: StateId,
    pub version: u64,
    pub fields: Fields,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Why a sequence of events does not describe a valid history.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplayError {
    #[error("history is empty")]
    Empty,

    #[error("event #{seq} must be a resource.create")]
    NotCreate { seq: u64 },

    #[error("event #{seq} creates the resource a second time")]
    DuplicateCreate { seq: u64 },

    #[error("event #{seq} has version {found}, expected {expected}")]
    Version {
        seq: u64,
        expected: u64,
        found: u64,
    },

    #[error("event #{seq} leaves '{recorded}' but the resource is in '{actual}'")]
    StateMismatch {
        seq: u64,
        recorded: StateId,
        actual: StateId,
    },

    #[error("history is for type '{found}', expected '{expected}'")]
    WrongType { expected: String, found: String },

    #[error("event #{seq} takes '{transition}' from '{from}' to '{to}', which is not declared")]
    UndeclaredEdge {
        seq: u64,
        transition: String,
        from: StateId,
        to: StateId,
    },
}

/// Fold `events` into a snapshot.
///
/// Checks structure only: a single leading create, consistent versions
/// (at most one increment per operation, none for appends) and transitions
/// that leave the state the resource is actually in.
///
/// # Errors
///
/// Returns the first [`ReplayError`] found.
pub fn replay(events: &[Event]) -> Result<Snapshot, ReplayError> {
    let (first, rest) = events.split_first().ok_or(ReplayError::Empty)?;
    let EventData::Create(create) = &first.data else {
        return Err(ReplayError::NotCreate { seq: first.seq });
    };
    if first.version != 1 {
        return Err(ReplayError::Version {
            seq: first.seq,
            expected: 1,
            found: first.version,
        });
    }

    let mut snapshot = Snapshot {
        id: first.resource_id.clone(),
        type_name: create.type_name.clone(),
        state: create.state.clone(),
        version: 1,
        fields: create.fields.clone(),
        created_at: first.at,
        updated_at: first.at,
    };

    let mut operation: &OperationId = &first.operation;
    let mut bumped = true;

    for event in rest {
        if event.operation != *operation {
            operation = &event.operation;
            bumped = false;
        }
        let bumps = !matches!(event.data, EventData::Append(_));
        let expected = if bumps && !bumped {
            snapshot.version + 1
        } else {
            snapshot.version
        };
        if event.version != expected {
            return Err(ReplayError::Version {
                seq: event.seq,
                expected,
                found: event.version,
            });
        }
        bumped |= bumps;
        snapshot.version = event.version;

        match &event.data {
            EventData::Create(_) => return Err(ReplayError::DuplicateCreate { seq: event.seq }),
            EventData::Update(update) => {
                schema::merge_into(&mut snapshot.fields, &update.changes);
                snapshot.updated_at = event.at;
            }
            EventData::Transition(transition) => {
                if transition.from != snapshot.state {
                    return Err(ReplayError::StateMismatch {
                        seq: event.seq,
                        recorded: transition.from.clone(),
                        actual: snapshot.state.clone(),
                    });
                }
                snapshot.state = transition.to.clone();
                snapshot.fields.insert(
                    create.state_field.clone(),
                    Value::String(transition.to.to_string()),
                );
                snapshot.updated_at = event.at;
            }
            EventData::Append(_) => {}
        }
    }

    Ok(snapshot)
}

/// [`replay`], additionally checking every transition against the edges
/// `ty` declares.
///
/// # Errors
///
/// Returns the first [`ReplayError`] found.
pub fn replay_checked(ty: &ResourceType, events: &[Event]) -> Result<Snapshot, ReplayError> {
    let snapshot = replay(events)?;
    if snapshot.type_name != ty.name() {
        return Err(ReplayError::WrongType {
            expected: ty.name().to_string(),
            found: snapshot.type_name,
        });
    }

    for event in events {
        let EventData::Transition(t) = &event.data else {
            continue;
        };
        let declared = match &t.cause {
            Cause::Explicit => ty
                .outgoing(&t.from)
                .any(|edge| edge.to == t.to && edge.name == t.transition),
            Cause::Trigger { collection, .. } => ty.triggers_from(&t.from).any(|trigger| {
                trigger.to == t.to
                    && trigger.name == t.transition
                    && &trigger.collection == collection
            }),
        };
        if !declared {
            return Err(ReplayError::UndeclaredEdge {
                seq: event.seq,
                transition: t.transition.clone(),
                from: t.from.clone(),
                to: t.to.clone(),
            });
        }
    }
    Ok(snapshot)
}
