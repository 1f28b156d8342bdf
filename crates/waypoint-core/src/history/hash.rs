//! Event hashing and chain verification.
//!
//! The hash input is the UTF-8 bytes of
//! `{seq}\t{resource}\t{version}\t{at_us}\t{actor}\t{operation}\t{kind}\t{data}\t{prev_hash}\n`
//! where `data` is the canonical JSON payload and `prev_hash` is empty for
//! the first event. Hashes are written as `blake3:<hex>`.

use super::Event;
use super::canonical::canonicalize_json;

/// Compute the hash of `event` from every field except `event_hash`.
///
/// # Errors
///
/// Returns an error if the payload fails to serialize.
pub fn compute_event_hash(event: &Event) -> Result<String, serde_json::Error> {
    let data_json = canonicalize_json(&event.data.to_json_value()?);
    let hash_input = format!(
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\n",
        event.seq,
        event.resource_id,
        event.version,
        event.at.timestamp_micros(),
        event.actor,
        event.operation,
        event.kind,
        data_json,
        event.prev_hash.as_deref().unwrap_or_default(),
    );
    let hash = blake3::hash(hash_input.as_bytes());
    Ok(format!("blake3:{hash}"))
}

/// Compute the hash and store it on the event.
///
/// # Errors
///
/// Returns an error if the payload fails to serialize.
pub fn seal(event: &mut Event) -> Result<(), serde_json::Error> {
    event.event_hash = compute_event_hash(event)?;
    Ok(())
}

/// First broken link found by [`verify_chain`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("event #{position} has sequence {found}, expected {expected}")]
    Sequence {
        position: usize,
        expected: u64,
        found: u64,
    },

    #[error("event #{seq} does not reference the previous event's hash")]
    BrokenLink { seq: u64 },

    #[error("event #{seq} hash mismatch: stored {stored}, computed {computed}")]
    HashMismatch {
        seq: u64,
        stored: String,
        computed: String,
    },

    #[error("event #{seq} belongs to '{found}', not '{expected}'")]
    ForeignEvent {
        seq: u64,
        expected: String,
        found: String,
    },

    #[error("event #{seq} is timestamped before its predecessor")]
    TimeWentBackwards { seq: u64 },

    #[error("event #{seq} payload cannot be serialized: {detail}")]
    Unserializable { seq: u64, detail: String },
}

/// Check that `events` form one well-linked chain starting at sequence 1.
///
/// # Errors
///
/// Returns the first [`ChainError`] found.
pub fn verify_chain(events: &[Event]) -> Result<(), ChainError> {
    let Some(first) = events.first() else {
        return Ok(());
    };
    let mut prev: Option<&Event> = None;
    for (i, event) in events.iter().enumerate() {
        let expected = i as u64 + 1;
        if event.seq != expected {
            return Err(ChainError::Sequence {
                position: i + 1,
                expected,
                found: event.seq,
            });
        }
        if first.resource_id != event.resource_id {
            return Err(ChainError::ForeignEvent {
                seq: event.seq,
                expected: first.resource_id.to_string(),
                found: event.resource_id.to_string(),
            });
        }
        if event.prev_hash.as_deref() != prev.map(|p| p.event_hash.as_str()) {
            return Err(ChainError::BrokenLink { seq: event.seq });
        }
        if prev.is_some_and(|p| p.at > event.at) {
            return Err(ChainError::TimeWentBackwards { seq: event.seq });
        }
        let computed = compute_event_hash(event).map_err(|e| ChainError::Unserializable {
            seq: event.seq,
            detail: e.to_string(),
        })?;
        if computed != event.event_hash {
            return Err(ChainError::HashMismatch {
                seq: event.seq,
                stored: event.event_hash.clone(),
                computed,
            });
        }
        prev = Some(event);
    }
    Ok(())
}
