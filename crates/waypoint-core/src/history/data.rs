//! Typed payloads for each event kind.

use super::types::EventKind;
use crate::model::{Fields, StateId, SubresourceId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Typed payload of an event. The discriminant is the event's
/// [`EventKind`], stored next to the payload rather than inside it.
///
/// `EventData` serializes as its inner struct and has no `Deserialize`;
/// use [`EventData::deserialize_for`] with the known kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventData {
    Create(CreateData),
    Update(UpdateData),
    Transition(TransitionData),
    Append(AppendData),
}

/// Payload for `resource.create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateData {
    #[serde(rename = "type")]
    pub type_name: String,
    /// Field that mirrors the state.
    pub state_field: String,
    pub state: StateId,
    /// Initial fields, including the state field.
    pub fields: Fields,
}

/// Payload for `resource.update`. A `null` change removes the field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateData {
    pub changes: Fields,
}

/// Payload for `resource.transition`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionData {
    pub from: StateId,
    pub to: StateId,
    /// Name of the transition or trigger taken.
    pub transition: String,
    pub cause: Cause,
}

/// What set a transition in motion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Cause {
    /// A client patched the state field.
    Explicit,
    /// Appending `subresource` to `collection` fired a trigger.
    Trigger {
        collection: String,
        subresource: SubresourceId,
    },
}

/// Payload for `subresource.add`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendData {
    pub collection: String,
    pub subresource: SubresourceId,
    pub fields: Fields,
}

impl EventData {
    /// Kind matching this payload.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Create(_) => EventKind::Create,
            Self::Update(_) => EventKind::Update,
            Self::Transition(_) => EventKind::Transition,
            Self::Append(_) => EventKind::Append,
        }
    }

    /// Deserialize a JSON payload into the variant for `kind`.
    ///
    /// # Errors
    ///
    /// Returns a [`DataParseError`] if the JSON does not match the payload
    /// schema of `kind`.
    pub fn deserialize_for(kind: EventKind, json: &str) -> Result<Self, DataParseError> {
        let result = match kind {
            EventKind::Create => serde_json::from_str::<CreateData>(json).map(Self::Create),
            EventKind::Update => serde_json::from_str::<UpdateData>(json).map(Self::Update),
            EventKind::Transition => {
                serde_json::from_str::<TransitionData>(json).map(Self::Transition)
            }
            EventKind::Append => serde_json::from_str::<AppendData>(json).map(Self::Append),
        };
        result.map_err(|source| DataParseError { kind, source })
    }

    /// Serialize the payload to a [`serde_json::Value`].
    ///
    /// # Errors
    ///
    /// Returns an error if the inner struct fails to serialize.
    pub fn to_json_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Self::Create(d) => serde_json::to_value(d),
            Self::Update(d) => serde_json::to_value(d),
            Self::Transition(d) => serde_json::to_value(d),
            Self::Append(d) => serde_json::to_value(d),
        }
    }
}

impl Serialize for EventData {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Create(d) => d.serialize(serializer),
            Self::Update(d) => d.serialize(serializer),
            Self::Transition(d) => d.serialize(serializer),
            Self::Append(d) => d.serialize(serializer),
        }
    }
}

/// Error returned when an event payload does not match its kind.
#[derive(Debug)]
pub struct DataParseError {
    pub kind: EventKind,
    pub source: serde_json::Error,
}

impl fmt::Display for DataParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {} payload: {}", self.kind, self.source)
    }
}

impl std::error::Error for DataParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}
