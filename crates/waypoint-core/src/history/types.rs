//! History event kinds.
//!
//! String forms follow a `<subject>.<verb>` convention and are what backends
//! persist and hash.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What a history event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    /// A resource was created in its initial state.
    Create,
    /// Plain fields of a resource changed.
    Update,
    /// A resource moved from one state to another.
    Transition,
    /// An item was appended to one of the resource's collections.
    Append,
}

/// Error returned when parsing an unknown event kind string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventKind {
    pub raw: String,
}

impl fmt::Display for UnknownEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown event kind '{}': expected one of resource.create, resource.update, \
             resource.transition, subresource.add",
            self.raw
        )
    }
}

impl std::error::Error for UnknownEventKind {}

impl EventKind {
    pub const ALL: [Self; 4] = [Self::Create, Self::Update, Self::Transition, Self::Append];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "resource.create",
            Self::Update => "resource.update",
            Self::Transition => "resource.transition",
            Self::Append => "subresource.add",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownEventKind { raw: s.to_string() })
    }
}

impl Serialize for EventKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_forms_round_trip() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>(), Ok(kind));
        }
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = "item.move".parse::<EventKind>().expect_err("unknown");
        assert_eq!(err.raw, "item.move");
        assert!(err.to_string().contains("subresource.add"));
    }

    #[test]
    fn serializes_as_dotted_string() {
        let json = serde_json::to_string(&EventKind::Append).expect("serialize");
        assert_eq!(json, "\"subresource.add\"");
        let back: EventKind = serde_json::from_str(&json).expect("parse");
        assert_eq!(back, EventKind::Append);
        assert!(serde_json::from_str::<EventKind>("\"resource.delete\"").is_err());
    }
}
