//! Value types shared by every waypoint component.
//!
//! Identifiers are thin string newtypes: they are opaque to callers and are
//! compared, hashed and ordered by their text.

pub mod resource;

pub use resource::{Fields, Resource, Subresource};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a string without validation.
            #[must_use]
            pub fn new_unchecked(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

string_id!(
    /// Server-assigned identifier of a resource.
    ResourceId
);
string_id!(
    /// Identifier of a sub-resource (an item in a resource's collection).
    SubresourceId
);
string_id!(
    /// Name of a state in a resource type's state graph.
    StateId
);
string_id!(
    /// Identifier shared by every history event produced by one operation.
    OperationId
);
string_id!(
    /// A named permission supplied by the external capability provider.
    Capability
);

/// Identity recorded on history events.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Actor(String);

impl Actor {
    /// Actor name used for transitions fired by implicit triggers.
    pub const SYSTEM: &'static str = "system";

    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn system() -> Self {
        Self(Self::SYSTEM.to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_system(&self) -> bool {
        self.0 == Self::SYSTEM
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Actor {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// The capabilities a caller holds for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capabilities(BTreeSet<Capability>);

impl Capabilities {
    /// A caller holding no capabilities.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn holds(&self, capability: &Capability) -> bool {
        self.0.contains(capability)
    }

    /// Whether the caller may use something that requires `required`.
    ///
    /// `None` means no capability is required.
    #[must_use]
    pub fn allows(&self, required: Option<&Capability>) -> bool {
        required.is_none_or(|cap| self.holds(cap))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.0.iter()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<C: Into<Capability>> FromIterator<C> for Capabilities {
    fn from_iter<I: IntoIterator<Item = C>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_serialize_transparently() {
        let id = ResourceId::new_unchecked("lr-0a1b2c3d4e");
        assert_eq!(
            serde_json::to_string(&id).expect("serialize"),
            "\"lr-0a1b2c3d4e\""
        );
        let back: ResourceId = serde_json::from_str("\"lr-0a1b2c3d4e\"").expect("parse");
        assert_eq!(back, id);
    }

    #[test]
    fn state_compares_with_str() {
        let state = StateId::from("draft");
        assert_eq!(state, "draft");
        assert_eq!(state.to_string(), "draft");
    }

    #[test]
    fn capabilities_allow_unrestricted_and_held() {
        let caps: Capabilities = ["reviewer"].into_iter().collect();
        assert!(caps.allows(None));
        assert!(caps.allows(Some(&Capability::from("reviewer"))));
        assert!(!caps.allows(Some(&Capability::from("requester"))));
        assert!(!Capabilities::none().allows(Some(&Capability::from("reviewer"))));
    }

    #[test]
    fn system_actor() {
        assert!(Actor::system().is_system());
        assert!(!Actor::new("alice").is_system());
    }
}
