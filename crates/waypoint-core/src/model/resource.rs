use super::{Actor, ResourceId, StateId, SubresourceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Domain fields of a resource or sub-resource.
///
/// Ordered so that every rendering of the same fields is byte-identical.
pub type Fields = BTreeMap<String, Value>;

/// A stored resource instance at one version.
///
/// The current state is mirrored into `fields` under the type's state field,
/// so guards and encoders see a single uniform view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    #[serde(rename = "type")]
    pub type_name: String,
    pub state: StateId,
    pub version: u64,
    pub fields: Fields,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Resource {
    /// Look up a field value, treating JSON `null` as absent.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).filter(|v| !v.is_null())
    }

    /// Convenience accessor for string-valued fields.
    #[must_use]
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(Value::as_str)
    }
}

/// An immutable item appended to one of a resource's collections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subresource {
    pub id: SubresourceId,
    pub parent: ResourceId,
    pub collection: String,
    pub fields: Fields,
    pub created_by: Actor,
    pub created_at: DateTime<Utc>,
}
