//! Sub-resource collections.
//!
//! Checks that a collection exists and that an item matches its schema, then
//! asks the engine whether the new item fires a trigger. Owns no storage: the
//! store persists what [`Collections::prepare`] returns.

use crate::error::{Error, Result};
use crate::machine::{CollectionSpec, ResourceType, Trigger, schema};
use crate::model::{Actor, Fields, Resource, Subresource, SubresourceId};
use chrono::{DateTime, Utc};

/// Collection rules of one resource type.
#[derive(Debug, Clone, Copy)]
pub struct Collections<'a> {
    ty: &'a ResourceType,
}

/// A validated item, ready to store, and the trigger it fires.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedAppend<'a> {
    pub subresource: Subresource,
    pub trigger: Option<&'a Trigger>,
}

impl<'a> Collections<'a> {
    #[must_use]
    pub const fn new(ty: &'a ResourceType) -> Self {
        Self { ty }
    }

    /// The declared collection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownCollection`] if the type declares no such
    /// collection.
    pub fn spec(&self, collection: &str) -> Result<&'a CollectionSpec> {
        self.ty
            .collection(collection)
            .ok_or_else(|| Error::UnknownCollection {
                type_name: self.ty.name().to_string(),
                collection: collection.to_string(),
            })
    }

    /// Validate `payload` as a new item of `collection` under `parent` and
    /// resolve the trigger it fires from the parent's current state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownCollection`] or [`Error::InvalidFields`].
    pub fn prepare(
        &self,
        parent: &Resource,
        collection: &str,
        payload: Fields,
        id: SubresourceId,
        actor: &Actor,
        at: DateTime<Utc>,
    ) -> Result<PreparedAppend<'a>> {
        let spec = self.spec(collection)?;
        let fields = schema::validate_document(&spec.fields, payload).map_err(Error::invalid)?;
        let trigger = self.ty.resolve_trigger(collection, &fields, &parent.state);
        Ok(PreparedAppend {
            subresource: Subresource {
                id,
                parent: parent.id.clone(),
                collection: collection.to_string(),
                fields,
                created_by: actor.clone(),
                created_at: at,
            },
            trigger,
        })
    }
}
