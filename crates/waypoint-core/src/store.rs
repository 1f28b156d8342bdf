//! The resource store: the one place that mutates resources.
//!
//! Every mutating operation runs under the resource's lock, checks the
//! caller's expected version, asks the engine whether the change is legal,
//! then hands the new resource, any new item and the events describing the
//! change to the backend as one atomic [`Commit`]. A failed operation leaves
//! nothing behind.

use crate::affordance::{self, AffordanceSet};
use crate::clock::{Clock, SystemClock};
use crate::collection::Collections;
use crate::error::{Error, Result};
use crate::history::{
    AppendData, Cause, CreateData, Event, EventData, EventSeq, TransitionData, UpdateData, hash,
    replay_checked, verify_chain,
};
use crate::id::IdGenerator;
use crate::lock::{DEFAULT_LOCK_TIMEOUT, LockTable};
use crate::machine::{Engine, ResourceType, TransitionDecision, schema};
use crate::model::{
    Actor, Capabilities, Fields, OperationId, Resource, ResourceId, StateId, Subresource,
    SubresourceId,
};
use crate::storage::{Backend, Commit, MemoryBackend, StorageError};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Attempts at drawing an unused resource id before giving up.
const ID_ATTEMPTS: usize = 8;

/// Outcome of [`ResourceStore::add_subresource`].
#[derive(Debug, Clone, PartialEq)]
pub struct Appended {
    pub subresource: Subresource,
    /// The parent after the append; its version moved only if a trigger fired.
    pub parent: Resource,
    /// Name of the trigger fired, if any.
    pub fired: Option<String>,
}

/// Versioned resource storage driven by an [`Engine`].
pub struct ResourceStore {
    engine: Arc<Engine>,
    backend: Arc<dyn Backend>,
    locks: LockTable,
    ids: IdGenerator,
    clock: Arc<dyn Clock>,
    lock_timeout: Duration,
}

impl std::fmt::Debug for ResourceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceStore")
            .field("backend", &self.backend.name())
            .field("types", &self.engine.types().count())
            .field("lock_timeout", &self.lock_timeout)
            .finish_non_exhaustive()
    }
}

impl ResourceStore {
    #[must_use]
    pub fn new(engine: Arc<Engine>, backend: Arc<dyn Backend>) -> Self {
        Self {
            engine,
            backend,
            locks: LockTable::new(),
            ids: IdGenerator::new(),
            clock: Arc::new(SystemClock),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// A store over a fresh [`MemoryBackend`].
    #[must_use]
    pub fn in_memory(engine: Arc<Engine>) -> Self {
        Self::new(engine, Arc::new(MemoryBackend::new()))
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// How long a writer waits for a contended resource before failing
    /// with [`Error::LockTimeout`].
    #[must_use]
    pub const fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Create a resource of `type_name` in its initial state at version 1.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownType`], [`Error::InvalidFields`], or a storage error.
    pub fn create(&self, type_name: &str, fields: Fields, actor: &Actor) -> Result<Resource> {
        let ty = Arc::clone(self.engine.resource_type(type_name)?);
        let fields = ty.check_create(fields).map_err(Error::invalid)?;
        let id = self.fresh_resource_id(type_name)?;
        let _lock = self.locks.acquire(&id, self.lock_timeout)?;

        let at = self.clock.now();
        let resource = Resource {
            id: id.clone(),
            type_name: type_name.to_string(),
            state: ty.initial().clone(),
            version: 1,
            fields: fields.clone(),
            created_at: at,
            updated_at: at,
        };

        let mut events = EventChain::start(id, self.operation_id(), at);
        events.push(
            actor,
            1,
            EventData::Create(CreateData {
                type_name: type_name.to_string(),
                state_field: ty.state_field().to_string(),
                state: resource.state.clone(),
                fields,
            }),
        )?;

        self.backend
            .commit(&Commit {
                previous_version: None,
                resource: resource.clone(),
                subresource: None,
                events: events.finish(),
            })
            .map_err(|e| match e {
                StorageError::Conflict { id, .. } => Error::StorageUnavailable(
                    StorageError::Unavailable(format!("id '{id}' was claimed by another writer")),
                ),
                other => other.into(),
            })?;
        info!(
            id = %resource.id,
            r#type = type_name,
            state = %resource.state,
            actor = %actor,
            "created resource"
        );
        Ok(resource)
    }

    /// Current stored form of a resource.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] or a storage error.
    pub fn get(&self, id: &ResourceId) -> Result<Resource> {
        self.backend
            .load(id)?
            .ok_or_else(|| Error::NotFound { id: id.clone() })
    }

    /// Merge-patch a resource at `expected_version`.
    ///
    /// A string in the state field requests a transition. An empty effective
    /// patch returns the resource unchanged and records nothing.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`], [`Error::VersionConflict`],
    /// [`Error::InvalidFields`], [`Error::IllegalTransition`],
    /// [`Error::LockTimeout`], or a storage error.
    pub fn apply_patch(
        &self,
        id: &ResourceId,
        expected_version: u64,
        changes: Fields,
        actor: &Actor,
    ) -> Result<Resource> {
        let _lock = self.locks.acquire(id, self.lock_timeout)?;
        let current = self.get(id)?;
        if current.version != expected_version {
            warn!(
                id = %id,
                expected = expected_version,
                actual = current.version,
                "rejected stale patch"
            );
            return Err(Error::VersionConflict {
                id: id.clone(),
                expected: expected_version,
                actual: current.version,
            });
        }

        let ty = Arc::clone(self.engine.resource_type(&current.type_name)?);
        let change = ty
            .split_patch(&current.state, &current.fields, changes)
            .map_err(Error::invalid)?;
        schema::validate_changes(ty.fields(), &change.fields).map_err(Error::invalid)?;

        let (next_state, via) = match ty.validate(&current.state, &current.fields, &change) {
            TransitionDecision::Allowed { next, via } => (next, via),
            TransitionDecision::Rejected(reason) => {
                warn!(id = %id, from = %current.state, reason = reason.code(), "rejected patch");
                return Err(Error::IllegalTransition {
                    id: id.clone(),
                    from: current.state,
                    reason,
                });
            }
        };
        if change.is_empty() {
            debug!(id = %id, version = current.version, "empty patch");
            return Ok(current);
        }

        let version = current.version + 1;
        let mut events = self.continue_chain(id)?;
        let at = events.at();

        let mut next = current.clone();
        schema::merge_into(&mut next.fields, &change.fields);
        next.version = version;
        next.updated_at = at;

        if !change.fields.is_empty() {
            events.push(
                actor,
                version,
                EventData::Update(UpdateData {
                    changes: change.fields,
                }),
            )?;
        }
        if let Some(transition) = via {
            set_state(&ty, &mut next, next_state.clone());
            events.push(
                actor,
                version,
                EventData::Transition(TransitionData {
                    from: current.state.clone(),
                    to: next_state,
                    transition,
                    cause: Cause::Explicit,
                }),
            )?;
        }

        self.backend.commit(&Commit {
            previous_version: Some(current.version),
            resource: next.clone(),
            subresource: None,
            events: events.finish(),
        })?;
        info!(
            id = %id,
            version,
            from = %current.state,
            to = %next.state,
            actor = %actor,
            "patched resource"
        );
        Ok(next)
    }

    /// Append an item to one of a resource's collections, firing at most one
    /// trigger.
    ///
    /// The append itself leaves the parent version alone; a fired trigger
    /// moves the parent to the trigger's destination at version + 1 in the
    /// same commit, attributed to the system actor.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`], [`Error::UnknownCollection`],
    /// [`Error::InvalidFields`], [`Error::LockTimeout`], or a storage error.
    pub fn add_subresource(
        &self,
        parent_id: &ResourceId,
        collection: &str,
        payload: Fields,
        actor: &Actor,
    ) -> Result<Appended> {
        let _lock = self.locks.acquire(parent_id, self.lock_timeout)?;
        let parent = self.get(parent_id)?;
        let ty = Arc::clone(self.engine.resource_type(&parent.type_name)?);
        let collections = Collections::new(&ty);
        collections.spec(collection)?;

        let mut events = self.continue_chain(parent_id)?;
        let at = events.at();
        let item_id = SubresourceId::from(self.ids.next_for(collection));
        let prepared = collections.prepare(&parent, collection, payload, item_id, actor, at)?;
        let item = prepared.subresource;

        events.push(
            actor,
            parent.version,
            EventData::Append(AppendData {
                collection: collection.to_string(),
                subresource: item.id.clone(),
                fields: item.fields.clone(),
            }),
        )?;

        let mut next = parent.clone();
        let fired = prepared.trigger.map(|trigger| trigger.name.clone());
        if let Some(trigger) = prepared.trigger {
            next.version = parent.version + 1;
            next.updated_at = at;
            set_state(&ty, &mut next, trigger.to.clone());
            events.push(
                &Actor::system(),
                next.version,
                EventData::Transition(TransitionData {
                    from: parent.state.clone(),
                    to: trigger.to.clone(),
                    transition: trigger.name.clone(),
                    cause: Cause::Trigger {
                        collection: collection.to_string(),
                        subresource: item.id.clone(),
                    },
                }),
            )?;
        }

        self.backend.commit(&Commit {
            previous_version: Some(parent.version),
            resource: next.clone(),
            subresource: Some(item.clone()),
            events: events.finish(),
        })?;
        info!(
            id = %parent_id,
            collection,
            item = %item.id,
            fired = fired.as_deref().unwrap_or("-"),
            actor = %actor,
            "added sub-resource"
        );
        Ok(Appended {
            subresource: item,
            parent: next,
            fired,
        })
    }

    /// History of a resource, oldest first.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] or a storage error.
    pub fn list_history(&self, id: &ResourceId) -> Result<EventSeq> {
        let events = self.backend.list(id)?;
        if events.is_empty() {
            return Err(Error::NotFound { id: id.clone() });
        }
        Ok(events)
    }

    /// What `caps` may do next with a resource.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] or a storage error.
    pub fn resolve_affordances(&self, id: &ResourceId, caps: &Capabilities) -> Result<AffordanceSet> {
        let resource = self.get(id)?;
        let ty = self.engine.resource_type(&resource.type_name)?;
        Ok(affordance::resolve(ty, &resource, caps))
    }

    /// Items of a collection in creation order.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`], [`Error::UnknownCollection`], or a storage error.
    pub fn list_subresources(&self, parent: &ResourceId, collection: &str) -> Result<Vec<Subresource>> {
        let resource = self.get(parent)?;
        let ty = self.engine.resource_type(&resource.type_name)?;
        Collections::new(ty).spec(collection)?;
        Ok(self.backend.subresources(parent, collection)?)
    }

    /// Stored resource ids, optionally of one type only.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownType`] or a storage error.
    pub fn list(&self, type_name: Option<&str>) -> Result<Vec<ResourceId>> {
        if let Some(name) = type_name {
            self.engine.resource_type(name)?;
        }
        Ok(self.backend.resource_ids(type_name)?)
    }

    /// Check a resource's stored history: the hash chain, the edges it takes,
    /// and that replaying it reproduces the stored resource and items.
    ///
    /// # Errors
    ///
    /// [`Error::CorruptHistory`] naming the first problem, [`Error::NotFound`],
    /// or a storage error.
    pub fn verify_history(&self, id: &ResourceId) -> Result<()> {
        let resource = self.get(id)?;
        let events = self.backend.list(id)?;
        let corrupt = |detail: String| Error::CorruptHistory {
            id: id.clone(),
            detail,
        };

        verify_chain(events.as_slice()).map_err(|e| corrupt(e.to_string()))?;
        let ty = self.engine.resource_type(&resource.type_name)?;
        let snapshot = replay_checked(ty, events.as_slice()).map_err(|e| corrupt(e.to_string()))?;

        if snapshot.state != resource.state {
            return Err(corrupt(format!(
                "history ends in '{}', stored state is '{}'",
                snapshot.state, resource.state
            )));
        }
        if snapshot.version != resource.version {
            return Err(corrupt(format!(
                "history ends at version {}, stored version is {}",
                snapshot.version, resource.version
            )));
        }
        if snapshot.fields != resource.fields {
            return Err(corrupt("replayed fields differ from stored fields".into()));
        }

        let mut appended: BTreeMap<&str, Vec<&SubresourceId>> = BTreeMap::new();
        for event in events.as_slice() {
            if let EventData::Append(data) = &event.data {
                appended
                    .entry(data.collection.as_str())
                    .or_default()
                    .push(&data.subresource);
            }
        }
        for name in ty.collections().keys() {
            let stored = self.backend.subresources(id, name)?;
            let recorded = appended.remove(name.as_str()).unwrap_or_default();
            let stored_ids: Vec<&SubresourceId> = stored.iter().map(|s| &s.id).collect();
            if stored_ids != recorded {
                return Err(corrupt(format!(
                    "collection '{name}' holds {} items, history records {}",
                    stored_ids.len(),
                    recorded.len()
                )));
            }
        }

        debug!(id = %id, events = events.len(), "verified history");
        Ok(())
    }

    fn fresh_resource_id(&self, type_name: &str) -> Result<ResourceId> {
        for _ in 0..ID_ATTEMPTS {
            let id = ResourceId::from(self.ids.next_for(type_name));
            if self.backend.load(&id)?.is_none() {
                return Ok(id);
            }
            debug!(id = %id, "id collision, drawing again");
        }
        Err(StorageError::Unavailable(format!(
            "no unused id for '{type_name}' after {ID_ATTEMPTS} attempts"
        ))
        .into())
    }

    fn operation_id(&self) -> OperationId {
        OperationId::from(self.ids.next_with_prefix("op"))
    }

    /// Start events after the stored head, timestamped no earlier than it.
    fn continue_chain(&self, id: &ResourceId) -> Result<EventChain> {
        let now = self.clock.now();
        let mut chain = EventChain::start(id.clone(), self.operation_id(), now);
        if let Some(head) = self.backend.head(id)? {
            chain.next_seq = head.seq + 1;
            chain.prev_hash = Some(head.event_hash);
            chain.at = now.max(head.at);
        }
        Ok(chain)
    }
}

/// Move `resource` to `state`, mirroring it into the state field.
fn set_state(ty: &ResourceType, resource: &mut Resource, state: StateId) {
    resource.fields.insert(
        ty.state_field().to_string(),
        Value::String(state.to_string()),
    );
    resource.state = state;
}

/// Events of one operation, sealed into the resource's hash chain as they
/// are pushed.
struct EventChain {
    resource_id: ResourceId,
    operation: OperationId,
    at: DateTime<Utc>,
    next_seq: u64,
    prev_hash: Option<String>,
    events: Vec<Event>,
}

impl EventChain {
    const fn start(resource_id: ResourceId, operation: OperationId, at: DateTime<Utc>) -> Self {
        Self {
            resource_id,
            operation,
            at,
            next_seq: 1,
            prev_hash: None,
            events: Vec::new(),
        }
    }

    const fn at(&self) -> DateTime<Utc> {
        self.at
    }

    fn push(&mut self, actor: &Actor, version: u64, data: EventData) -> Result<(), StorageError> {
        let mut event = Event {
            seq: self.next_seq,
            resource_id: self.resource_id.clone(),
            version,
            at: self.at,
            actor: actor.clone(),
            operation: self.operation.clone(),
            kind: data.kind(),
            data,
            prev_hash: self.prev_hash.take(),
            event_hash: String::new(),
        };
        hash::seal(&mut event)?;
        self.prev_hash = Some(event.event_hash.clone());
        self.next_seq += 1;
        self.events.push(event);
        Ok(())
    }

    fn finish(self) -> Vec<Event> {
        self.events
    }
}
