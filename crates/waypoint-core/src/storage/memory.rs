use super::{Backend, Commit, StorageError, check_sequence};
use crate::history::{Event, EventSeq, HistoryLog};
use crate::model::{Resource, ResourceId, Subresource};
use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Default)]
struct State {
    resources: BTreeMap<ResourceId, Resource>,
    events: HashMap<ResourceId, Vec<Event>>,
    subresources: HashMap<(ResourceId, String), Vec<Subresource>>,
}

/// Process-local backend. Everything lives behind one lock, so a commit is
/// trivially atomic.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: RwLock<State>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryLog for MemoryBackend {
    fn append(&self, event: &Event) -> Result<(), StorageError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state
            .events
            .entry(event.resource_id.clone())
            .or_default()
            .push(event.clone());
        Ok(())
    }

    fn list(&self, id: &ResourceId) -> Result<EventSeq, StorageError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state
            .events
            .get(id)
            .map_or_else(EventSeq::empty, |events| EventSeq::new(events.as_slice())))
    }
}

impl Backend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn load(&self, id: &ResourceId) -> Result<Option<Resource>, StorageError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state.resources.get(id).cloned())
    }

    fn commit(&self, commit: &Commit) -> Result<(), StorageError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let id = &commit.resource.id;

        let stored = state.resources.get(id).map(|r| r.version);
        match (commit.previous_version, stored) {
            (None, None) => {}
            (Some(expected), Some(actual)) if expected == actual => {}
            (expected, actual) => {
                return Err(StorageError::Conflict {
                    id: id.clone(),
                    expected: expected.unwrap_or_default(),
                    actual: actual.unwrap_or_default(),
                });
            }
        }

        let head_seq = state
            .events
            .get(id)
            .and_then(|events| events.last())
            .map_or(0, |e| e.seq);
        check_sequence(commit, head_seq)?;

        state.resources.insert(id.clone(), commit.resource.clone());
        if let Some(item) = &commit.subresource {
            state
                .subresources
                .entry((item.parent.clone(), item.collection.clone()))
                .or_default()
                .push(item.clone());
        }
        state
            .events
            .entry(id.clone())
            .or_default()
            .extend(commit.events.iter().cloned());
        Ok(())
    }

    fn subresources(
        &self,
        parent: &ResourceId,
        collection: &str,
    ) -> Result<Vec<Subresource>, StorageError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state
            .subresources
            .get(&(parent.clone(), collection.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    fn resource_ids(&self, type_name: Option<&str>) -> Result<Vec<ResourceId>, StorageError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state
            .resources
            .values()
            .filter(|r| type_name.is_none_or(|t| r.type_name == t))
            .map(|r| r.id.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::tests::sample_history;
    use crate::model::{Fields, StateId};
    use chrono::Utc;

    fn resource(version: u64) -> Resource {
        Resource {
            id: ResourceId::from("lr-1"),
            type_name: "leave-request".into(),
            state: StateId::from("draft"),
            version,
            fields: Fields::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn insert_then_compare_and_swap() {
        let backend = MemoryBackend::new();
        let events = sample_history();
        backend
            .commit(&Commit {
                previous_version: None,
                resource: resource(1),
                subresource: None,
                events: vec![events[0].clone()],
            })
            .expect("insert");

        let err = backend
            .commit(&Commit {
                previous_version: None,
                resource: resource(1),
                subresource: None,
                events: vec![],
            })
            .expect_err("duplicate insert");
        assert!(matches!(err, StorageError::Conflict { actual: 1, .. }));

        let stale = Commit {
            previous_version: Some(7),
            resource: resource(8),
            subresource: None,
            events: vec![],
        };
        assert!(matches!(
            backend.commit(&stale),
            Err(StorageError::Conflict {
                expected: 7,
                actual: 1,
                ..
            })
        ));

        backend
            .commit(&Commit {
                previous_version: Some(1),
                resource: resource(2),
                subresource: None,
                events: vec![events[1].clone()],
            })
            .expect("update");
        assert_eq!(backend.load(&ResourceId::from("lr-1")).expect("load").map(|r| r.version), Some(2));
        assert_eq!(backend.list(&ResourceId::from("lr-1")).expect("list").len(), 2);
        assert_eq!(backend.resource_ids(Some("document")).expect("ids").len(), 0);
        assert_eq!(backend.resource_ids(None).expect("ids").len(), 1);
    }

    #[test]
    fn out_of_sequence_events_are_refused() {
        let backend = MemoryBackend::new();
        let events = sample_history();
        let err = backend
            .commit(&Commit {
                previous_version: None,
                resource: resource(1),
                subresource: None,
                events: vec![events[1].clone()],
            })
            .expect_err("seq 2 cannot start a history");
        assert!(matches!(err, StorageError::Corrupt(_)));
        assert!(backend.load(&ResourceId::from("lr-1")).expect("load").is_none());
    }

    #[test]
    fn listed_history_is_a_snapshot() {
        let backend = MemoryBackend::new();
        let events = sample_history();
        backend.append(&events[0]).expect("append");
        let seq = backend.list(&events[0].resource_id).expect("list");
        backend.append(&events[1]).expect("append");
        assert_eq!(seq.count(), 1);
        assert_eq!(backend.head(&events[0].resource_id).expect("head").map(|e| e.seq), Some(2));
    }
}
