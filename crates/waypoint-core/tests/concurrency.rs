//! Concurrent writers against one store.

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use serde_json::{Value, json};
use tempfile::TempDir;
use waypoint_core::storage::SqliteBackend;
use waypoint_core::{Actor, Engine, Error, Fields, ResourceId, ResourceStore};

const WRITERS: usize = 8;

fn fields(value: Value) -> Fields {
    serde_json::from_value(value).expect("fields object")
}

fn create(store: &ResourceStore) -> ResourceId {
    store
        .create(
            "leave-request",
            fields(json!({"employee": "alice", "from": "2025-11-12", "to": "2025-11-15"})),
            &Actor::new("alice"),
        )
        .expect("create")
        .id
}

/// `WRITERS` threads patch the same version at once; exactly one wins.
fn race_same_version(store: &Arc<ResourceStore>) {
    let id = create(store);
    let barrier = Arc::new(Barrier::new(WRITERS));

    let handles: Vec<_> = (0..WRITERS)
        .map(|n| {
            let store = Arc::clone(store);
            let barrier = Arc::clone(&barrier);
            let id = id.clone();
            thread::spawn(move || {
                barrier.wait();
                store.apply_patch(
                    &id,
                    1,
                    fields(json!({"reason": format!("writer {n}")})),
                    &Actor::new(format!("w{n}")),
                )
            })
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("writer thread"))
        .collect();
    let wins = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(Error::VersionConflict { .. })))
        .count();
    assert_eq!(wins, 1, "results: {results:?}");
    assert_eq!(conflicts, WRITERS - 1, "results: {results:?}");

    assert_eq!(store.get(&id).expect("get").version, 2);
    assert_eq!(store.list_history(&id).expect("history").len(), 2);
    store.verify_history(&id).expect("history verifies");
}

#[test]
fn one_winner_per_version_in_memory() {
    let engine = Arc::new(Engine::with_builtin().expect("builtin"));
    race_same_version(&Arc::new(ResourceStore::in_memory(engine)));
}

#[test]
fn one_winner_per_version_sqlite() {
    let dir = TempDir::new().expect("temp dir");
    let backend = SqliteBackend::open(&dir.path().join("race.sqlite3")).expect("open");
    let engine = Arc::new(Engine::with_builtin().expect("builtin"));
    race_same_version(&Arc::new(ResourceStore::new(engine, Arc::new(backend))));
}

#[test]
fn retrying_writers_produce_gapless_versions() {
    let engine = Arc::new(Engine::with_builtin().expect("builtin"));
    let store = Arc::new(ResourceStore::in_memory(engine));
    let id = create(&store);
    let rounds = 5;

    let handles: Vec<_> = (0..4)
        .map(|n| {
            let store = Arc::clone(&store);
            let id = id.clone();
            thread::spawn(move || {
                for round in 0..rounds {
                    loop {
                        let current = store.get(&id).expect("get");
                        let patch = fields(json!({"reason": format!("w{n} r{round}")}));
                        match store.apply_patch(&id, current.version, patch, &Actor::new("w")) {
                            Ok(_) => break,
                            Err(Error::VersionConflict { .. }) => {}
                            Err(other) => panic!("unexpected error: {other}"),
                        }
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("writer thread");
    }

    let history = store.list_history(&id).expect("history");
    let versions: Vec<u64> = history.map(|e| e.version).collect();
    let expected: Vec<u64> = (1..=1 + 4 * rounds).collect();
    assert_eq!(versions, expected);
    store.verify_history(&id).expect("history verifies");
}

#[test]
fn distinct_resources_do_not_contend() {
    let engine = Arc::new(Engine::with_builtin().expect("builtin"));
    let store = Arc::new(
        ResourceStore::in_memory(engine).with_lock_timeout(Duration::from_millis(200)),
    );
    let ids: Vec<ResourceId> = (0..WRITERS).map(|_| create(&store)).collect();
    let barrier = Arc::new(Barrier::new(WRITERS));

    let handles: Vec<_> = ids
        .iter()
        .cloned()
        .map(|id| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                store.apply_patch(&id, 1, fields(json!({"status": "submitted"})), &Actor::new("alice"))
            })
        })
        .collect();
    for handle in handles {
        let resource = handle.join().expect("thread").expect("submit");
        assert_eq!(resource.state, "submitted");
    }
}
