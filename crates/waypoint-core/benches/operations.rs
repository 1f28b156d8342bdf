use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use serde_json::{Value, json};
use waypoint_core::history::{replay, verify_chain};
use waypoint_core::{Actor, Capabilities, Engine, Fields, ResourceId, ResourceStore};

const HISTORY_TIERS: &[usize] = &[10, 100, 1_000];

fn fields(value: Value) -> Fields {
    serde_json::from_value(value).unwrap_or_default()
}

fn store() -> ResourceStore {
    let engine = Engine::with_builtin().unwrap_or_default();
    ResourceStore::in_memory(Arc::new(engine))
}

fn create(store: &ResourceStore) -> Option<ResourceId> {
    store
        .create(
            "leave-request",
            fields(json!({"employee": "alice", "from": "2025-11-12", "to": "2025-11-15"})),
            &Actor::new("bench"),
        )
        .ok()
        .map(|r| r.id)
}

/// A draft with `edits` reason edits on top of its create event.
fn edited(store: &ResourceStore, edits: usize) -> Option<ResourceId> {
    let id = create(store)?;
    for n in 0..edits {
        let version = u64::try_from(n).ok()? + 1;
        store
            .apply_patch(&id, version, fields(json!({"reason": format!("edit {n}")})), &Actor::new("bench"))
            .ok()?;
    }
    Some(id)
}

fn bench_mutations(c: &mut Criterion) {
    let mut group = c.benchmark_group("operations.mutate");
    let store = store();

    group.bench_function("create", |b| b.iter(|| black_box(create(&store))));

    group.bench_function("patch", |b| {
        let id = create(&store);
        let mut version = 1;
        b.iter(|| {
            let Some(id) = &id else { return };
            let patch = fields(json!({"reason": format!("v{version}")}));
            if store.apply_patch(id, version, patch, &Actor::new("bench")).is_ok() {
                version += 1;
            }
        });
    });

    group.bench_function("submit_and_approve", |b| {
        b.iter(|| {
            let Some(id) = create(&store) else { return };
            let _ = store.apply_patch(&id, 1, fields(json!({"status": "submitted"})), &Actor::new("bench"));
            black_box(store.add_subresource(
                &id,
                "approvals",
                fields(json!({"reviewer": "bob", "decision": "approved"})),
                &Actor::new("bob"),
            ))
        });
    });

    group.finish();
}

fn bench_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("operations.read");
    let store = store();
    let caps: Capabilities = ["requester", "reviewer"].into_iter().collect();

    for &edits in HISTORY_TIERS {
        let Some(id) = edited(&store, edits) else {
            continue;
        };
        let events = store
            .list_history(&id)
            .map(|seq| seq.as_slice().to_vec())
            .unwrap_or_default();
        group.throughput(Throughput::Elements(events.len() as u64));

        group.bench_with_input(BenchmarkId::new("affordances", edits), &id, |b, id| {
            b.iter(|| black_box(store.resolve_affordances(id, &caps)));
        });
        group.bench_with_input(BenchmarkId::new("verify_chain", edits), &events, |b, events| {
            b.iter(|| black_box(verify_chain(events)));
        });
        group.bench_with_input(BenchmarkId::new("replay", edits), &events, |b, events| {
            b.iter(|| black_box(replay(events)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_mutations, bench_reads);
criterion_main!(benches);
