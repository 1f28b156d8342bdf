//! Arbitrary merge patches against a draft leave request.
//!
//! Whatever the patch, the store either rejects it and leaves the resource
//! untouched, or commits at most one version and keeps a verifiable history.

#![no_main]
use libfuzzer_sys::fuzz_target;
use serde_json::json;
use std::sync::Arc;
use waypoint_core::{Actor, Engine, Fields, ResourceStore};

fuzz_target!(|data: &[u8]| {
    let Ok(patch) = serde_json::from_slice::<Fields>(data) else {
        return;
    };
    let Ok(engine) = Engine::with_builtin() else {
        return;
    };
    let store = ResourceStore::in_memory(Arc::new(engine));
    let Ok(initial) = serde_json::from_value::<Fields>(json!({
        "employee": "alice",
        "from": "2025-11-12",
        "to": "2025-11-15",
    })) else {
        return;
    };
    let Ok(before) = store.create("leave-request", initial, &Actor::new("fuzz")) else {
        return;
    };

    match store.apply_patch(&before.id, 1, patch, &Actor::new("fuzz")) {
        Ok(after) => {
            assert!(after.version == 1 || after.version == 2);
            assert!(store.verify_history(&before.id).is_ok());
        }
        Err(_) => {
            assert_eq!(store.get(&before.id).ok(), Some(before));
        }
    }
});
