//! Type definition loading must reject bad input with an error, never panic.
//! Whatever registers must be usable by the engine straight away.

#![no_main]
use libfuzzer_sys::fuzz_target;
use waypoint_core::machine::{ResourceType, TypeDefinition};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(def) = TypeDefinition::from_toml(text) else {
        return;
    };
    let Ok(ty) = ResourceType::new(def) else {
        return;
    };

    assert!(ty.has_state(ty.initial()));
    for state in ty.states() {
        for edge in ty.outgoing(state) {
            assert!(ty.has_state(&edge.to));
        }
        for trigger in ty.triggers_from(state) {
            assert!(ty.collection(&trigger.collection).is_some());
        }
    }
});
