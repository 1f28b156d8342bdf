//! Opaque short identifiers.
//!
//! Ids look like `lr-3f9a1c02be`: a prefix derived from the type or
//! collection name, then ten hex digits of a BLAKE3 digest over a process-wide
//! counter, the current time and the process id. They carry no meaning;
//! callers must not parse them.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

const HEX_LEN: usize = 10;

/// Generates unique ids for resources, sub-resources and operations.
#[derive(Debug, Default)]
pub struct IdGenerator {
    counter: AtomicU64,
}

impl IdGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id for something named `name` (a type or collection name).
    pub fn next_for(&self, name: &str) -> String {
        self.next_with_prefix(&prefix_for(name))
    }

    /// Next id with a literal prefix.
    pub fn next_with_prefix(&self, prefix: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();

        let mut hasher = blake3::Hasher::new();
        hasher.update(prefix.as_bytes());
        hasher.update(&n.to_le_bytes());
        hasher.update(&nanos.to_le_bytes());
        hasher.update(&std::process::id().to_le_bytes());
        let hex = hasher.finalize().to_hex();
        format!("{prefix}-{}", &hex.as_str()[..HEX_LEN])
    }
}

/// Initials of a hyphenated name (`leave-request` -> `lr`), or the first two
/// characters of a single word (`approvals` -> `ap`).
#[must_use]
pub fn prefix_for(name: &str) -> String {
    let words: Vec<&str> = name
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let prefix: String = match words.as_slice() {
        [] => "id".to_string(),
        [word] => word.chars().take(2).collect(),
        many => many.iter().filter_map(|w| w.chars().next()).collect(),
    };
    prefix.to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn prefixes() {
        assert_eq!(prefix_for("leave-request"), "lr");
        assert_eq!(prefix_for("render-job"), "rj");
        assert_eq!(prefix_for("document"), "do");
        assert_eq!(prefix_for("approvals"), "ap");
        assert_eq!(prefix_for("Purchase_Order_Line"), "pol");
        assert_eq!(prefix_for("--"), "id");
    }

    #[test]
    fn ids_are_unique_and_shaped() {
        let ids = IdGenerator::new();
        let generated: HashSet<String> = (0..1_000).map(|_| ids.next_for("leave-request")).collect();
        assert_eq!(generated.len(), 1_000);
        for id in &generated {
            let (prefix, hex) = id.split_once('-').expect("separator");
            assert_eq!(prefix, "lr");
            assert_eq!(hex.len(), HEX_LEN);
            assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }
}
