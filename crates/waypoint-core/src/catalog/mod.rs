//! Built-in resource types, embedded as TOML definitions.

/// `(name, toml)` pairs in registration order.
pub const SOURCES: &[(&str, &str)] = &[
    ("leave-request", include_str!("leave-request.toml")),
    ("document", include_str!("document.toml")),
    ("render-job", include_str!("render-job.toml")),
];
