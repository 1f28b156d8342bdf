//! SQLite schema for the durable store.
//!
//! - `resources` holds the current version of every resource
//! - `events` is the append-only history; triggers refuse UPDATE and DELETE
//! - `subresources` holds collection items, immutable once written
//! - `store_meta` records the schema version next to `PRAGMA user_version`

/// Migration v1: resources, history and collections.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL
);

INSERT OR IGNORE INTO store_meta (id, schema_version) VALUES (1, 0);

CREATE TABLE IF NOT EXISTS resources (
    resource_id TEXT PRIMARY KEY,
    type_name TEXT NOT NULL,
    state TEXT NOT NULL,
    version INTEGER NOT NULL CHECK (version >= 1),
    fields_json TEXT NOT NULL,
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS events (
    resource_id TEXT NOT NULL,
    seq INTEGER NOT NULL CHECK (seq >= 1),
    version INTEGER NOT NULL,
    at_us INTEGER NOT NULL,
    actor TEXT NOT NULL,
    operation TEXT NOT NULL,
    kind TEXT NOT NULL,
    data_json TEXT NOT NULL,
    prev_hash TEXT,
    event_hash TEXT NOT NULL,
    PRIMARY KEY (resource_id, seq)
);

CREATE TABLE IF NOT EXISTS subresources (
    position INTEGER PRIMARY KEY AUTOINCREMENT,
    subresource_id TEXT NOT NULL UNIQUE,
    parent_id TEXT NOT NULL REFERENCES resources(resource_id),
    collection TEXT NOT NULL,
    fields_json TEXT NOT NULL,
    created_by TEXT NOT NULL,
    created_at_us INTEGER NOT NULL
);

CREATE TRIGGER IF NOT EXISTS events_no_update
BEFORE UPDATE ON events
BEGIN
    SELECT RAISE(ABORT, 'events are append-only');
END;

CREATE TRIGGER IF NOT EXISTS events_no_delete
BEFORE DELETE ON events
BEGIN
    SELECT RAISE(ABORT, 'events are append-only');
END;

CREATE TRIGGER IF NOT EXISTS subresources_no_update
BEFORE UPDATE ON subresources
BEGIN
    SELECT RAISE(ABORT, 'subresources are immutable');
END;
";

/// Migration v2: lookup indexes.
pub const MIGRATION_V2_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_resources_type
    ON resources(type_name, resource_id);

CREATE INDEX IF NOT EXISTS idx_subresources_parent
    ON subresources(parent_id, collection, position);

CREATE INDEX IF NOT EXISTS idx_events_operation
    ON events(operation);
";

/// Indexes every migrated database must have.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_resources_type",
    "idx_subresources_parent",
    "idx_events_operation",
];
