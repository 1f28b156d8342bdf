//! End-to-end tests for the `wp` binary.
//!
//! Each test runs `wp` as a subprocess in an isolated temp directory with
//! its own SQLite file, so invocations share state only through the store.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Test Harness
// ---------------------------------------------------------------------------

/// Build a Command targeting the wp binary, rooted in `dir`.
fn wp(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("wp"));
    cmd.current_dir(dir);
    cmd.env("WAYPOINT_LOG", "error");
    cmd.env("WAYPOINT_ACTOR", "alice");
    // Keep the developer's user config out of the tests.
    cmd.env("XDG_CONFIG_HOME", dir.join("xdg"));
    cmd.env_remove("FORMAT");
    cmd.env_remove("WAYPOINT_DB");
    cmd.arg("--db").arg(dir.join("store.sqlite3"));
    cmd
}

/// Run a command that must succeed and parse its JSON stdout.
fn json_ok(cmd: &mut Command) -> Value {
    let output = cmd.arg("--json").output().expect("wp should not crash");
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("--json should produce valid JSON")
}

/// Run a command that must fail and parse its JSON stderr.
fn json_err(cmd: &mut Command) -> Value {
    let output = cmd.arg("--json").output().expect("wp should not crash");
    assert!(!output.status.success(), "command unexpectedly succeeded");
    serde_json::from_slice(&output.stderr).expect("errors should be valid JSON")
}

fn create_leave_request(dir: &Path) -> String {
    let json = json_ok(wp(dir).args([
        "create",
        "leave-request",
        "employee=alice",
        "from=2025-11-12",
        "to=2025-11-15",
    ]));
    json["id"]
        .as_str()
        .expect("create output should have 'id'")
        .to_string()
}

fn action_names(json: &Value) -> Vec<String> {
    json["actions"]
        .as_array()
        .expect("actions array")
        .iter()
        .filter_map(|a| a["name"].as_str().map(str::to_string))
        .collect()
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[test]
fn types_lists_the_builtin_catalog() {
    let dir = TempDir::new().expect("tempdir");
    wp(dir.path())
        .args(["--format", "text", "types"])
        .assert()
        .success()
        .stdout(predicate::str::contains("leave-request  draft"))
        .stdout(predicate::str::contains("document"))
        .stdout(predicate::str::contains("render-job"));
}

#[test]
fn types_shows_one_definition_as_json() {
    let dir = TempDir::new().expect("tempdir");
    let json = json_ok(wp(dir.path()).args(["types", "leave-request"]));
    assert_eq!(json["name"], "leave-request");
    assert_eq!(json["initial"], "draft");
    assert_eq!(json["state_field"], "status");
    assert!(json["collections"]["approvals"].is_object());
}

#[test]
fn unknown_type_is_reported_with_code() {
    let dir = TempDir::new().expect("tempdir");
    let err = json_err(wp(dir.path()).args(["types", "invoice"]));
    assert_eq!(err["error"]["error_code"], "E2006");
}

#[test]
fn project_type_directory_is_loaded() {
    let dir = TempDir::new().expect("tempdir");
    let types = dir.path().join(".waypoint/types");
    std::fs::create_dir_all(&types).expect("types dir");
    std::fs::write(
        types.join("invoice.toml"),
        r#"
name = "invoice"
initial = "open"
states = ["open", "paid"]

[fields.amount]
kind = "number"
required = true

[[transitions]]
name = "pay"
from = "open"
to = "paid"
"#,
    )
    .expect("write type");

    let created = json_ok(wp(dir.path()).args(["create", "invoice", "amount=120.5"]));
    assert_eq!(created["state"], "open");
    assert_eq!(created["fields"]["amount"], 120.5);
    assert_eq!(action_names(&created), vec!["pay", "edit"]);
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn leave_request_happy_path() {
    let dir = TempDir::new().expect("tempdir");
    let id = create_leave_request(dir.path());

    let shown = json_ok(wp(dir.path()).args(["show", &id]));
    assert_eq!(shown["state"], "draft");
    assert_eq!(shown["version"], 1);

    let submitted = json_ok(wp(dir.path()).args([
        "patch",
        &id,
        "--version",
        "1",
        "status=submitted",
    ]));
    assert_eq!(submitted["state"], "submitted");
    assert_eq!(submitted["version"], 2);

    let appended = json_ok(wp(dir.path()).args([
        "--actor",
        "bob",
        "append",
        &id,
        "approvals",
        "reviewer=bob",
        "decision=approved",
    ]));
    assert_eq!(appended["fired"], "approve");
    assert_eq!(appended["parent"]["state"], "approved");
    assert_eq!(appended["parent"]["version"], 3);
    assert_eq!(appended["item"]["created_by"], "bob");

    let closed = json_ok(wp(dir.path()).args(["patch", &id, "--version", "3", "status=closed"]));
    assert_eq!(closed["state"], "closed");
    assert_eq!(closed["version"], 4);

    let items = json_ok(wp(dir.path()).args(["items", &id, "approvals"]));
    assert_eq!(items.as_array().map(Vec::len), Some(1));
    assert_eq!(items[0]["fields"]["decision"], "approved");

    let history = json_ok(wp(dir.path()).args(["history", &id]));
    let events = history.as_array().expect("events array");
    assert_eq!(events[0]["kind"], "resource.create");
    let seqs: Vec<u64> = events.iter().filter_map(|e| e["seq"].as_u64()).collect();
    let expected: Vec<u64> = (1..=seqs.len() as u64).collect();
    assert_eq!(seqs, expected);
    assert!(events.iter().any(|e| e["actor"] == "system"));
    assert_eq!(events.last().map(|e| e["version"].clone()), Some(Value::from(4)));

    wp(dir.path())
        .args(["--format", "text", "verify", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("{id}  ok")));
}

#[test]
fn affordances_follow_capabilities() {
    let dir = TempDir::new().expect("tempdir");
    let id = create_leave_request(dir.path());

    let anonymous = json_ok(wp(dir.path()).args(["show", &id]));
    assert!(action_names(&anonymous).is_empty());

    let requester = json_ok(wp(dir.path()).args(["--cap", "requester", "show", &id]));
    assert_eq!(action_names(&requester), vec!["submit", "edit"]);
    assert_eq!(requester["actions"][0]["fields"][0]["value"], "submitted");

    json_ok(wp(dir.path()).args(["patch", &id, "--version", "1", "status=submitted"]));

    let reviewer = json_ok(wp(dir.path()).args(["--cap", "reviewer", "show", &id]));
    assert_eq!(action_names(&reviewer), vec!["approve", "reject"]);

    let both = json_ok(wp(dir.path()).args(["--cap", "requester", "show", &id, "--cap", "reviewer"]));
    assert_eq!(
        action_names(&both),
        vec!["withdraw", "approve", "reject", "edit"]
    );
}

#[test]
fn text_show_prints_links_and_actions() {
    let dir = TempDir::new().expect("tempdir");
    let id = create_leave_request(dir.path());

    wp(dir.path())
        .args(["--format", "text", "--cap", "requester", "show", &id])
        .assert()
        .success()
        .stdout(predicate::str::starts_with(format!("{id}  leave-request  draft  v1")))
        .stdout(predicate::str::contains(format!("link self /leave-request/{id}")))
        .stdout(predicate::str::contains("action submit PATCH"));
}

#[test]
fn list_filters_by_type() {
    let dir = TempDir::new().expect("tempdir");
    let lr = create_leave_request(dir.path());
    let doc = json_ok(wp(dir.path()).args(["create", "document", "title=Plan", "author=alice"]));
    let doc_id = doc["id"].as_str().expect("doc id").to_string();

    let all = json_ok(wp(dir.path()).args(["list"]));
    assert_eq!(all.as_array().map(Vec::len), Some(2));

    let only = json_ok(wp(dir.path()).args(["list", "--type", "document"]));
    assert_eq!(only.as_array().map(Vec::len), Some(1));
    assert_eq!(only[0]["id"], Value::from(doc_id));
    assert_ne!(only[0]["id"], Value::from(lr));
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[test]
fn illegal_transition_is_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let id = create_leave_request(dir.path());

    wp(dir.path())
        .args(["--format", "text", "patch", &id, "--version", "1", "status=closed"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error[E2004]"));

    let shown = json_ok(wp(dir.path()).args(["show", &id]));
    assert_eq!(shown["version"], 1);
}

#[test]
fn stale_version_conflicts() {
    let dir = TempDir::new().expect("tempdir");
    let id = create_leave_request(dir.path());

    json_ok(wp(dir.path()).args(["patch", &id, "--version", "1", "reason=x"]));
    let err = json_err(wp(dir.path()).args(["patch", &id, "--version", "1", "reason=y"]));
    assert_eq!(err["error"]["error_code"], "E2003");
    assert!(err["error"]["suggestion"].is_string());
}

#[test]
fn invalid_fields_are_listed() {
    let dir = TempDir::new().expect("tempdir");
    let err = json_err(wp(dir.path()).args(["create", "leave-request", "employee=alice", "mood=great"]));
    assert_eq!(err["error"]["error_code"], "E2002");
    let message = err["error"]["message"].as_str().expect("message");
    assert!(message.contains("mood"));
    assert!(message.contains("from"));
}

#[test]
fn unknown_collection_is_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let id = create_leave_request(dir.path());
    let err = json_err(wp(dir.path()).args(["append", &id, "comments", "text=hi"]));
    assert_eq!(err["error"]["error_code"], "E2005");
}

#[test]
fn missing_resource_is_not_found() {
    let dir = TempDir::new().expect("tempdir");
    let err = json_err(wp(dir.path()).args(["show", "lr-0000000000"]));
    assert_eq!(err["error"]["error_code"], "E2001");
}

#[test]
fn mutations_require_an_actor() {
    let dir = TempDir::new().expect("tempdir");
    let err = json_err(
        wp(dir.path())
            .env_remove("WAYPOINT_ACTOR")
            .args(["create", "document", "title=Plan", "author=alice"]),
    );
    assert_eq!(err["error"]["error_code"], "missing_actor");
}

#[test]
fn system_actor_is_reserved() {
    let dir = TempDir::new().expect("tempdir");
    let err = json_err(wp(dir.path()).args([
        "--actor",
        "system",
        "create",
        "document",
        "title=Plan",
        "author=alice",
    ]));
    assert_eq!(err["error"]["error_code"], "reserved_actor");
}

#[test]
fn reads_work_without_an_actor() {
    let dir = TempDir::new().expect("tempdir");
    let id = create_leave_request(dir.path());
    wp(dir.path())
        .env_remove("WAYPOINT_ACTOR")
        .args(["history", &id])
        .assert()
        .success();
}

#[test]
fn malformed_field_argument_is_a_usage_error() {
    let dir = TempDir::new().expect("tempdir");
    wp(dir.path())
        .args(["create", "document", "title"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("expected key=value"));
}

// ---------------------------------------------------------------------------
// Misc
// ---------------------------------------------------------------------------

#[test]
fn verify_with_no_resources_succeeds() {
    let dir = TempDir::new().expect("tempdir");
    let rows = json_ok(wp(dir.path()).args(["verify"]));
    assert_eq!(rows, Value::Array(Vec::new()));
}

#[test]
fn verify_reports_missing_resources() {
    let dir = TempDir::new().expect("tempdir");
    let id = create_leave_request(dir.path());
    let output = wp(dir.path())
        .args(["--json", "verify", &id, "lr-0000000000"])
        .output()
        .expect("wp should not crash");
    assert!(!output.status.success());
    let rows: Value = serde_json::from_slice(&output.stdout).expect("rows json");
    assert_eq!(rows[0]["ok"], true);
    assert_eq!(rows[1]["ok"], false);
    assert_eq!(rows[1]["error_code"], "E2001");
}

#[test]
fn env_database_path_is_honored() {
    let dir = TempDir::new().expect("tempdir");
    let db = dir.path().join("env.sqlite3");
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("wp"));
    cmd.current_dir(dir.path())
        .env("WAYPOINT_LOG", "error")
        .env("WAYPOINT_ACTOR", "alice")
        .env("XDG_CONFIG_HOME", dir.path().join("xdg"))
        .env("WAYPOINT_DB", &db)
        .args(["--json", "create", "document", "title=Plan", "author=alice"])
        .assert()
        .success();
    assert!(db.exists());
    assert!(!dir.path().join(".waypoint/waypoint.sqlite3").exists());
}

#[test]
fn completions_generate_a_script() {
    let dir = TempDir::new().expect("tempdir");
    wp(dir.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("wp"));
}

#[test]
fn broken_project_files_report_config_codes() {
    let dir = TempDir::new().expect("tempdir");
    let project = dir.path().join(".waypoint");
    std::fs::create_dir_all(project.join("types")).expect("types dir");

    std::fs::write(
        project.join("types/loop.toml"),
        "name = \"gate\"\ninitial = \"a\"\nstates = [\"a\"]\n\n[[transitions]]\nname = \"refresh\"\nfrom = \"a\"\nto = \"a\"\n",
    )
    .expect("write type");
    let err = json_err(wp(dir.path()).arg("types"));
    assert_eq!(err["error"]["error_code"], "E1003");
    assert!(err["error"]["message"].as_str().is_some_and(|m| m.contains("loop.toml")));

    std::fs::write(project.join("config.toml"), "[store\n").expect("write config");
    let err = json_err(wp(dir.path()).arg("types"));
    assert_eq!(err["error"]["error_code"], "E1002");
    assert!(err["error"]["suggestion"].is_string());
}
