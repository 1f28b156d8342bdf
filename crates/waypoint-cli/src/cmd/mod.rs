//! Subcommand handlers.
//!
//! Each handler takes its clap args and the shared [`Context`] and renders
//! its result through [`crate::output`]. Failures a handler has already
//! rendered come back as [`Reported`] so `main` exits non-zero without
//! printing them twice.

pub mod append;
pub mod completions;
pub mod create;
pub mod history;
pub mod items;
pub mod list;
pub mod patch;
pub mod show;
pub mod types;
pub mod verify;

use crate::actor;
use crate::output::{CliError, OutputMode, render_error};
use anyhow::Context as _;
use clap::Args;
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use waypoint_core::config::{self, ProjectConfig, UserConfig};
use waypoint_core::{Actor, Capabilities, Engine, Fields, ResourceStore};

/// A failure already rendered to stderr.
#[derive(Debug)]
pub struct Reported(pub String);

impl fmt::Display for Reported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Reported {}

/// Render `error` and return the matching [`Reported`] failure.
pub fn report(output: OutputMode, error: &CliError) -> anyhow::Error {
    if let Err(render_err) = render_error(output, error) {
        return render_err;
    }
    Reported(error.message.clone()).into()
}

/// `--cap` given after a subcommand that resolves affordances.
#[derive(Args, Debug, Default, Clone)]
pub struct CapArgs {
    /// Capability held by the caller. Repeatable.
    #[arg(long = "cap", value_name = "CAP")]
    pub caps: Vec<String>,
}

/// Invocation-wide settings shared by every handler.
#[derive(Debug)]
pub struct Context {
    pub project_root: PathBuf,
    pub output: OutputMode,
    pub db: Option<PathBuf>,
    pub actor_flag: Option<String>,
    pub caps: Vec<String>,
    pub user: UserConfig,
}

impl Context {
    fn project_config(&self) -> anyhow::Result<ProjectConfig> {
        config::load_project_config(&self.project_root)
    }

    /// Build the engine from the project's type configuration.
    pub fn engine(&self) -> anyhow::Result<Engine> {
        let project = self.project_config()?;
        config::build_engine(&self.project_root, &project.types)
    }

    /// Open the configured store, creating the database file if needed.
    pub fn open_store(&self) -> anyhow::Result<ResourceStore> {
        let project = self.project_config()?;
        let engine = config::build_engine(&self.project_root, &project.types)?;
        let env_db = std::env::var("WAYPOINT_DB").ok();
        let db_path = config::resolve_db_path(
            &self.project_root,
            &project,
            env_db.as_deref(),
            self.db.as_deref(),
        );
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tracing::debug!(db = %db_path.display(), "opening store");
        config::open_store(engine, &project, &db_path)
    }

    pub fn capabilities(&self) -> Capabilities {
        self.caps.iter().map(String::as_str).collect()
    }

    /// Resolve the acting identity, rendering an error when none is set.
    pub fn require_actor(&self) -> anyhow::Result<Actor> {
        let name = match actor::require_actor(self.actor_flag.as_deref(), self.user.actor.as_deref()) {
            Ok(name) => name,
            Err(e) => {
                return Err(report(
                    self.output,
                    &CliError::with_details(
                        &e.message,
                        "Set --actor, WAYPOINT_ACTOR, or `actor` in the user config",
                        e.code,
                    ),
                ));
            }
        };
        if name == Actor::SYSTEM {
            return Err(report(
                self.output,
                &CliError::with_details(
                    format!("'{name}' is reserved for trigger-fired transitions"),
                    "Pick another actor name",
                    "reserved_actor",
                ),
            ));
        }
        Ok(Actor::new(name))
    }

    /// Render a store error and turn it into the command's failure.
    pub fn fail(&self, err: &waypoint_core::Error) -> anyhow::Error {
        report(self.output, &CliError::from(err))
    }
}

/// Parse a `key=value` argument. The value is JSON when it parses as JSON
/// and a plain string otherwise.
pub fn parse_field(arg: &str) -> Result<(String, Value), String> {
    let (key, raw) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{arg}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing field name in '{arg}'"));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

/// Collect parsed `key=value` pairs; later duplicates win.
pub fn collect_fields(pairs: &[(String, Value)]) -> Fields {
    pairs.iter().cloned().collect()
}

/// Project root used when the command does not override it.
pub fn default_project_root() -> anyhow::Result<PathBuf> {
    std::env::current_dir().context("Failed to read the current directory")
}

/// Render a JSON value compactly for text rows.
pub fn compact(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
