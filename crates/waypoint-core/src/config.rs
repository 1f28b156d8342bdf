use crate::error::ErrorCode;
use crate::machine::{DefinitionError, Engine, EngineBuilder};
use crate::storage::{Backend, MemoryBackend, SqliteBackend};
use crate::store::ResourceStore;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Project configuration directory under the project root.
pub const PROJECT_DIR: &str = ".waypoint";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub types: TypesConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl StoreConfig {
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Memory,
    #[default]
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: BackendKind,
    /// Relative paths resolve against the project root.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypesConfig {
    #[serde(default = "default_true")]
    pub builtin: bool,
    /// Directories of extra `*.toml` type definitions.
    #[serde(default = "default_type_dirs")]
    pub dirs: Vec<PathBuf>,
}

impl Default for TypesConfig {
    fn default() -> Self {
        Self {
            builtin: default_true(),
            dirs: default_type_dirs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    /// Default actor for mutating commands.
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
}

pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let path = project_root.join(PROJECT_DIR).join("config.toml");
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ProjectConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };

    let path = config_dir.join("waypoint/config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Database path: `cli` flag, then `env_override` (`WAYPOINT_DB`), then the
/// configured path relative to `project_root`.
#[must_use]
pub fn resolve_db_path(
    project_root: &Path,
    config: &ProjectConfig,
    env_override: Option<&str>,
    cli: Option<&Path>,
) -> PathBuf {
    if let Some(path) = cli {
        return path.to_path_buf();
    }
    if let Some(path) = env_override.filter(|p| !p.trim().is_empty()) {
        return PathBuf::from(path);
    }
    project_root.join(&config.storage.path)
}

/// Build the engine from the built-in catalog (when enabled) and every
/// `*.toml` file in the configured type directories, in file name order.
/// Missing directories are skipped.
pub fn build_engine(project_root: &Path, config: &TypesConfig) -> Result<Engine> {
    let mut builder = Engine::builder();
    if config.builtin {
        builder = builder
            .with_builtin()
            .context("Failed to register built-in types")?;
    }

    for dir in &config.dirs {
        let dir = project_root.join(dir);
        if !dir.is_dir() {
            continue;
        }
        builder = register_dir(builder, &dir)?;
    }
    Ok(builder.build())
}

fn register_dir(mut builder: EngineBuilder, dir: &Path) -> Result<EngineBuilder> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    files.sort();

    for path in files {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        builder = builder
            .register_toml(&text)
            .with_context(|| format!("Invalid type definition {}", path.display()))?;
        debug!(path = %path.display(), "loaded type definition");
    }
    Ok(builder)
}

/// Stable code for a failed config load or type registration, found
/// anywhere in the context chain of `err`.
#[must_use]
pub fn error_code(err: &anyhow::Error) -> Option<ErrorCode> {
    err.chain().find_map(|cause| {
        if cause.downcast_ref::<DefinitionError>().is_some() {
            Some(ErrorCode::DefinitionInvalid)
        } else if cause.downcast_ref::<toml::de::Error>().is_some() {
            Some(ErrorCode::ConfigParseError)
        } else {
            None
        }
    })
}

/// Open the configured backend and wrap it in a store.
pub fn open_store(engine: Engine, config: &ProjectConfig, db_path: &Path) -> Result<ResourceStore> {
    let backend: Arc<dyn Backend> = match config.storage.backend {
        BackendKind::Memory => Arc::new(MemoryBackend::new()),
        BackendKind::Sqlite => Arc::new(
            SqliteBackend::open(db_path)
                .with_context(|| format!("Failed to open store at {}", db_path.display()))?,
        ),
    };
    Ok(ResourceStore::new(Arc::new(engine), backend)
        .with_lock_timeout(config.store.lock_timeout()))
}

const fn default_true() -> bool {
    true
}

const fn default_lock_timeout_ms() -> u64 {
    5_000
}

fn default_db_path() -> PathBuf {
    PathBuf::from(PROJECT_DIR).join("waypoint.sqlite3")
}

fn default_type_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from(PROJECT_DIR).join("types")]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const INVOICE: &str = r#"
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
"#;

    #[test]
    fn missing_project_config_uses_defaults() {
        let root = TempDir::new().expect("temp dir");
        let cfg = load_project_config(root.path()).expect("load should succeed");
        assert_eq!(cfg, ProjectConfig::default());
        assert_eq!(cfg.store.lock_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.storage.backend, BackendKind::Sqlite);
        assert!(cfg.types.builtin);
    }

    #[test]
    fn partial_project_config_keeps_other_defaults() {
        let root = TempDir::new().expect("temp dir");
        std::fs::create_dir_all(root.path().join(PROJECT_DIR)).expect("create dir");
        std::fs::write(
            root.path().join(PROJECT_DIR).join("config.toml"),
            "[storage]\nbackend = \"memory\"\n",
        )
        .expect("write config");

        let cfg = load_project_config(root.path()).expect("load");
        assert_eq!(cfg.storage.backend, BackendKind::Memory);
        assert_eq!(cfg.storage.path, default_db_path());
        assert_eq!(cfg.store.lock_timeout_ms, 5_000);
    }

    #[test]
    fn malformed_project_config_names_the_file() {
        let root = TempDir::new().expect("temp dir");
        std::fs::create_dir_all(root.path().join(PROJECT_DIR)).expect("create dir");
        std::fs::write(root.path().join(PROJECT_DIR).join("config.toml"), "[store\n")
            .expect("write config");

        let err = load_project_config(root.path()).expect_err("bad toml");
        assert!(format!("{err:#}").contains("config.toml"));
        assert_eq!(error_code(&err), Some(ErrorCode::ConfigParseError));
    }

    #[test]
    fn db_path_precedence() {
        let root = Path::new("/srv/app");
        let cfg = ProjectConfig::default();
        assert_eq!(
            resolve_db_path(root, &cfg, None, None),
            PathBuf::from("/srv/app/.waypoint/waypoint.sqlite3")
        );
        assert_eq!(
            resolve_db_path(root, &cfg, Some("/tmp/env.db"), None),
            PathBuf::from("/tmp/env.db")
        );
        assert_eq!(
            resolve_db_path(root, &cfg, Some("/tmp/env.db"), Some(Path::new("/tmp/cli.db"))),
            PathBuf::from("/tmp/cli.db")
        );
        assert_eq!(
            resolve_db_path(root, &cfg, Some("  "), None),
            PathBuf::from("/srv/app/.waypoint/waypoint.sqlite3")
        );
    }

    #[test]
    fn engine_loads_extra_type_directories() {
        let root = TempDir::new().expect("temp dir");
        let types = root.path().join(PROJECT_DIR).join("types");
        std::fs::create_dir_all(&types).expect("create types dir");
        std::fs::write(types.join("invoice.toml"), INVOICE).expect("write type");
        std::fs::write(types.join("notes.txt"), "ignored").expect("write other");

        let engine = build_engine(root.path(), &TypesConfig::default()).expect("engine");
        assert!(engine.resource_type("invoice").is_ok());
        assert!(engine.resource_type("leave-request").is_ok());

        let only_extra = TypesConfig {
            builtin: false,
            ..TypesConfig::default()
        };
        let engine = build_engine(root.path(), &only_extra).expect("engine");
        assert_eq!(engine.types().count(), 1);
    }

    #[test]
    fn invalid_type_file_is_reported_with_its_path() {
        let root = TempDir::new().expect("temp dir");
        let types = root.path().join(PROJECT_DIR).join("types");
        std::fs::create_dir_all(&types).expect("create types dir");
        std::fs::write(types.join("broken.toml"), "name = \"broken\"\nstates = []\n")
            .expect("write type");

        let err = build_engine(root.path(), &TypesConfig::default()).expect_err("invalid");
        assert!(format!("{err:#}").contains("broken.toml"));
        assert_eq!(error_code(&err), Some(ErrorCode::DefinitionInvalid));
    }

    #[test]
    fn unrelated_failures_carry_no_config_code() {
        let err = anyhow::Error::new(std::io::Error::other("disk gone")).context("Failed to read x");
        assert_eq!(error_code(&err), None);
    }

    #[test]
    fn open_store_uses_configured_backend() {
        let root = TempDir::new().expect("temp dir");
        let engine = build_engine(root.path(), &TypesConfig::default()).expect("engine");
        let cfg = ProjectConfig::default();
        let db = resolve_db_path(root.path(), &cfg, None, None);
        let store = open_store(engine, &cfg, &db).expect("open");
        assert_eq!(store.backend_name(), "sqlite");
        assert!(db.exists());
    }
}
