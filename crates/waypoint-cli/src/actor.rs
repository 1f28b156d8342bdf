//! Actor identity resolution for CLI commands.
//!
//! The resolution chain: `--actor` flag > `WAYPOINT_ACTOR` env > `actor` in
//! the user config > `USER` env (TTY only). Mutating commands require an
//! actor; read-only commands work without one.

use std::env;

/// Errors from actor resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorResolutionError {
    pub message: String,
    pub code: &'static str,
}

impl std::fmt::Display for ActorResolutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ActorResolutionError {}

/// Environment reader, swapped out in tests.
trait EnvReader {
    fn get(&self, key: &str) -> Option<String>;
    fn is_tty(&self) -> bool;
}

struct RealEnv;

impl EnvReader for RealEnv {
    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok().filter(|v| !v.is_empty())
    }

    fn is_tty(&self) -> bool {
        use std::io::IsTerminal;
        std::io::stdin().is_terminal()
    }
}

fn resolve_actor_with(
    cli_flag: Option<&str>,
    configured: Option<&str>,
    env: &dyn EnvReader,
) -> Option<String> {
    if let Some(actor) = cli_flag.filter(|a| !a.is_empty()) {
        return Some(actor.to_string());
    }

    if let Some(val) = env.get("WAYPOINT_ACTOR") {
        return Some(val);
    }

    if let Some(actor) = configured.filter(|a| !a.is_empty()) {
        return Some(actor.to_string());
    }

    if env.is_tty() {
        return env.get("USER");
    }

    None
}

/// Resolve the actor, failing when none is set.
///
/// # Errors
///
/// Returns `missing_actor` when no source yields a name.
pub fn require_actor(
    cli_flag: Option<&str>,
    configured: Option<&str>,
) -> Result<String, ActorResolutionError> {
    resolve_actor_with(cli_flag, configured, &RealEnv).ok_or_else(|| ActorResolutionError {
        message: "Actor identity required for this command. \
                  Set --actor or the WAYPOINT_ACTOR environment variable."
            .to_string(),
        code: "missing_actor",
    })
}
