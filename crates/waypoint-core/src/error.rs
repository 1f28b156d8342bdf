use crate::machine::{FieldViolation, RejectReason};
use crate::model::{ResourceId, StateId};
use crate::storage::StorageError;
use std::fmt;
use std::time::Duration;

/// Machine-readable error codes for agent-friendly decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    DefinitionInvalid,
    NotFound,
    InvalidFields,
    VersionConflict,
    IllegalTransition,
    UnknownCollection,
    UnknownType,
    CorruptHistory,
    StorageUnavailable,
    LockContention,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1002",
            Self::DefinitionInvalid => "E1003",
            Self::NotFound => "E2001",
            Self::InvalidFields => "E2002",
            Self::VersionConflict => "E2003",
            Self::IllegalTransition => "E2004",
            Self::UnknownCollection => "E2005",
            Self::UnknownType => "E2006",
            Self::CorruptHistory => "E3001",
            Self::StorageUnavailable => "E5001",
            Self::LockContention => "E5002",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::DefinitionInvalid => "Invalid resource type definition",
            Self::NotFound => "Resource not found",
            Self::InvalidFields => "Invalid fields",
            Self::VersionConflict => "Version conflict",
            Self::IllegalTransition => "Illegal transition",
            Self::UnknownCollection => "Unknown collection",
            Self::UnknownType => "Unknown resource type",
            Self::CorruptHistory => "Corrupt history",
            Self::StorageUnavailable => "Storage unavailable",
            Self::LockContention => "Lock contention",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in .waypoint/config.toml and retry."),
            Self::DefinitionInvalid => {
                Some("Fix the type definition; every state must be declared and reachable.")
            }
            Self::NotFound | Self::UnknownCollection => None,
            Self::InvalidFields => Some("Check field names and values against `wp types`."),
            Self::VersionConflict => Some("Re-fetch the resource and retry against its current version."),
            Self::IllegalTransition => {
                Some("Use one of the actions advertised by `wp show` for the current state.")
            }
            Self::UnknownType => Some("Run `wp types` to list registered resource types."),
            Self::CorruptHistory => Some("Restore the store from a backup; history is append-only."),
            Self::StorageUnavailable => Some("Check that the database path exists and is writable."),
            Self::LockContention => Some("Retry after the concurrent writer finishes."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors returned by store and engine operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("resource '{id}' not found")]
    NotFound { id: ResourceId },

    #[error("unknown resource type '{name}'")]
    UnknownType { name: String },

    #[error("invalid fields: {}", join_violations(.violations))]
    InvalidFields { violations: Vec<FieldViolation> },

    #[error("version conflict on '{id}': expected {expected}, found {actual}")]
    VersionConflict {
        id: ResourceId,
        expected: u64,
        actual: u64,
    },

    #[error("illegal transition on '{id}' from '{from}': {reason}")]
    IllegalTransition {
        id: ResourceId,
        from: StateId,
        reason: RejectReason,
    },

    #[error("type '{type_name}' declares no collection '{collection}'")]
    UnknownCollection {
        type_name: String,
        collection: String,
    },

    #[error("timed out after {waited:?} waiting for the lock on '{id}'")]
    LockTimeout { id: ResourceId, waited: Duration },

    #[error("history of '{id}' is corrupt: {detail}")]
    CorruptHistory { id: ResourceId, detail: String },

    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[source] StorageError),
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::UnknownType { .. } => ErrorCode::UnknownType,
            Self::InvalidFields { .. } => ErrorCode::InvalidFields,
            Self::VersionConflict { .. } => ErrorCode::VersionConflict,
            Self::IllegalTransition { .. } => ErrorCode::IllegalTransition,
            Self::UnknownCollection { .. } => ErrorCode::UnknownCollection,
            Self::LockTimeout { .. } => ErrorCode::LockContention,
            Self::CorruptHistory { .. } => ErrorCode::CorruptHistory,
            Self::StorageUnavailable(_) => ErrorCode::StorageUnavailable,
        }
    }

    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }

    pub(crate) fn invalid(violations: Vec<FieldViolation>) -> Self {
        Self::InvalidFields { violations }
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict {
                id,
                expected,
                actual,
            } => Self::VersionConflict {
                id,
                expected,
                actual,
            },
            other => Self::StorageUnavailable(other),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
