use crate::error::{Error, ErrorCode};
use crate::model::ResourceId;
use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Default wait before giving up on a contended resource lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-resource lock errors.
#[derive(Debug)]
pub enum LockError {
    Timeout { id: ResourceId, waited: Duration },
}

impl LockError {
    /// Machine-readable code associated with this lock error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Timeout { .. } => ErrorCode::LockContention,
        }
    }

    /// Optional remediation hint for operators and agents.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

impl std::fmt::Display for LockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout { id, waited } => write!(
                f,
                "{}: lock on {id} timed out after {waited:?}",
                self.code().code()
            ),
        }
    }
}

impl std::error::Error for LockError {}

impl From<LockError> for Error {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Timeout { id, waited } => Self::LockTimeout { id, waited },
        }
    }
}

/// Set of resource ids currently being mutated.
///
/// Holding the lock for an id serializes every mutation of that resource;
/// distinct ids never contend.
#[derive(Debug, Default)]
pub struct LockTable {
    held: Mutex<HashSet<ResourceId>>,
    released: Condvar,
}

impl LockTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn held(&self) -> MutexGuard<'_, HashSet<ResourceId>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquire the lock for `id`, waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Timeout`] if the lock is still held when the
    /// timeout expires.
    pub fn acquire(&self, id: &ResourceId, timeout: Duration) -> Result<ResourceLock<'_>, LockError> {
        let start = Instant::now();
        let mut held = self.held();
        loop {
            if held.insert(id.clone()) {
                return Ok(ResourceLock {
                    table: self,
                    id: id.clone(),
                });
            }
            let waited = start.elapsed();
            let Some(remaining) = timeout.checked_sub(waited).filter(|d| !d.is_zero()) else {
                return Err(LockError::Timeout {
                    id: id.clone(),
                    waited,
                });
            };
            held = self
                .released
                .wait_timeout(held, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Whether some caller currently holds the lock for `id`.
    #[must_use]
    pub fn is_held(&self, id: &ResourceId) -> bool {
        self.held().contains(id)
    }

    fn release(&self, id: &ResourceId) {
        self.held().remove(id);
        self.released.notify_all();
    }
}

/// RAII guard for one resource's lock. Released on drop.
#[derive(Debug)]
pub struct ResourceLock<'a> {
    table: &'a LockTable,
    id: ResourceId,
}

impl ResourceLock<'_> {
    #[must_use]
    pub fn id(&self) -> &ResourceId {
        &self.id
    }
}

impl Drop for ResourceLock<'_> {
    fn drop(&mut self) {
        self.table.release(&self.id);
    }
}
