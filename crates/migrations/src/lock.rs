//! Named exclusive lock guarding migration runs

use std::collections::HashMap;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::{MigrationError, MigrationResult};

/// Identity of a lock holder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockOwner {
    pub token: Uuid,
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
}

impl LockOwner {
    pub fn new() -> Self {
        Self {
            token: Uuid::new_v4(),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        }
    }
}

impl Default for LockOwner {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LockOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pid {} since {} (token {})",
            self.pid,
            self.acquired_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.token
        )
    }
}

/// Storage for named locks. Implementations must make `try_acquire` atomic
/// with respect to every other user of the same backing resource.
pub trait LockBackend: Send + Sync + fmt::Debug {
    /// Take the lock if it is free; `false` when someone else holds it
    fn try_acquire(&self, name: &str, owner: &LockOwner) -> MigrationResult<bool>;

    /// Release the lock if `owner` holds it. Releasing a lock that is not held
    /// succeeds.
    fn release(&self, name: &str, owner: &LockOwner) -> MigrationResult<()>;

    /// Description of the current holder, if any
    fn holder(&self, name: &str) -> Option<String>;
}

/// Locks as `<dir>/<name>.lock` files, created exclusively so they hold
/// across processes sharing the directory
#[derive(Debug, Clone)]
pub struct FileLockBackend {
    dir: PathBuf,
}

impl FileLockBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn lock_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.lock", name))
    }

    fn read_owner(path: &Path) -> Option<LockOwner> {
        let content = fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }
}

impl LockBackend for FileLockBackend {
    fn try_acquire(&self, name: &str, owner: &LockOwner) -> MigrationResult<bool> {
        fs::create_dir_all(&self.dir)?;
        let path = self.lock_path(name);

        let mut file = match OpenOptions::new().create_new(true).write(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        let written = serde_json::to_vec(owner)
            .map_err(MigrationError::from)
            .and_then(|bytes| {
                file.write_all(&bytes)?;
                file.sync_all()?;
                Ok(())
            });
        if let Err(e) = written {
            let _ = fs::remove_file(&path);
            return Err(e);
        }
        Ok(true)
    }

    fn release(&self, name: &str, owner: &LockOwner) -> MigrationResult<()> {
        let path = self.lock_path(name);
        if !path.exists() {
            return Ok(());
        }

        match Self::read_owner(&path) {
            Some(current) if current.token == owner.token => match fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            },
            Some(current) => {
                tracing::warn!(lock = name, holder = %current, "lock is held by another owner, leaving it");
                Ok(())
            }
            None => {
                tracing::warn!(lock = name, path = %path.display(), "unreadable lock file, leaving it");
                Ok(())
            }
        }
    }

    fn holder(&self, name: &str) -> Option<String> {
        let path = self.lock_path(name);
        if !path.exists() {
            return None;
        }
        Some(match Self::read_owner(&path) {
            Some(owner) => owner.to_string(),
            None => format!("unknown owner of {}", path.display()),
        })
    }
}

/// Process-local locks
#[derive(Debug, Default)]
pub struct MemoryLockBackend {
    held: Mutex<HashMap<String, LockOwner>>,
}

impl MemoryLockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn held(&self) -> std::sync::MutexGuard<'_, HashMap<String, LockOwner>> {
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl LockBackend for MemoryLockBackend {
    fn try_acquire(&self, name: &str, owner: &LockOwner) -> MigrationResult<bool> {
        let mut held = self.held();
        if held.contains_key(name) {
            return Ok(false);
        }
        held.insert(name.to_string(), owner.clone());
        Ok(true)
    }

    fn release(&self, name: &str, owner: &LockOwner) -> MigrationResult<()> {
        let mut held = self.held();
        if held.get(name).map_or(false, |current| current.token == owner.token) {
            held.remove(name);
        }
        Ok(())
    }

    fn holder(&self, name: &str) -> Option<String> {
        self.held().get(name).map(ToString::to_string)
    }
}

/// Acquires named locks from a backend, waiting up to a timeout
#[derive(Debug, Clone)]
pub struct LockManager {
    backend: Arc<dyn LockBackend>,
    poll_interval: Duration,
}

impl LockManager {
    pub fn new(backend: Arc<dyn LockBackend>) -> Self {
        Self {
            backend,
            poll_interval: Duration::from_millis(100),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn backend(&self) -> &Arc<dyn LockBackend> {
        &self.backend
    }

    /// Wait up to `timeout` for the lock. Never retries past the deadline.
    pub async fn acquire(&self, name: &str, timeout: Duration) -> MigrationResult<LockHandle> {
        let owner = LockOwner::new();
        let started = Instant::now();
        let deadline = started + timeout;

        loop {
            if self.backend.try_acquire(name, &owner)? {
                tracing::debug!(lock = name, owner = %owner, "lock acquired");
                return Ok(LockHandle {
                    name: name.to_string(),
                    owner,
                    backend: self.backend.clone(),
                    released: AtomicBool::new(false),
                });
            }

            let now = Instant::now();
            if now >= deadline {
                let holder = self.backend.holder(name);
                tracing::warn!(
                    lock = name,
                    holder = holder.as_deref().unwrap_or("unknown"),
                    waited_ms = started.elapsed().as_millis() as u64,
                    "timed out waiting for lock"
                );
                return Err(MigrationError::ResourceLocked {
                    resource: name.to_string(),
                    waited: started.elapsed(),
                    holder,
                });
            }

            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}

/// A held lock, released once on `release()` or drop
#[derive(Debug)]
pub struct LockHandle {
    name: String,
    owner: LockOwner,
    backend: Arc<dyn LockBackend>,
    released: AtomicBool,
}

impl LockHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> &LockOwner {
        &self.owner
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Release now. Later calls, and the drop, do nothing.
    pub fn release(&self) -> MigrationResult<()> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.backend.release(&self.name, &self.owner)?;
        tracing::debug!(lock = %self.name, "lock released");
        Ok(())
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::error!(lock = %self.name, error = %e, "failed to release lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager(backend: Arc<dyn LockBackend>) -> LockManager {
        LockManager::new(backend).with_poll_interval(Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_second_acquire_times_out_with_holder() {
        let locks = manager(Arc::new(MemoryLockBackend::new()));
        let handle = locks.acquire("migrations", Duration::from_millis(50)).await.unwrap();

        let err = locks
            .acquire("migrations", Duration::from_millis(30))
            .await
            .unwrap_err();
        match err {
            MigrationError::ResourceLocked { resource, waited, holder } => {
                assert_eq!(resource, "migrations");
                assert!(waited >= Duration::from_millis(30));
                assert!(holder.unwrap().contains(&handle.owner().token.to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_drop_releases_lock() {
        let locks = manager(Arc::new(MemoryLockBackend::new()));
        {
            let _handle = locks.acquire("migrations", Duration::from_millis(50)).await.unwrap();
        }
        let handle = locks.acquire("migrations", Duration::from_millis(50)).await.unwrap();
        handle.release().unwrap();
        handle.release().unwrap();
        assert!(handle.is_released());
        assert!(locks.backend().holder("migrations").is_none());
    }

    #[tokio::test]
    async fn test_waiter_gets_lock_once_released() {
        let locks = manager(Arc::new(MemoryLockBackend::new()));
        let handle = locks.acquire("migrations", Duration::from_millis(50)).await.unwrap();

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire("migrations", Duration::from_secs(2)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(handle);

        assert!(waiter.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_file_lock_excludes_other_backends_on_same_dir() {
        let dir = TempDir::new().unwrap();
        let first = manager(Arc::new(FileLockBackend::new(dir.path())));
        let second = manager(Arc::new(FileLockBackend::new(dir.path())));

        let handle = first.acquire("schemata", Duration::from_millis(50)).await.unwrap();
        assert!(dir.path().join("schemata.lock").exists());

        let err = second.acquire("schemata", Duration::from_millis(20)).await.unwrap_err();
        assert!(err.is_resource_locked());

        drop(handle);
        assert!(!dir.path().join("schemata.lock").exists());
        assert!(second.acquire("schemata", Duration::from_millis(20)).await.is_ok());
    }

    #[test]
    fn test_file_release_leaves_foreign_lock() {
        let dir = TempDir::new().unwrap();
        let backend = FileLockBackend::new(dir.path());
        let holder = LockOwner::new();
        assert!(backend.try_acquire("schemata", &holder).unwrap());

        backend.release("schemata", &LockOwner::new()).unwrap();
        assert!(backend.holder("schemata").is_some());

        backend.release("schemata", &holder).unwrap();
        assert!(backend.holder("schemata").is_none());
    }
}
