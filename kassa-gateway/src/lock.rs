//! Per-order advisory file lock
//!
//! Serializes order mutations across concurrent requests (duplicate
//! webhooks, a browser return racing its webhook). Each order maps to
//! `<dir>/order-<id>.lock`; holding an exclusive lock on that file is
//! holding the order. Dropping the guard removes the file and unlocks it,
//! on tokio's blocking pool when a runtime is running.

use crate::error::{GatewayError, GatewayResult};
use crate::host::OrderId;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// Lock directory for all orders
#[derive(Debug, Clone)]
pub struct OrderLocks {
    dir: PathBuf,
}

impl OrderLocks {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, order_id: OrderId) -> PathBuf {
        self.dir.join(format!("order-{}.lock", order_id))
    }

    /// Wait for the order's lock.
    ///
    /// Blocking happens on tokio's blocking pool, so the runtime keeps
    /// serving other requests meanwhile.
    pub async fn acquire(&self, order_id: OrderId) -> GatewayResult<OrderLock> {
        let dir = self.dir.clone();
        let path = self.path_for(order_id);
        tokio::task::spawn_blocking(move || OrderLock::acquire_blocking(&dir, path))
            .await
            .map_err(|e| GatewayError::Lock(format!("lock task failed: {}", e)))?
    }
}

/// Held lock on one order
#[derive(Debug)]
pub struct OrderLock {
    file: Option<File>,
    path: PathBuf,
}

impl OrderLock {
    fn acquire_blocking(dir: &Path, path: PathBuf) -> GatewayResult<Self> {
        fs::create_dir_all(dir)?;
        loop {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)?;
            file.lock()?;

            // The previous holder unlinks the file before unlocking; a lock
            // on an unlinked file protects nothing, so start over.
            if refers_to(&file, &path) {
                kassa_log::trace!("Locked {}", path.display());
                return Ok(Self {
                    file: Some(file),
                    path,
                });
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for OrderLock {
    fn drop(&mut self) {
        let Some(file) = self.file.take() else {
            return;
        };
        let path = std::mem::take(&mut self.path);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn_blocking(move || release(file, &path));
            }
            Err(_) => release(file, &path),
        }
    }
}

/// Unlink before unlocking: a waiter that wakes on the old file sees it is
/// gone and reopens.
fn release(file: File, path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        kassa_log::warn!("Could not remove lock file {}: {}", path.display(), e);
    }
    if let Err(e) = file.unlock() {
        kassa_log::warn!("Could not unlock {}: {}", path.display(), e);
    }
}

#[cfg(unix)]
fn refers_to(file: &File, path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    match (file.metadata(), fs::metadata(path)) {
        (Ok(held), Ok(current)) => held.dev() == current.dev() && held.ino() == current.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn refers_to(_file: &File, path: &Path) -> bool {
    path.exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    async fn wait_until_removed(path: &Path) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while path.exists() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_guard_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let locks = OrderLocks::new(dir.path());

        let lock = locks.acquire(7).await.unwrap();
        assert!(lock.path().exists());
        let path = lock.path().to_path_buf();
        drop(lock);
        wait_until_removed(&path).await;
    }

    #[test]
    fn test_guard_outside_runtime_releases_inline() {
        let dir = tempfile::tempdir().unwrap();
        let locks = OrderLocks::new(dir.path());
        let path = locks.path_for(3);

        let lock = OrderLock::acquire_blocking(dir.path(), path.clone()).unwrap();
        assert!(path.exists());
        drop(lock);
        assert!(!path.exists());

        let again = OrderLock::acquire_blocking(dir.path(), path.clone()).unwrap();
        assert_eq!(again.path(), path.as_path());
    }

    #[tokio::test]
    async fn test_lock_is_released_on_early_return() {
        let dir = tempfile::tempdir().unwrap();
        let locks = OrderLocks::new(dir.path());

        async fn fails(locks: &OrderLocks) -> GatewayResult<()> {
            let _lock = locks.acquire(9).await?;
            Err(GatewayError::Validation("boom".into()))
        }

        assert!(fails(&locks).await.is_err());
        // would block forever if the guard leaked
        let again = tokio::time::timeout(Duration::from_secs(5), locks.acquire(9)).await;
        assert!(again.unwrap().is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_holders_are_serialized() {
        let dir = tempfile::tempdir().unwrap();
        let locks = OrderLocks::new(dir.path());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let inside = inside.clone();
            let max_seen = max_seen.clone();
            tasks.push(tokio::spawn(async move {
                let _lock = locks.acquire(1).await.unwrap();
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_orders_do_not_contend() {
        let dir = tempfile::tempdir().unwrap();
        let locks = OrderLocks::new(dir.path());
        let first = locks.acquire(1).await.unwrap();
        let second = tokio::time::timeout(Duration::from_secs(5), locks.acquire(2)).await;
        assert!(second.unwrap().is_ok());
        drop(first);
    }
}
