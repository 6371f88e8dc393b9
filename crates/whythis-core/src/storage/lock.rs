//! Advisory store lock
//!
//! A marker file next to the store signals that a write is in flight.
//! Acquisition creates the marker exclusively (`create_new`), polling at a
//! fixed interval while another process holds it, and fails with
//! [`WhyError::LockTimeout`] once the timeout elapses.
//!
//! The marker is removed when the [`StoreLock`] guard is dropped, so every
//! exit path from the guarded region releases it, including early returns
//! and panics.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{WhyError, WhyResult};

/// Held lock marker; released on drop
#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
}

impl StoreLock {
    /// Create the marker at `path`, waiting up to `timeout` for a holder to finish
    pub fn acquire(path: &Path, timeout: Duration, poll_interval: Duration) -> WhyResult<Self> {
        let start = Instant::now();
        let mut attempts = 0u32;

        loop {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut file) => {
                    // The pid is informational only; a failed write still holds the lock
                    let _ = write!(file, "{}", std::process::id());
                    debug!("Acquired lock {:?} after {} retries", path, attempts);
                    return Ok(Self {
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    let waited = start.elapsed();
                    if waited >= timeout {
                        return Err(WhyError::LockTimeout {
                            path: path.to_path_buf(),
                            waited,
                            holder: read_holder(path),
                        });
                    }
                    attempts += 1;
                    thread::sleep(poll_interval.min(timeout - waited));
                }
                Err(e) => {
                    return Err(WhyError::Write {
                        path: path.to_path_buf(),
                        source: e,
                    })
                }
            }
        }
    }

    /// Path of the marker file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!("Released lock {:?}", self.path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to release lock {:?}: {}", self.path, e),
        }
    }
}

fn read_holder(path: &Path) -> Option<String> {
    fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use tempfile::TempDir;

    const POLL: Duration = Duration::from_millis(5);

    #[test]
    fn test_acquire_creates_and_drop_removes_marker() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(".lock");

        {
            let lock = StoreLock::acquire(&path, Duration::from_secs(1), POLL).unwrap();
            assert!(lock.path().exists());
            let pid = fs::read_to_string(&path).unwrap();
            assert_eq!(pid, std::process::id().to_string());
        }

        assert!(!path.exists());
    }

    #[test]
    fn test_times_out_when_held() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(".lock");
        fs::write(&path, "99999").unwrap();

        let err = StoreLock::acquire(&path, Duration::from_millis(50), POLL).unwrap_err();
        match err {
            WhyError::LockTimeout { waited, holder, .. } => {
                assert!(waited >= Duration::from_millis(50));
                assert_eq!(holder.as_deref(), Some("99999"));
            }
            other => panic!("expected LockTimeout, got {other:?}"),
        }

        // A foreign marker is never removed by a failed acquirer
        assert!(path.exists());
    }

    #[test]
    fn test_waits_for_release() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(".lock");

        let held = StoreLock::acquire(&path, Duration::from_secs(1), POLL).unwrap();
        let (tx, rx) = mpsc::channel();
        let waiter_path = path.clone();
        let waiter = thread::spawn(move || {
            tx.send(()).unwrap();
            StoreLock::acquire(&waiter_path, Duration::from_secs(5), POLL).map(|_| ())
        });

        rx.recv().unwrap();
        thread::sleep(Duration::from_millis(30));
        drop(held);

        waiter.join().unwrap().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_released_on_panic() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(".lock");
        let panic_path = path.clone();

        let result = thread::spawn(move || {
            let _lock = StoreLock::acquire(&panic_path, Duration::from_secs(1), POLL).unwrap();
            panic!("writer crashed");
        })
        .join();

        assert!(result.is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_missing_directory_is_write_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("absent").join(".lock");

        let err = StoreLock::acquire(&path, Duration::from_millis(10), POLL).unwrap_err();
        assert!(matches!(err, WhyError::Write { .. }));
    }
}
