//! Record store persistence
//!
//! Handles saving and loading the full record map to/from a single JSON file.
//! Uses atomic writes (write to temp file, then rename) so readers never see
//! a partially written store, and takes the advisory lock around every write.
//!
//! Storage location: `~/.whythis/` (configurable via `Config`)
//!
//! Files:
//! - `db.json` - mapping from canonical path to record
//! - `.lock` - present only while a write is in flight

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{WhyError, WhyResult};
use crate::models::RecordMap;
use crate::storage::lock::StoreLock;

/// Lock-guarded persistence for the record map
#[derive(Debug, Clone)]
pub struct RecordStore {
    config: Config,
}

impl RecordStore {
    /// Open the store, creating the data directory and an empty store file if needed
    pub fn open(config: Config) -> WhyResult<Self> {
        let store = Self { config };
        store.ensure_initialized()?;
        Ok(store)
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Check if the store file exists on disk
    pub fn exists(&self) -> bool {
        self.config.db_path().exists()
    }

    fn ensure_initialized(&self) -> WhyResult<()> {
        let dir = &self.config.data_dir;
        fs::create_dir_all(dir).map_err(|source| WhyError::Write {
            path: dir.clone(),
            source,
        })?;

        if !self.exists() {
            info!("Initializing empty store at {:?}", self.config.db_path());
            self.write(&RecordMap::new())?;
        }
        Ok(())
    }

    /// Read the full record map
    ///
    /// A missing store file reads as an empty map. Reads do not take the lock.
    pub fn read(&self) -> WhyResult<RecordMap> {
        let path = self.config.db_path();

        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(RecordMap::new()),
            Err(source) => return Err(WhyError::Read { path, source }),
        };

        if content.trim().is_empty() {
            warn!("Store {:?} is empty, treating as no records", path);
            return Ok(RecordMap::new());
        }

        let records: RecordMap =
            serde_json::from_str(&content).map_err(|e| WhyError::CorruptStore {
                path: path.clone(),
                details: e.to_string(),
            })?;

        debug!("Read {} records from {:?}", records.len(), path);
        Ok(records)
    }

    /// Replace the full record map on disk
    ///
    /// Holds the advisory lock for the duration of the write; the lock is
    /// released whether or not the write succeeds.
    pub fn write(&self, records: &RecordMap) -> WhyResult<()> {
        let path = self.config.db_path();
        let data = serde_json::to_vec_pretty(records).map_err(|e| WhyError::Write {
            path: path.clone(),
            source: io::Error::new(io::ErrorKind::InvalidData, e),
        })?;

        let _lock = StoreLock::acquire(
            &self.config.lock_path(),
            self.config.lock_timeout(),
            self.config.lock_poll_interval(),
        )?;

        atomic_write(&path, &data)?;
        info!("Wrote {} records to {:?}", records.len(), path);
        Ok(())
    }
}

/// Write data to a file atomically
///
/// 1. Write to a temporary file in the same directory
/// 2. Sync the file to disk
/// 3. Rename the temp file to the target path
///
/// This ensures the target file is never left in a partially-written state.
fn atomic_write(path: &Path, data: &[u8]) -> WhyResult<()> {
    let temp_path = temp_path_for(path);

    let result = write_and_sync(&temp_path, data).and_then(|()| {
        fs::rename(&temp_path, path).map_err(|source| WhyError::AtomicWriteFailed {
            from: temp_path.clone(),
            to: path.to_path_buf(),
            source,
        })
    });

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn write_and_sync(temp_path: &Path, data: &[u8]) -> WhyResult<()> {
    let write_err = |source| WhyError::Write {
        path: temp_path.to_path_buf(),
        source,
    };

    let mut file = File::create(temp_path).map_err(write_err)?;
    file.write_all(data).map_err(write_err)?;
    file.sync_all().map_err(write_err)?;
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentHash, Record};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    fn test_config(temp_dir: &TempDir) -> Config {
        let mut config = Config::with_data_dir(temp_dir.path().join("store"));
        config.lock_timeout_ms = 2_000;
        config.lock_poll_interval_ms = 2;
        config
    }

    fn record(why: &str) -> Record {
        Record::new(why, "tester", ContentHash::from("sha256:01"), "/tmp", vec![])
    }

    #[test]
    fn test_open_initializes_empty_store() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir);

        let store = RecordStore::open(config.clone()).unwrap();
        assert!(store.exists());
        assert_eq!(fs::read_to_string(config.db_path()).unwrap(), "{}");
        assert!(store.read().unwrap().is_empty());
        assert!(!config.lock_path().exists());
    }

    #[test]
    fn test_read_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = RecordStore::open(test_config(&temp_dir)).unwrap();
        fs::remove_file(store.config().db_path()).unwrap();

        assert!(store.read().unwrap().is_empty());
    }

    #[test]
    fn test_write_and_read_preserves_order() {
        let temp_dir = TempDir::new().unwrap();
        let store = RecordStore::open(test_config(&temp_dir)).unwrap();

        let mut records = RecordMap::new();
        records.insert("/z".to_string(), record("last alphabetically"));
        records.insert("/a".to_string(), record("first alphabetically"));
        store.write(&records).unwrap();

        let loaded = store.read().unwrap();
        let keys: Vec<_> = loaded.keys().cloned().collect();
        assert_eq!(keys, vec!["/z", "/a"]);
        assert_eq!(loaded["/a"].why, "first alphabetically");
    }

    #[test]
    fn test_corrupt_store_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let store = RecordStore::open(test_config(&temp_dir)).unwrap();
        fs::write(store.config().db_path(), "{ not json").unwrap();

        let err = store.read().unwrap_err();
        assert!(matches!(err, WhyError::CorruptStore { .. }));
    }

    #[test]
    fn test_write_times_out_on_held_lock() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = test_config(&temp_dir);
        config.lock_timeout_ms = 30;
        let store = RecordStore::open(config.clone()).unwrap();

        fs::write(config.lock_path(), "1").unwrap();
        let mut records = RecordMap::new();
        records.insert("/a".to_string(), record("blocked"));

        let err = store.write(&records).unwrap_err();
        assert!(err.is_retryable());
        // Store unchanged
        assert!(store.read().unwrap().is_empty());
    }

    #[test]
    fn test_atomic_write_leaves_no_temp_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("db.json");

        atomic_write(&path, b"{}").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "{}");
        assert!(!temp_path_for(&path).exists());
        assert!(temp_path_for(&path).ends_with("db.json.tmp"));
    }

    #[test]
    fn test_concurrent_writers_never_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(RecordStore::open(test_config(&temp_dir)).unwrap());

        let writers: Vec<_> = (0..4)
            .map(|w| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..10 {
                        let mut records = RecordMap::new();
                        for n in 0..=(w * 10 + i) {
                            records.insert(format!("/w{w}/{n}"), record("payload"));
                        }
                        store.write(&records).unwrap();
                    }
                })
            })
            .collect();

        let reader_store = Arc::clone(&store);
        let reader = thread::spawn(move || {
            for _ in 0..50 {
                reader_store.read().unwrap();
                thread::sleep(Duration::from_millis(1));
            }
        });

        for w in writers {
            w.join().unwrap();
        }
        reader.join().unwrap();

        let final_records = store.read().unwrap();
        assert!(!final_records.is_empty());
        assert!(!store.config().lock_path().exists());
    }
}
