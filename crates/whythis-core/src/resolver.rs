//! Record resolution
//!
//! Finds the record for a path: first by exact canonical-path key, then, if
//! the file exists but is not a key, by scanning for a record whose stored
//! content hash equals the file's current hash (the file was moved or
//! renamed).
//!
//! A file that is not on disk has no usable key for [`find`]; only
//! [`find_exact`] (used by removal) matches it by its old path.
//!
//! When several records share the hash, the first in store order wins.
//! Records with an unknown hash never match, and neither does a file whose
//! current hash is unknown.

use std::cell::OnceCell;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::hash::hash_file;
use crate::models::{ContentHash, RecordMap};
use crate::paths::{path_key, resolve_path_in};

/// A user-supplied path, resolved against the filesystem
#[derive(Debug)]
pub struct Target {
    input: PathBuf,
    canonical: Option<PathBuf>,
    exists: bool,
    hash: OnceCell<ContentHash>,
}

impl Target {
    /// Resolve `input` relative to `cwd`.
    ///
    /// A path that cannot be canonicalized is kept as a target with no key;
    /// it is treated as a file that does not exist.
    pub fn probe(input: &Path, cwd: &Path) -> Self {
        let canonical = match resolve_path_in(input, cwd) {
            Ok(p) => Some(p),
            Err(e) => {
                debug!("{}; treating as missing", e);
                None
            }
        };
        let exists = canonical.as_deref().is_some_and(Path::exists);

        Self {
            input: input.to_path_buf(),
            canonical,
            exists,
            hash: OnceCell::new(),
        }
    }

    /// The path as given by the caller
    pub fn input(&self) -> &Path {
        &self.input
    }

    /// Canonical path, if resolution succeeded
    pub fn canonical(&self) -> Option<&Path> {
        self.canonical.as_deref()
    }

    /// Store key for the canonical path
    pub fn key(&self) -> Option<String> {
        self.canonical.as_deref().map(path_key)
    }

    /// True if the file is currently on disk
    pub fn exists(&self) -> bool {
        self.exists
    }

    /// Current content hash, computed once; `None` if the file is missing
    pub fn current_hash(&self) -> Option<&ContentHash> {
        if !self.exists {
            return None;
        }
        let path = self.canonical.as_deref()?;
        Some(self.hash.get_or_init(|| hash_file(path)))
    }
}

/// Where a target's record was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    /// Key the record is stored under
    pub key: String,
    /// True if found by content hash rather than by path
    pub moved: bool,
}

/// Record stored under the target's key, whether or not the file still exists
pub fn find_exact(records: &RecordMap, target: &Target) -> Option<Match> {
    let key = target.key()?;
    if !records.contains_key(&key) {
        return None;
    }
    debug!("Exact match for {}", key);
    Some(Match { key, moved: false })
}

/// Locate the record for a file on disk in `records`
pub fn find(records: &RecordMap, target: &Target) -> Option<Match> {
    if !target.exists() {
        debug!("{:?} is not on disk; no record", target.input());
        return None;
    }
    if let Some(found) = find_exact(records, target) {
        return Some(found);
    }

    let current = target.current_hash()?;
    if current.is_unknown() {
        debug!("No usable hash for {:?}; skipping fallback", target.input());
        return None;
    }

    let found = records
        .iter()
        .find(|(_, record)| record.hash.matches(current))
        .map(|(key, _)| Match {
            key: key.clone(),
            moved: true,
        });

    if let Some(ref m) = found {
        debug!("Hash match for {:?}: stored under {}", target.input(), m.key);
    }
    found
}
