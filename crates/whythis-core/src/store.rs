//! Record operations
//!
//! The `Store` is the entry point for callers: it combines path resolution,
//! content hashing and the lock-guarded record file into the add / lookup /
//! edit / remove / list / search operations.
//!
//! ## Usage
//!
//! ```ignore
//! let store = Store::open()?;
//!
//! store.add(Path::new("report.csv"), "generated nightly by job X", None, vec!["nightly".into()])?;
//!
//! if let Some(found) = store.lookup(Path::new("archive/report.csv"))? {
//!     println!("{} (moved from {:?})", found.record.why, found.moved_from);
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;
use tracing::info;

use crate::config::Config;
use crate::error::{WhyError, WhyResult};
use crate::hash::hash_file;
use crate::models::{ContentHash, Record, Verification, UNKNOWN_AUTHOR};
use crate::resolver::{self, Target};
use crate::storage::RecordStore;

/// A stored record together with its key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry {
    pub key: String,
    pub record: Record,
}

impl Entry {
    /// Compare the file currently at `key` against the stored hash
    pub fn verification(&self) -> Verification {
        let path = Path::new(&self.key);
        let current = path.exists().then(|| hash_file(path));
        Verification::check(&self.record.hash, current.as_ref())
    }
}

/// Result of a lookup
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolved {
    /// Key the record is stored under
    pub key: String,
    pub record: Record,
    /// Set when the record was found by content hash; the old key
    pub moved_from: Option<String>,
    /// Whether the looked-up file is on disk
    pub exists: bool,
    pub verification: Verification,
}

/// One row of `list`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Listing {
    pub key: String,
    pub record: Record,
    /// Whether a file is currently at `key`
    pub exists: bool,
}

/// Record operations over one store
pub struct Store {
    records: RecordStore,
    working_dir: Option<PathBuf>,
}

impl Store {
    /// Open the store using configuration from the default location
    pub fn open() -> anyhow::Result<Self> {
        let config = Config::load().context("Failed to load configuration")?;
        Self::open_with_config(config).context("Failed to open store")
    }

    /// Open the store with a specific configuration
    ///
    /// Creates the data directory and an empty store on first use.
    pub fn open_with_config(config: Config) -> WhyResult<Self> {
        Ok(Self {
            records: RecordStore::open(config)?,
            working_dir: None,
        })
    }

    /// Resolve relative paths against `dir` instead of the process working directory
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        self.records.config()
    }

    fn cwd(&self) -> WhyResult<PathBuf> {
        match &self.working_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(std::env::current_dir()?),
        }
    }

    fn probe(&self, path: &Path) -> WhyResult<Target> {
        Ok(Target::probe(path, &self.cwd()?))
    }

    /// Attach an explanation to an existing file.
    ///
    /// Replaces any record already stored for the file's canonical path;
    /// nothing from the old record is kept.
    pub fn add(
        &self,
        path: &Path,
        why: &str,
        author: Option<&str>,
        tags: Vec<String>,
    ) -> WhyResult<Entry> {
        let cwd = self.cwd()?;
        let target = Target::probe(path, &cwd);
        let key = match target.key() {
            Some(key) if target.exists() => key,
            _ => {
                return Err(WhyError::FileNotFound {
                    path: path.to_path_buf(),
                })
            }
        };

        let hash = target
            .current_hash()
            .cloned()
            .unwrap_or(ContentHash::Unknown);
        let author = match author.filter(|a| !a.is_empty()) {
            Some(a) => a.to_string(),
            None => default_author(),
        };
        let record = Record::new(why, author, hash, cwd.to_string_lossy(), tags);

        let mut records = self.records.read()?;
        records.insert(key.clone(), record.clone());
        self.records.write(&records)?;

        info!("Added explanation for {}", key);
        Ok(Entry { key, record })
    }

    /// Find the explanation for a file, following moves by content hash.
    ///
    /// Returns `Ok(None)` when nothing matches, including when the file is
    /// no longer on disk.
    pub fn lookup(&self, path: &Path) -> WhyResult<Option<Resolved>> {
        let target = self.probe(path)?;
        let records = self.records.read()?;

        let Some(found) = resolver::find(&records, &target) else {
            return Ok(None);
        };
        let record = records[&found.key].clone();
        let verification = Verification::check(&record.hash, target.current_hash());

        Ok(Some(Resolved {
            moved_from: found.moved.then(|| found.key.clone()),
            key: found.key,
            record,
            exists: target.exists(),
            verification,
        }))
    }

    /// Update the record of a file on disk.
    ///
    /// A non-empty `why` replaces the explanation; `tags` replaces the tag list
    /// wholesale. `updated_at` is always stamped. A record found by content
    /// hash is updated under its original key.
    pub fn edit(&self, path: &Path, why: Option<&str>, tags: Option<Vec<String>>) -> WhyResult<Entry> {
        let target = self.probe(path)?;
        let mut records = self.records.read()?;

        let found = resolver::find(&records, &target).ok_or_else(|| WhyError::NotFound {
            path: path.to_path_buf(),
        })?;

        let record = records
            .get_mut(&found.key)
            .ok_or_else(|| WhyError::NotFound {
                path: path.to_path_buf(),
            })?;
        if let Some(why) = why.filter(|w| !w.is_empty()) {
            record.set_why(why);
        }
        if let Some(tags) = tags {
            record.set_tags(tags);
        }
        record.touch();
        let record = record.clone();

        self.records.write(&records)?;

        info!("Updated explanation for {}", found.key);
        Ok(Entry {
            key: found.key,
            record,
        })
    }

    /// Delete the record for a file, by path or by content hash.
    ///
    /// Unlike lookup, a record stored under the path is removed even after
    /// the file itself has been deleted.
    pub fn remove(&self, path: &Path) -> WhyResult<Entry> {
        let target = self.probe(path)?;
        let mut records = self.records.read()?;

        let found = resolver::find_exact(&records, &target)
            .or_else(|| resolver::find(&records, &target))
            .ok_or_else(|| WhyError::NotFound {
            path: path.to_path_buf(),
        })?;
        let record = records
            .shift_remove(&found.key)
            .ok_or_else(|| WhyError::NotFound {
                path: path.to_path_buf(),
            })?;

        self.records.write(&records)?;

        info!("Removed explanation for {}", found.key);
        Ok(Entry {
            key: found.key,
            record,
        })
    }

    /// All records in store order, optionally limited to those sharing a tag with `filter`.
    ///
    /// An empty filter selects everything.
    pub fn list(&self, filter: Option<&[String]>) -> WhyResult<Vec<Listing>> {
        let records = self.records.read()?;
        let filter = filter.filter(|f| !f.is_empty());

        Ok(records
            .into_iter()
            .filter(|(_, record)| filter.map_or(true, |f| record.has_any_tag(f)))
            .map(|(key, record)| Listing {
                exists: Path::new(&key).exists(),
                key,
                record,
            })
            .collect())
    }

    /// Case-insensitive substring search over explanations, paths and tags
    pub fn search(&self, query: &str) -> WhyResult<Vec<Entry>> {
        let needle = query.to_lowercase();
        let records = self.records.read()?;

        Ok(records
            .into_iter()
            .filter(|(key, record)| record.matches_query(key, &needle))
            .map(|(key, record)| Entry { key, record })
            .collect())
    }

    /// Every tag in use with the number of records carrying it, sorted by name
    pub fn tags(&self) -> WhyResult<Vec<(String, usize)>> {
        let records = self.records.read()?;
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for record in records.values() {
            for tag in &record.tags {
                *counts.entry(tag.clone()).or_default() += 1;
            }
        }
        Ok(counts.into_iter().collect())
    }

    /// Number of stored records
    pub fn count(&self) -> WhyResult<usize> {
        Ok(self.records.read()?.len())
    }
}

/// Author used when none is given: `$USER`, then `$USERNAME`, then "unknown"
pub fn default_author() -> String {
    author_from(|name| std::env::var(name).ok())
}

fn author_from(lookup: impl Fn(&str) -> Option<String>) -> String {
    ["USER", "USERNAME"]
        .into_iter()
        .filter_map(lookup)
        .find(|value| !value.is_empty())
        .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string())
}
