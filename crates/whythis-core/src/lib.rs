//! whythis Core Library
//!
//! This crate provides the core functionality for whythis, a local store of
//! human-written explanations attached to files on disk.
//!
//! # Architecture
//!
//! - Records are keyed by canonical absolute path in one JSON file
//! - A SHA-256 content hash lets a record follow its file across moves
//! - Writes are atomic and serialized by an advisory lock file
//!
//! # Quick Start
//!
//! ```text
//! let store = Store::open()?;
//!
//! store.add(Path::new("report.csv"), "generated nightly", None, vec![])?;
//!
//! let found = store.lookup(Path::new("report.csv"))?;
//! ```
//!
//! # Modules
//!
//! - `store`: Record operations (main entry point)
//! - `resolver`: Exact-path and content-hash record lookup
//! - `models`: Record, content hash and verification types
//! - `storage`: Lock-guarded JSON persistence
//! - `paths`: Canonical path resolution
//! - `hash`: Streaming file hashing
//! - `config`: Application configuration
//! - `error`: Typed errors

pub mod config;
pub mod error;
pub mod hash;
pub mod models;
pub mod paths;
pub mod resolver;
pub mod storage;
pub mod store;

pub use config::Config;
pub use error::{WhyError, WhyResult};
pub use models::{ContentHash, Record, RecordMap, Verification};
pub use storage::{RecordStore, StoreLock};
pub use store::{default_author, Entry, Listing, Resolved, Store};
