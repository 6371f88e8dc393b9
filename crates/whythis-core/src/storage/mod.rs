//! Storage layer
//!
//! Persists the record map as one JSON file and serializes writers with an
//! advisory marker-file lock.
//!
//! ## Concurrency
//!
//! Only `write` takes the lock. A process that reads, then writes, can
//! overwrite a change another process made in between; the lock protects
//! the file from interleaved writes, not read-modify-write sequences.

pub mod lock;
pub mod persistence;

pub use lock::StoreLock;
pub use persistence::RecordStore;
