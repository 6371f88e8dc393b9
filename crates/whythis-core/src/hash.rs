//! Content hashing
//!
//! Files are identified across moves by a SHA-256 digest of their bytes,
//! stored as `sha256:<hex>`. Hashing is best effort: any I/O failure yields
//! [`ContentHash::Unknown`] instead of an error.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::models::ContentHash;

const ALGORITHM: &str = "sha256";
const CHUNK_SIZE: usize = 4096;

/// Hash the full contents of `path`
pub fn hash_file(path: &Path) -> ContentHash {
    match try_hash_file(path) {
        Ok(digest) => ContentHash::Known(digest),
        Err(e) => {
            warn!("Hash unavailable for {:?}: {}", path, e);
            ContentHash::Unknown
        }
    }
}

fn try_hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; CHUNK_SIZE];

    loop {
        let n = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }

    Ok(format!("{}:{}", ALGORITHM, hex::encode(hasher.finalize())))
}

/// Hash an in-memory buffer the same way a file would be hashed
pub fn hash_bytes(bytes: &[u8]) -> ContentHash {
    ContentHash::Known(format!("{}:{}", ALGORITHM, hex::encode(Sha256::digest(bytes))))
}
