//! Path resolution
//!
//! Turns a user-supplied path into the canonical absolute form used as the
//! store key: `~` expanded, relative paths joined to the working directory,
//! symlinks and `.`/`..` resolved.
//!
//! Paths that no longer exist are still resolvable: the deepest existing
//! ancestor is canonicalized and the missing tail appended, so a deleted
//! file keeps the same key it had while it existed.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::{WhyError, WhyResult};

/// Resolve `input` against the current working directory
pub fn resolve_path(input: &Path) -> WhyResult<PathBuf> {
    let cwd = std::env::current_dir().map_err(|source| WhyError::PathResolution {
        path: input.to_path_buf(),
        source,
    })?;
    resolve_path_in(input, &cwd)
}

/// Resolve `input` against an explicit working directory
pub fn resolve_path_in(input: &Path, cwd: &Path) -> WhyResult<PathBuf> {
    let expanded = expand_home(input);
    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        cwd.join(expanded)
    };

    canonicalize_lenient(&absolute).map_err(|source| WhyError::PathResolution {
        path: input.to_path_buf(),
        source,
    })
}

/// The string form of a resolved path, as stored in the record map
pub fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Expand a leading `~` to the current user's home directory.
///
/// Only the bare `~` form is expanded; `~name/...` is left as a relative path
/// named `~name`, since looking up other users' homes needs the system user
/// database.
fn expand_home(input: &Path) -> PathBuf {
    match input.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => input.to_path_buf(),
        },
        Err(_) => input.to_path_buf(),
    }
}

fn canonicalize_lenient(path: &Path) -> io::Result<PathBuf> {
    let first_err = match fs::canonicalize(path) {
        Ok(p) => return Ok(p),
        Err(e) if e.kind() == io::ErrorKind::NotFound => e,
        Err(e) => return Err(e),
    };

    let components: Vec<Component> = path.components().collect();
    for split in (1..components.len()).rev() {
        let prefix: PathBuf = components[..split].iter().collect();
        match fs::canonicalize(&prefix) {
            Ok(mut base) => {
                for component in &components[split..] {
                    match component {
                        Component::Normal(name) => base.push(name),
                        Component::ParentDir => {
                            base.pop();
                        }
                        _ => {}
                    }
                }
                return Ok(base);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        }
    }

    Err(first_err)
}
