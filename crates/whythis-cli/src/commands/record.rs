//! Explanation command handlers
//!
//! Thin wrappers over `Store` operations: argument shaping in, formatted
//! output out. Not-found outcomes become errors so the process exits non-zero.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};

use whythis_core::{Store, WhyError};

use crate::output::Output;

/// Attach an explanation to a file
pub fn add(
    store: &Store,
    file: PathBuf,
    explanation: String,
    author: Option<String>,
    tags: Option<String>,
    output: &Output,
) -> Result<()> {
    let tags = tags.as_deref().map(parse_tags).unwrap_or_default();

    let entry = store
        .add(&file, &explanation, author.as_deref(), tags)
        .context("Failed to add explanation")?;

    if entry.record.hash.is_unknown() {
        output.warning("File content could not be read; move detection disabled for it");
    }
    output.success(&format!("Added explanation for: {}", file_name(&file)));
    Ok(())
}

/// Show the explanation for a file
pub fn why(store: &Store, file: PathBuf, output: &Output) -> Result<()> {
    let found = store
        .lookup(&file)
        .context("Failed to look up explanation")?
        .ok_or_else(|| anyhow!(WhyError::NotFound { path: file.clone() }))?;

    output.print_resolved(&file, &found);
    Ok(())
}

/// List explained files, optionally filtered by tags
pub fn list(store: &Store, tags: Option<String>, output: &Output) -> Result<()> {
    let filter = tags.as_deref().map(parse_tags);
    let listings = store
        .list(filter.as_deref())
        .context("Failed to list explanations")?;

    output.print_listings(&listings);
    Ok(())
}

/// Search explanations, paths and tags
pub fn search(store: &Store, query: String, output: &Output) -> Result<()> {
    let entries = store.search(&query).context("Failed to search")?;
    output.print_entries(&entries, &query);
    Ok(())
}

/// Edit the explanation and/or tags of a file
pub fn edit(
    store: &Store,
    file: PathBuf,
    explanation: Option<String>,
    tags: Option<String>,
    clear_tags: bool,
    output: &Output,
) -> Result<()> {
    let tags = if clear_tags {
        Some(Vec::new())
    } else {
        tags.as_deref().map(parse_tags).filter(|t| !t.is_empty())
    };

    let entry = store
        .edit(&file, explanation.as_deref(), tags)
        .context("Failed to edit explanation")?;

    output.success(&format!(
        "Updated explanation for: {} ({})",
        file_name(&file),
        entry.key
    ));
    Ok(())
}

/// Remove the explanation for a file
pub fn remove(store: &Store, file: PathBuf, output: &Output) -> Result<()> {
    let entry = store
        .remove(&file)
        .context("Failed to remove explanation")?;

    output.success(&format!(
        "Removed explanation for: {} ({})",
        file_name(&file),
        entry.key
    ));
    Ok(())
}

/// Split a comma-separated tag string, trimming pieces and dropping empty ones.
///
/// Duplicates are kept.
pub fn parse_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

fn file_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
