//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use std::path::Path;

use chrono::NaiveDateTime;
use serde::Serialize;

use whythis_core::{Entry, Listing, Record, Resolved, Verification};

/// Longest explanation shown per row in `list`
const LIST_WHY_WIDTH: usize = 80;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
#[derive(Debug, Clone, Copy)]
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    /// Print the result of a lookup for `queried`
    pub fn print_resolved(&self, queried: &Path, found: &Resolved) {
        match self.format {
            OutputFormat::Human => {
                print_record(
                    &resolved_title(queried, found),
                    &found.record,
                    found.moved_from.as_deref(),
                    found.verification,
                );
            }
            OutputFormat::Json => print_json(found),
            OutputFormat::Quiet => println!("{}", found.record.why),
        }
    }

    /// Print search results
    pub fn print_entries(&self, entries: &[Entry], query: &str) {
        match self.format {
            OutputFormat::Human => {
                if entries.is_empty() {
                    println!("No results for: {}", query);
                    return;
                }
                for entry in entries {
                    print_record(
                        &display_name(&entry.key),
                        &entry.record,
                        None,
                        entry.verification(),
                    );
                }
            }
            OutputFormat::Json => print_json(&entries),
            OutputFormat::Quiet => {
                for entry in entries {
                    println!("{}", entry.key);
                }
            }
        }
    }

    /// Print the rows of `list`
    pub fn print_listings(&self, listings: &[Listing]) {
        match self.format {
            OutputFormat::Human => {
                if listings.is_empty() {
                    println!("No explanations found");
                    return;
                }
                for listing in listings {
                    let status = if listing.exists { "✓" } else { "✗" };
                    println!("{} {}", status, display_name(&listing.key));
                    println!("  Why: {}", truncate(&listing.record.why, LIST_WHY_WIDTH));
                    if !listing.record.tags.is_empty() {
                        println!("  Tags: {}", listing.record.tags.join(", "));
                    }
                    println!();
                }
            }
            OutputFormat::Json => print_json(&listings),
            OutputFormat::Quiet => {
                for listing in listings {
                    println!("{}", listing.key);
                }
            }
        }
    }

    /// Print a list of tags
    pub fn print_tags(&self, tags: &[(String, usize)]) {
        match self.format {
            OutputFormat::Human => {
                if tags.is_empty() {
                    println!("No tags found.");
                    return;
                }
                for (name, count) in tags {
                    println!("{} ({})", name, count);
                }
                println!("\n{} tag(s)", tags.len());
            }
            OutputFormat::Json => {
                let json_tags: Vec<_> = tags
                    .iter()
                    .map(|(name, count)| serde_json::json!({"name": name, "count": count}))
                    .collect();
                print_json(&json_tags);
            }
            OutputFormat::Quiet => {
                for (name, _) in tags {
                    println!("{}", name);
                }
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print a warning to stderr
    pub fn warning(&self, message: &str) {
        if !self.is_quiet() {
            eprintln!("⚠ {}", message);
        }
    }

    /// Print a failure to stderr
    pub fn error(&self, error: &anyhow::Error) {
        match self.format {
            OutputFormat::Json => {
                eprintln!(
                    "{}",
                    serde_json::json!({"status": "error", "message": format!("{:#}", error)})
                );
            }
            _ => eprintln!("✗ {:#}", error),
        }
    }
}

fn print_record(title: &str, record: &Record, moved_from: Option<&str>, verification: Verification) {
    println!();
    println!("📄 {}", title);
    println!("❓ Why: {}", record.why);
    println!("👤 By: {}", record.author);
    println!("🕒 Added: {}", format_time(&record.created_at));
    if let Some(updated) = record.updated_at {
        println!("✏ Updated: {}", format_time(&updated));
    }

    match moved_from {
        Some(from) => println!("📦 Moved from: {}", from),
        None if !record.cwd.is_empty() => println!("📁 Original location: {}", record.cwd),
        None => {}
    }

    match verification {
        Verification::Verified => println!("🔒 Hash verification: OK"),
        Verification::Modified => println!("⚠ File modified since explanation was added"),
        Verification::Missing => println!("⚠ File not found (may have been deleted)"),
        Verification::Unverifiable => {}
    }

    if !record.tags.is_empty() {
        println!("🏷 Tags: {}", record.tags.join(", "));
    }
    println!();
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("✗ Failed to serialize output: {}", e),
    }
}

fn format_time(time: &NaiveDateTime) -> String {
    time.format("%Y-%m-%d %H:%M").to_string()
}

/// Name shown for a lookup: the file asked about, not the key it was stored under
fn resolved_title(queried: &Path, found: &Resolved) -> String {
    match queried.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => display_name(&found.key),
    }
}

/// Last path component of a store key
fn display_name(key: &str) -> String {
    Path::new(key)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| key.to_string())
}

/// Truncate to `max_chars` characters, adding "..." if truncated
fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Human);
        assert_eq!(OutputFormat::from_flags(true, false), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Quiet);
        // Quiet takes precedence
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Quiet);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long string", 7), "this is...");
        // Counts characters, not bytes
        assert_eq!(truncate("ééééé", 3), "ééé...");
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("/tmp/archive/report.csv"), "report.csv");
        assert_eq!(display_name("/"), "/");
    }

    #[test]
    fn test_resolved_title_uses_queried_name() {
        let found = Resolved {
            key: "/data/report.csv".to_string(),
            record: Record::new("nightly", "alice", Default::default(), "/data", vec![]),
            moved_from: Some("/data/report.csv".to_string()),
            exists: true,
            verification: Verification::Verified,
        };

        assert_eq!(
            resolved_title(Path::new("archive/report-2024.csv"), &found),
            "report-2024.csv"
        );
        assert_eq!(resolved_title(Path::new("/"), &found), "report.csv");
    }

    #[test]
    fn test_format_time() {
        let time = whythis_core::models::timestamp::parse("2024-03-01T09:15:42.123456").unwrap();
        assert_eq!(format_time(&time), "2024-03-01 09:15");
    }
}
