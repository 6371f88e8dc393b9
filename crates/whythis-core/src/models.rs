//! Data models for whythis
//!
//! Defines the persisted `Record`, the content-hash value stored with it,
//! and the verification status derived when a record is looked up.
//!
//! The on-disk field names (`why`, `created_at`, `updated_at`, `author`,
//! `hash`, `cwd`, `tags`) are shared with stores written by earlier versions
//! of the tool and must not change.

use std::fmt;

use chrono::{Local, NaiveDateTime, Timelike};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Text stored in place of a digest when the file could not be read
pub const UNKNOWN_HASH: &str = "unknown";

/// Author used when neither an explicit author nor the environment gives one
pub const UNKNOWN_AUTHOR: &str = "unknown";

/// Full record set, keyed by canonical absolute path.
///
/// Iteration order is insertion order, which is also the order used to
/// break ties during hash-based fallback lookup.
pub type RecordMap = IndexMap<String, Record>;

/// Content address of a file at the time a record was written
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum ContentHash {
    /// `<algorithm>:<hex-digest>`
    Known(String),
    /// The file could not be read when the hash was taken
    #[default]
    Unknown,
}

impl ContentHash {
    pub fn is_unknown(&self) -> bool {
        matches!(self, ContentHash::Unknown)
    }

    pub fn as_str(&self) -> &str {
        match self {
            ContentHash::Known(s) => s,
            ContentHash::Unknown => UNKNOWN_HASH,
        }
    }

    /// Identity comparison used for move detection.
    ///
    /// `Unknown` never matches anything, not even another `Unknown`.
    pub fn matches(&self, other: &ContentHash) -> bool {
        match (self, other) {
            (ContentHash::Known(a), ContentHash::Known(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for ContentHash {
    fn from(s: String) -> Self {
        if s == UNKNOWN_HASH || s.is_empty() {
            ContentHash::Unknown
        } else {
            ContentHash::Known(s)
        }
    }
}

impl From<&str> for ContentHash {
    fn from(s: &str) -> Self {
        ContentHash::from(s.to_string())
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Option::<String>::deserialize(deserializer)?;
        Ok(value.map(ContentHash::from).unwrap_or_default())
    }
}

/// One explanation attached to one file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    /// Why the file exists
    pub why: String,
    /// When this record was created
    #[serde(with = "timestamp")]
    pub created_at: NaiveDateTime,
    /// Who wrote the explanation
    #[serde(default = "unknown_author")]
    pub author: String,
    /// Content hash taken when the record was written
    #[serde(default)]
    pub hash: ContentHash,
    /// Working directory at creation time
    #[serde(default)]
    pub cwd: String,
    /// Free-form tags, in the order given
    #[serde(default)]
    pub tags: Vec<String>,
    /// When this record was last edited
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "timestamp::option"
    )]
    pub updated_at: Option<NaiveDateTime>,
}

impl Record {
    /// Create a record stamped with the current local time
    pub fn new(
        why: impl Into<String>,
        author: impl Into<String>,
        hash: ContentHash,
        cwd: impl Into<String>,
        tags: Vec<String>,
    ) -> Self {
        Self {
            why: why.into(),
            created_at: now(),
            author: author.into(),
            hash,
            cwd: cwd.into(),
            tags,
            updated_at: None,
        }
    }

    /// Replace the explanation
    pub fn set_why(&mut self, why: impl Into<String>) {
        self.why = why.into();
    }

    /// Replace all tags. Duplicates are kept as given.
    pub fn set_tags(&mut self, tags: Vec<String>) {
        self.tags = tags;
    }

    /// Stamp `updated_at` with the current time
    pub fn touch(&mut self) {
        self.updated_at = Some(now());
    }

    /// True if any of `filter` is one of this record's tags
    pub fn has_any_tag(&self, filter: &[String]) -> bool {
        filter.iter().any(|tag| self.tags.contains(tag))
    }

    /// Case-insensitive substring match over explanation, stored path and tags.
    ///
    /// `needle` must already be lowercase.
    pub fn matches_query(&self, key: &str, needle: &str) -> bool {
        self.why.to_lowercase().contains(needle)
            || key.to_lowercase().contains(needle)
            || self
                .tags
                .iter()
                .any(|tag| tag.to_lowercase().contains(needle))
    }
}

fn unknown_author() -> String {
    UNKNOWN_AUTHOR.to_string()
}

/// Whether a file still has the content its record was written against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verification {
    /// Current content hashes to the stored value
    Verified,
    /// Current content differs from the stored hash
    Modified,
    /// No usable hash on one side or the other
    Unverifiable,
    /// The file is not on disk
    Missing,
}

impl Verification {
    /// Compare a stored hash against the current one, if the file exists
    pub fn check(stored: &ContentHash, current: Option<&ContentHash>) -> Self {
        match current {
            None => Verification::Missing,
            Some(current) if stored.matches(current) => Verification::Verified,
            Some(ContentHash::Unknown) => Verification::Unverifiable,
            Some(_) if stored.is_unknown() => Verification::Unverifiable,
            Some(_) => Verification::Modified,
        }
    }
}

/// Current local time, truncated to microseconds
pub fn now() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(now.nanosecond() / 1_000 * 1_000)
        .unwrap_or(now)
}

/// ISO-8601 local timestamps without offset, e.g. `2024-03-01T09:15:42.123456`.
///
/// Strings with an RFC 3339 offset are accepted on read and converted to
/// their local wall-clock time.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime};
    use serde::{de, Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

    pub fn format(value: &NaiveDateTime) -> String {
        value.format(FORMAT).to_string()
    }

    pub fn parse(s: &str) -> Option<NaiveDateTime> {
        s.parse::<NaiveDateTime>()
            .ok()
            .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|d| d.naive_local()))
    }

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse(&s).ok_or_else(|| de::Error::custom(format!("invalid timestamp: {s}")))
    }

    pub mod option {
        use chrono::NaiveDateTime;
        use serde::{de, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<NaiveDateTime>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => serializer.serialize_str(&super::format(v)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<NaiveDateTime>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                Some(s) => super::parse(&s)
                    .map(Some)
                    .ok_or_else(|| de::Error::custom(format!("invalid timestamp: {s}"))),
                None => Ok(None),
            }
        }
    }
}
