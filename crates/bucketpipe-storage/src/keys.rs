//! Storage key composition.
//!
//! Key format: `{prefix}/{name}`, or just `{name}` when the prefix is empty.
//! Keys are never empty, never start with `/`, and every segment is a
//! non-empty name other than `.` or `..` with no control characters. Such a
//! key is stored under exactly its own text by every bucket.

use crate::traits::{StorageError, StorageResult};
use serde::Serialize;
use std::fmt;

/// Full path of one object within a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct StorageKey(String);

impl StorageKey {
    /// Join a directory prefix and a file name into a key.
    ///
    /// Separators at the join are normalized, so `("uploads/", "/a.txt")`
    /// and `("uploads", "a.txt")` produce the same key and an empty prefix
    /// yields the bare name.
    pub fn compose(prefix: &str, name: &str) -> StorageResult<Self> {
        let prefix = prefix.trim_matches('/');
        let name = name.trim_start_matches('/');

        if name.is_empty() {
            return Err(StorageError::InvalidKey(
                "Resolved file name is empty".to_string(),
            ));
        }

        let key = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", prefix, name)
        };

        Self::parse(key)
    }

    /// Validate an already-composed key.
    pub fn parse(key: impl Into<String>) -> StorageResult<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(StorageError::InvalidKey("Storage key is empty".to_string()));
        }
        let bad_segment = |segment: &str| {
            segment.is_empty()
                || segment == "."
                || segment == ".."
                || segment.chars().any(|c| c.is_control())
        };
        if key.starts_with('/') || key.split('/').any(bad_segment) {
            return Err(StorageError::InvalidKey(format!(
                "Storage key contains invalid characters: {}",
                key
            )));
        }
        Ok(StorageKey(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StorageKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_with_prefix() {
        let key = StorageKey::compose("uploads", "report.txt").unwrap();
        assert_eq!(key.as_str(), "uploads/report.txt");
    }

    #[test]
    fn test_empty_prefix_has_no_leading_separator() {
        let key = StorageKey::compose("", "report.txt").unwrap();
        assert_eq!(key.as_str(), "report.txt");
    }

    #[test]
    fn test_separators_normalized_at_join() {
        let key = StorageKey::compose("/uploads/2024/", "/report.txt").unwrap();
        assert_eq!(key.as_str(), "uploads/2024/report.txt");
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(matches!(
            StorageKey::compose("uploads", ""),
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            StorageKey::compose("uploads", "/"),
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_traversal_rejected() {
        assert!(matches!(
            StorageKey::compose("uploads", "../etc/passwd"),
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            StorageKey::compose("../outside", "a.txt"),
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            StorageKey::parse("/etc/passwd"),
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_dots_inside_names_allowed() {
        let key = StorageKey::compose("a..b", "file..txt").unwrap();
        assert_eq!(key.as_str(), "a..b/file..txt");
    }

    #[test]
    fn test_empty_and_dot_segments_rejected() {
        for key in ["a//b/c.txt", "uploads/", "uploads/./a.txt", "uploads/a\nb.txt"] {
            assert!(
                matches!(StorageKey::parse(key), Err(StorageError::InvalidKey(_))),
                "{key:?} should be rejected"
            );
        }
        assert!(matches!(
            StorageKey::compose("uploads", "nested/"),
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_punctuation_kept_verbatim() {
        let key = StorageKey::compose("uploads", "report #1 [50%] ~v2?*.txt").unwrap();
        assert_eq!(key.as_str(), "uploads/report #1 [50%] ~v2?*.txt");
    }
}
