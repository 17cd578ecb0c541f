//! Strongly-typed migration name wrapper.

use crate::error::{CoreError, CoreResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::sync::OnceLock;

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("valid regex"))
}

/// Snake-case label of a migration, taken from its file name.
///
/// Keeps migration names from being mixed up with table names or raw SQL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MigrationName(String);

impl MigrationName {
    /// Create a new `MigrationName`, panicking in debug builds if the name is empty.
    ///
    /// Prefer [`parse`](Self::parse) when handling untrusted input.
    pub fn new(name: impl Into<String>) -> Self {
        let s = name.into();
        debug_assert!(!s.is_empty(), "MigrationName must not be empty");
        Self(s)
    }

    /// Validate and wrap a name: lowercase letters, digits and underscores,
    /// starting with a letter.
    pub fn parse(name: &str) -> CoreResult<Self> {
        if name.is_empty() {
            return Err(CoreError::InvalidMigrationName {
                name: name.to_string(),
                reason: "name must not be empty".to_string(),
            });
        }
        if !name_pattern().is_match(name) {
            return Err(CoreError::InvalidMigrationName {
                name: name.to_string(),
                reason: "use lowercase snake_case starting with a letter".to_string(),
            });
        }
        Ok(Self(name.to_string()))
    }

    /// Return the underlying name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MigrationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for MigrationName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for MigrationName {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<&str> for MigrationName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
