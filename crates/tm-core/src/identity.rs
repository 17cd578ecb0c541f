//! Migration identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sortable identity of a migration.
///
/// Parsed from the numeric prefix of a migration file name, conventionally a
/// UTC timestamp such as `20240315120000`. Numeric order is the total order
/// over all migrations. `MigrationId(0)` sorts before every real migration and
/// is used as the "nothing applied" revert target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MigrationId(u64);

impl MigrationId {
    /// The position before the first migration.
    pub const INITIAL: MigrationId = MigrationId(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }

    pub fn is_initial(self) -> bool {
        self.0 == 0
    }

    /// Ledger column type is BIGINT; ids above `i64::MAX` are rejected at
    /// catalog load time so this conversion never truncates.
    pub fn as_i64(self) -> i64 {
        self.0 as i64
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        u64::try_from(value).ok().map(Self)
    }
}

impl fmt::Display for MigrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MigrationId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(Self)
    }
}

impl From<u64> for MigrationId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}
