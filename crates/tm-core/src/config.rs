//! Configuration types and parsing for tidemark.yml

use crate::error::{CoreError, CoreResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

/// Default configuration file name, looked up in the project directory
pub const CONFIG_FILE_NAME: &str = "tidemark.yml";

/// Main project configuration from tidemark.yml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Database connection configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Directory holding `<id>_<name>.yml` migration files
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: String,

    /// Where the version ledger lives
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Transaction capabilities of the backing store
    #[serde(default)]
    pub store: StoreConfig,

    /// How to treat ledger entries the catalog does not know
    #[serde(default)]
    pub drift: DriftMode,

    /// Apply pending migrations older than the newest applied one
    #[serde(default)]
    pub allow_out_of_order: bool,

    /// What to do when a reverse action destroys data
    #[serde(default)]
    pub data_loss: DataLossPolicy,

    /// Advisory lock settings
    #[serde(default)]
    pub lock: LockConfig,

    /// Abort a single migration's action after this many seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Database file path (or ":memory:" for in-memory)
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Ledger table location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerConfig {
    /// Schema holding the ledger, kept apart from application tables
    #[serde(default = "default_ledger_schema")]
    pub schema: String,

    /// Ledger table name
    #[serde(default = "default_ledger_table")]
    pub table: String,

    /// Create the ledger schema and table when missing
    #[serde(default = "default_true")]
    pub auto_create: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            schema: default_ledger_schema(),
            table: default_ledger_table(),
            auto_create: true,
        }
    }
}

impl LedgerConfig {
    /// Fully qualified ledger table name
    pub fn qualified_table(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }

    /// Fully qualified advisory lock table name
    pub fn qualified_lock_table(&self) -> String {
        format!("{}.{}_lock", self.schema, self.table)
    }
}

/// Store transaction capabilities
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Schema changes and the ledger write can commit atomically
    #[serde(default = "default_true")]
    pub transactional_ddl: bool,

    /// Accept sequential, non-atomic execution on a non-transactional store
    #[serde(default)]
    pub allow_best_effort: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            transactional_ddl: true,
            allow_best_effort: false,
        }
    }
}

/// Advisory lock configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LockConfig {
    /// Locks older than this are treated as left behind by a crashed runner
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: default_stale_after_secs(),
        }
    }
}

impl LockConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

/// Handling of ledger entries missing from the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DriftMode {
    /// Refuse to plan (default)
    #[default]
    Strict,
    /// Warn and ignore the unknown entries
    Permissive,
}

/// Handling of reverse actions that destroy data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DataLossPolicy {
    /// Log and report, then proceed (default)
    #[default]
    Warn,
    /// Refuse unless explicitly allowed by the caller
    Deny,
}

fn default_migrations_dir() -> String {
    "db/migrate".to_string()
}

fn default_db_path() -> String {
    "db/tidemark.duckdb".to_string()
}

fn default_ledger_schema() -> String {
    "tidemark".to_string()
}

fn default_ledger_table() -> String {
    "schema_migrations".to_string()
}

fn default_stale_after_secs() -> u64 {
    600
}

fn default_true() -> bool {
    true
}

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            migrations_dir: default_migrations_dir(),
            ledger: LedgerConfig::default(),
            store: StoreConfig::default(),
            drift: DriftMode::default(),
            allow_out_of_order: false,
            data_loss: DataLossPolicy::default(),
            lock: LockConfig::default(),
            timeout_secs: None,
        }
    }
}

impl Config {
    /// Load configuration from a file path
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a project directory.
    ///
    /// Looks for tidemark.yml or tidemark.yaml and falls back to defaults when
    /// neither exists.
    pub fn load_from_dir(dir: &Path) -> CoreResult<Self> {
        let yml_path = dir.join(CONFIG_FILE_NAME);
        let yaml_path = dir.join("tidemark.yaml");

        if yml_path.exists() {
            Self::load(&yml_path)
        } else if yaml_path.exists() {
            Self::load(&yaml_path)
        } else {
            log::debug!(
                "No {} in {}, using defaults",
                CONFIG_FILE_NAME,
                dir.display()
            );
            Ok(Self::default())
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> CoreResult<()> {
        for (field, value) in [
            ("ledger.schema", &self.ledger.schema),
            ("ledger.table", &self.ledger.table),
        ] {
            if !identifier_pattern().is_match(value) {
                return Err(CoreError::ConfigInvalid {
                    message: format!("{field} '{value}' is not a valid SQL identifier"),
                });
            }
        }

        if self.database.path.trim().is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "database.path cannot be empty".to_string(),
            });
        }

        if self.timeout_secs == Some(0) {
            return Err(CoreError::ConfigInvalid {
                message: "timeout_secs must be greater than zero; omit it to disable".to_string(),
            });
        }

        Ok(())
    }

    /// Migrations directory resolved against the project root
    pub fn migrations_dir_absolute(&self, root: &Path) -> PathBuf {
        root.join(&self.migrations_dir)
    }

    /// Database path resolved against the project root, `:memory:` untouched
    pub fn database_path_absolute(&self, root: &Path) -> String {
        if self.database.path == ":memory:" || Path::new(&self.database.path).is_absolute() {
            self.database.path.clone()
        } else {
            root.join(&self.database.path).display().to_string()
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
