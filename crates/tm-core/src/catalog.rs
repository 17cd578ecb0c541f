//! Migration catalog.
//!
//! The catalog is the append-only, ordered set of every migration the
//! application knows about. It is built explicitly, either from a list of
//! records or from a directory of `<id>_<name>.yml` files, and handed to the
//! planner. There is no global registry.

use crate::error::{CoreError, CoreResult};
use crate::identity::MigrationId;
use crate::migration::{Migration, MigrationFile};
use crate::migration_name::MigrationName;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

fn file_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<id>[0-9]+)_(?P<name>[a-z][a-z0-9_]*)\.ya?ml$").expect("valid regex")
    })
}

/// Ordered set of known migrations keyed by identity.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    migrations: BTreeMap<MigrationId, Migration>,
}

impl Catalog {
    /// Build a catalog from records, rejecting duplicate or reserved ids.
    pub fn new(migrations: Vec<Migration>) -> CoreResult<Self> {
        let mut map: BTreeMap<MigrationId, Migration> = BTreeMap::new();
        for migration in migrations {
            check_id_range(migration.id, &migration.label())?;
            if let Some(existing) = map.get(&migration.id) {
                return Err(CoreError::DuplicateMigration {
                    id: migration.id,
                    first: existing.label(),
                    second: migration.label(),
                });
            }
            map.insert(migration.id, migration);
        }
        Ok(Self { migrations: map })
    }

    /// Load every `<id>_<name>.yml` / `.yaml` file in `dir`.
    ///
    /// Files with other extensions and dotfiles are ignored so the directory
    /// can hold READMEs or editor droppings.
    pub fn load(dir: &Path) -> CoreResult<Self> {
        if !dir.is_dir() {
            return Err(CoreError::MigrationsDirNotFound {
                path: dir.display().to_string(),
            });
        }

        let entries = std::fs::read_dir(dir).map_err(|e| CoreError::IoWithPath {
            path: dir.display().to_string(),
            source: e,
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| CoreError::IoWithPath {
                path: dir.display().to_string(),
                source: e,
            })?;
            let path = entry.path();
            if path.is_file() && is_migration_candidate(&path) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut migrations = Vec::with_capacity(paths.len());
        for path in &paths {
            migrations.push(load_file(path)?);
        }
        log::debug!(
            "Loaded {} migration(s) from {}",
            migrations.len(),
            dir.display()
        );
        Self::new(migrations)
    }

    pub fn get(&self, id: MigrationId) -> Option<&Migration> {
        self.migrations.get(&id)
    }

    pub fn contains(&self, id: MigrationId) -> bool {
        self.migrations.contains_key(&id)
    }

    /// Migrations in ascending identity order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Migration> {
        self.migrations.values()
    }

    pub fn ids(&self) -> impl DoubleEndedIterator<Item = MigrationId> + '_ {
        self.migrations.keys().copied()
    }

    pub fn latest(&self) -> Option<&Migration> {
        self.migrations.values().next_back()
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

fn is_migration_candidate(path: &Path) -> bool {
    let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if file_name.starts_with('.') {
        return false;
    }
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yml") | Some("yaml")
    )
}

fn load_file(path: &Path) -> CoreResult<Migration> {
    let display = path.display().to_string();
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    let Some(caps) = file_name_pattern().captures(file_name) else {
        return Err(CoreError::InvalidMigrationFile {
            path: display,
            reason: "file name must look like <digits>_<snake_case_name>.yml".to_string(),
        });
    };

    let id: MigrationId =
        caps["id"]
            .parse()
            .map_err(|e| CoreError::InvalidMigrationFile {
                path: display.clone(),
                reason: format!("identity is not a valid number: {e}"),
            })?;
    check_id_range(id, &display)?;
    let name = MigrationName::parse(&caps["name"])?;

    let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
        path: display.clone(),
        source: e,
    })?;
    let file: MigrationFile =
        serde_yaml::from_str(&content).map_err(|e| CoreError::InvalidMigrationFile {
            path: display.clone(),
            reason: e.to_string(),
        })?;

    file.into_migration(id, name)
        .map_err(|reason| CoreError::InvalidMigrationFile {
            path: display,
            reason,
        })
}

fn check_id_range(id: MigrationId, label: &str) -> CoreResult<()> {
    if id.is_initial() || id.value() > i64::MAX as u64 {
        return Err(CoreError::InvalidMigrationFile {
            path: label.to_string(),
            reason: format!("identity {id} must be between 1 and {}", i64::MAX),
        });
    }
    Ok(())
}

#[cfg(test)]
#[path = "catalog_test.rs"]
mod tests;
