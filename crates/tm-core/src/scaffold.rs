//! Migration file generator.

use crate::catalog::Catalog;
use crate::error::{CoreError, CoreResult};
use crate::identity::MigrationId;
use crate::migration_name::MigrationName;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

const TEMPLATE: &str = r#"# description: what this migration changes
forward: |
  -- schema change to apply

reverse: |
  -- statements that undo `forward` exactly
# irreversible: true    # use instead of `reverse` when it cannot be undone
# transaction: false    # run outside the DDL transaction
# probe: SELECT ...     # boolean query used by `migrate repair`
"#;

/// Identity for a migration created at `now`: the UTC timestamp, bumped past
/// `latest` when the clock has not moved beyond it.
pub fn next_identity(now: DateTime<Utc>, latest: Option<MigrationId>) -> MigrationId {
    let stamp: u64 = now
        .format("%Y%m%d%H%M%S")
        .to_string()
        .parse()
        .unwrap_or_default();
    match latest {
        Some(latest) if latest.value() >= stamp => MigrationId::new(latest.value() + 1),
        _ => MigrationId::new(stamp),
    }
}

/// Write a new `<id>_<name>.yml` template into `dir`, creating the directory
/// if needed. Returns the path of the new file.
pub fn new_migration(dir: &Path, name: &str, now: DateTime<Utc>) -> CoreResult<PathBuf> {
    let name = MigrationName::parse(name)?;

    let catalog = if dir.is_dir() {
        Catalog::load(dir)?
    } else {
        std::fs::create_dir_all(dir).map_err(|e| CoreError::IoWithPath {
            path: dir.display().to_string(),
            source: e,
        })?;
        Catalog::default()
    };

    if let Some(existing) = catalog.iter().find(|m| m.name == name) {
        return Err(CoreError::InvalidMigrationName {
            name: name.to_string(),
            reason: format!("already used by {}", existing.label()),
        });
    }

    let id = next_identity(now, catalog.latest().map(|m| m.id));
    let path = dir.join(format!("{id}_{name}.yml"));
    std::fs::write(&path, TEMPLATE).map_err(|e| CoreError::IoWithPath {
        path: path.display().to_string(),
        source: e,
    })?;
    log::debug!("Created migration {}", path.display());
    Ok(path)
}
