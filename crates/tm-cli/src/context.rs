//! Runtime context for CLI commands

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tm_core::{Catalog, Config};
use tm_db::MigrationStore;
use tm_engine::Migrator;

use crate::cli::GlobalArgs;

/// Project root plus configuration with command-line overrides applied
pub struct MigrationContext {
    pub root: PathBuf,
    pub config: Config,
}

impl MigrationContext {
    /// Load configuration for the project selected by the global arguments
    pub fn load(args: &GlobalArgs) -> Result<Self> {
        let root = PathBuf::from(&args.project_dir);

        let mut config = if let Some(config_path) = &args.config {
            Config::load(Path::new(config_path)).context("Failed to load configuration file")?
        } else {
            Config::load_from_dir(&root).context("Failed to load project configuration")?
        };

        if let Some(database) = &args.database {
            config.database.path = database.clone();
        }
        if let Some(drift) = args.drift {
            config.drift = drift.into();
        }
        config.validate().context("Invalid configuration")?;

        Ok(Self { root, config })
    }

    pub fn migrations_dir(&self) -> PathBuf {
        self.config.migrations_dir_absolute(&self.root)
    }

    /// Open the database and load the catalog
    pub fn migrator(&self) -> Result<Migrator> {
        let catalog = Catalog::load(&self.migrations_dir()).context("Failed to load migrations")?;
        let store = self.open_store()?;
        Ok(Migrator::new(store, catalog, self.config.clone()))
    }

    /// Open the database with an empty catalog, for commands that only touch
    /// the lock.
    pub fn migrator_without_catalog(&self) -> Result<Migrator> {
        let store = self.open_store()?;
        Ok(Migrator::new(store, Catalog::default(), self.config.clone()))
    }

    fn open_store(&self) -> Result<MigrationStore> {
        let db_path = self.config.database_path_absolute(&self.root);
        if db_path != ":memory:" {
            if let Some(parent) = Path::new(&db_path).parent() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory: {}", parent.display())
                })?;
            }
        }
        log::debug!("Opening database {db_path}");
        MigrationStore::open(&db_path, &self.config)
            .map_err(tm_engine::MigrateError::from)
            .context("Failed to open database")
    }
}
