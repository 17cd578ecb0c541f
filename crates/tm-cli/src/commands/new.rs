//! New command implementation

use anyhow::{Context, Result};
use chrono::Utc;
use tm_core::scaffold;

use crate::cli::{GlobalArgs, NewArgs};
use crate::context::MigrationContext;

/// Execute the new command
pub fn execute(args: &NewArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = MigrationContext::load(global)?;
    let path = scaffold::new_migration(&ctx.migrations_dir(), &args.name, Utc::now())
        .context("Failed to create migration")?;
    println!("Created {}", path.display());
    Ok(())
}
