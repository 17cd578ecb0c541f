//! Unlock command implementation

use anyhow::Result;

use crate::cli::GlobalArgs;
use crate::context::MigrationContext;

/// Execute the unlock command
pub fn execute(global: &GlobalArgs) -> Result<()> {
    let ctx = MigrationContext::load(global)?;
    let migrator = ctx.migrator_without_catalog()?;

    match migrator.unlock()? {
        Some(previous) => println!(
            "Released lock held by {} since {}",
            previous.holder,
            previous.acquired_at.format("%Y-%m-%d %H:%M:%S")
        ),
        None => println!("No lock held"),
    }
    Ok(())
}
