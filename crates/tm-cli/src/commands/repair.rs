//! Repair command implementation

use anyhow::Result;
use tm_core::MigrationId;

use crate::cli::{GlobalArgs, RepairArgs};
use crate::commands::common::ExitCode;
use crate::context::MigrationContext;

/// Execute the repair command
pub fn execute(args: &RepairArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = MigrationContext::load(global)?;
    let migrator = ctx.migrator()?;
    let report = migrator.repair(args.dry_run)?;

    let (record, erase) = if report.dry_run {
        ("would record", "would erase")
    } else {
        ("recorded", "erased")
    };
    for id in &report.recorded {
        println!("  {record} {}", label(&migrator, *id));
    }
    for id in &report.erased {
        println!("  {erase} {}", label(&migrator, *id));
    }
    for id in &report.unverified {
        println!("  no probe for {}, left as is", label(&migrator, *id));
    }
    for id in &report.orphaned {
        println!("  unknown ledger entry {id}, left as is");
    }
    for (id, message) in &report.probe_failures {
        eprintln!("  probe for {} failed: {message}", label(&migrator, *id));
    }

    if report.changed() {
        println!(
            "Ledger {}: {} recorded, {} erased",
            if report.dry_run { "would change" } else { "repaired" },
            report.recorded.len(),
            report.erased.len()
        );
    } else {
        println!("Ledger matches the schema");
    }

    if !report.probe_failures.is_empty() {
        return Err(ExitCode(1).into());
    }
    Ok(())
}

fn label(migrator: &tm_engine::Migrator, id: MigrationId) -> String {
    migrator
        .catalog()
        .get(id)
        .map(|m| m.label())
        .unwrap_or_else(|| id.to_string())
}
