//! Status command implementation

use anyhow::{Context, Result};
use tm_engine::StatusReport;

use crate::cli::{GlobalArgs, StatusArgs, StatusOutput};
use crate::commands::common::print_table;
use crate::context::MigrationContext;

/// Execute the status command
pub fn execute(args: &StatusArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = MigrationContext::load(global)?;
    let migrator = ctx.migrator()?;
    let report = migrator.status()?;

    match args.output {
        StatusOutput::Table => print_status_table(&report),
        StatusOutput::Json => {
            let json =
                serde_json::to_string_pretty(&report).context("Failed to serialize status")?;
            println!("{json}");
        }
    }
    Ok(())
}

fn print_status_table(report: &StatusReport) {
    let mut rows: Vec<Vec<String>> = report
        .migrations
        .iter()
        .map(|m| {
            vec![
                if m.is_applied() { "applied" } else { "pending" }.to_string(),
                m.id.to_string(),
                m.name.clone(),
                m.applied_at
                    .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_default(),
                if m.irreversible { "irreversible" } else { "" }.to_string(),
            ]
        })
        .collect();
    rows.extend(report.orphaned.iter().map(|id| {
        vec![
            "unknown".to_string(),
            id.to_string(),
            String::new(),
            String::new(),
            String::new(),
        ]
    }));

    if rows.is_empty() {
        println!("No migrations found");
    } else {
        print_table(&["STATUS", "ID", "NAME", "APPLIED AT", "NOTE"], &rows);
    }

    let pending = report.pending().count();
    println!();
    println!(
        "{} applied, {} pending",
        report.migrations.len() - pending,
        pending
    );
    if let Some(lock) = &report.lock {
        println!(
            "Locked by {} since {}",
            lock.holder,
            lock.acquired_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
}
