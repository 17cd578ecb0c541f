//! Shared helpers for migration commands

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::cell::OnceCell;
use std::fmt;
use tm_core::{Direction, Plan, PlanStep};
use tm_engine::{MigrateError, RunObserver, RunOutcome, RunReport, StepOutcome};

/// Error type representing a non-zero process exit code.
///
/// Use `return Err(ExitCode(N).into())` instead of `std::process::exit(N)`
/// so that RAII destructors run and cleanup happens properly. The migration
/// lock in particular is released by a destructor.
#[derive(Debug)]
pub(crate) struct ExitCode(pub(crate) i32);

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Control flow only; main.rs maps it to the process status.
        write!(f, "")
    }
}

impl std::error::Error for ExitCode {}

/// Exit status for a partially completed run.
pub(crate) const EXIT_PARTIAL: i32 = 2;

/// Progress bar fed by the runner. Hidden automatically when stderr is not a
/// terminal.
pub(crate) struct ProgressObserver {
    bar: OnceCell<ProgressBar>,
}

impl ProgressObserver {
    pub(crate) fn new() -> Self {
        Self {
            bar: OnceCell::new(),
        }
    }

    pub(crate) fn finish(&self) {
        if let Some(bar) = self.bar.get() {
            bar.finish_and_clear();
        }
    }
}

impl RunObserver for ProgressObserver {
    fn on_step_start(&self, _index: usize, total: usize, step: &PlanStep) {
        let bar = self.bar.get_or_init(|| {
            let pb = ProgressBar::new(total as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            pb
        });
        bar.set_message(format!("{} {}", verb(step.direction), step.migration.label()));
    }

    fn on_step_finish(&self, _step: &PlanStep, _result: Result<&StepOutcome, &MigrateError>) {
        if let Some(bar) = self.bar.get() {
            bar.inc(1);
        }
    }
}

fn verb(direction: Direction) -> &'static str {
    match direction {
        Direction::Apply => "applying",
        Direction::Revert => "reverting",
    }
}

fn past(direction: Direction) -> &'static str {
    match direction {
        Direction::Apply => "applied",
        Direction::Revert => "reverted",
    }
}

/// Print a plan without running it.
pub(crate) fn print_plan(plan: &Plan) {
    for id in &plan.orphaned {
        println!("  ignoring unknown ledger entry {id}");
    }
    if plan.is_empty() {
        println!("Nothing to {}", plan.direction);
        return;
    }
    for step in &plan.steps {
        println!("  would {} {}", step.direction, step.migration.label());
    }
    println!("{} migration(s) to {}", plan.len(), plan.direction);
}

/// Print a run report and turn its outcome into an exit status.
///
/// No-op and success exit 0, a run that failed on its first step exits 1,
/// and a run that committed some steps before failing exits 2.
pub(crate) fn finish_run(report: &RunReport) -> Result<()> {
    for warning in &report.warnings {
        eprintln!("warning: {warning}");
    }
    for id in &report.orphaned {
        eprintln!("warning: ignored unknown ledger entry {id}");
    }
    for step in &report.completed {
        if step.changed {
            println!("  {} {}_{} ({}ms)", past(step.direction), step.id, step.name, step.duration_ms);
        }
    }

    if let Some(failure) = &report.failure {
        eprintln!("{}", failure.error);
        if !report.skipped.is_empty() {
            let skipped: Vec<String> = report.skipped.iter().map(|id| id.to_string()).collect();
            eprintln!("Not attempted: {}", skipped.join(", "));
        }
    }

    match report.outcome() {
        RunOutcome::NoOp => {
            println!("Nothing to {}", report.direction);
            Ok(())
        }
        RunOutcome::Succeeded => {
            println!(
                "{} {} migration(s)",
                capitalize(past(report.direction)),
                report.completed.len()
            );
            Ok(())
        }
        RunOutcome::Partial => {
            eprintln!(
                "{} {} migration(s) before the failure",
                capitalize(past(report.direction)),
                report.completed.len()
            );
            Err(ExitCode(EXIT_PARTIAL).into())
        }
        RunOutcome::Failed => Err(ExitCode(1).into()),
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Calculate column widths for a table given headers and rows.
fn calculate_column_widths(headers: &[&str], rows: &[Vec<String>]) -> Vec<usize> {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }
    widths
}

/// Print a left-aligned table with a dashed separator under the headers.
pub(crate) fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    let widths = calculate_column_widths(headers, rows);

    let header_parts: Vec<String> = headers
        .iter()
        .zip(&widths)
        .map(|(h, &w)| format!("{:<width$}", h, width = w))
        .collect();
    println!("{}", header_parts.join("  ").trim_end());

    let sep_parts: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    println!("{}", sep_parts.join("  "));

    for row in rows {
        let row_parts: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, &w)| format!("{:<width$}", cell, width = w))
            .collect();
        println!("{}", row_parts.join("  ").trim_end());
    }
}

#[cfg(test)]
#[path = "common_test.rs"]
mod tests;
