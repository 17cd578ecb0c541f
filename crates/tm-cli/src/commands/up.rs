//! Up command implementation

use anyhow::Result;
use tm_engine::{RunObserver, RunOptions};

use crate::cli::{GlobalArgs, UpArgs};
use crate::commands::common::{finish_run, print_plan, ProgressObserver};
use crate::context::MigrationContext;

/// Execute the up command
pub fn execute(args: &UpArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = MigrationContext::load(global)?;
    let migrator = ctx.migrator()?;

    if args.dry_run {
        print_plan(&migrator.plan_up(args.target())?);
        return Ok(());
    }

    let progress = ProgressObserver::new();
    let options = RunOptions {
        observer: (!global.verbose).then_some(&progress as &dyn RunObserver),
        ..RunOptions::default()
    };
    let report = migrator.up(args.target(), options);
    progress.finish();

    finish_run(&report?)
}
