//! Down command implementation

use anyhow::Result;
use tm_engine::{RunObserver, RunOptions};

use crate::cli::{DownArgs, GlobalArgs};
use crate::commands::common::{finish_run, print_plan, ProgressObserver};
use crate::context::MigrationContext;

/// Execute the down command
pub fn execute(args: &DownArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = MigrationContext::load(global)?;
    let migrator = ctx.migrator()?;

    if args.dry_run {
        print_plan(&migrator.plan_down(args.target())?);
        return Ok(());
    }

    let progress = ProgressObserver::new();
    let options = RunOptions {
        allow_data_loss: args.allow_data_loss,
        observer: (!global.verbose).then_some(&progress as &dyn RunObserver),
    };
    let report = migrator.down(args.target(), options);
    progress.finish();

    finish_run(&report?)
}
