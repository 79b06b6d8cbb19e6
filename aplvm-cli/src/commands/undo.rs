use aplvm_core::undo::undo_last_run;

use crate::args::UndoArgs;
use crate::exit_codes::{RUNTIME_FAILURE, SUCCESS};

pub fn run(args: UndoArgs) -> anyhow::Result<i32> {
    let Some(report) = undo_last_run(&args.sandbox, args.dry_run)? else {
        println!("no prior run recorded under {}; nothing to undo", args.sandbox.display());
        return Ok(RUNTIME_FAILURE);
    };

    if args.dry_run {
        println!("would undo run {}:", report.run_id);
        for path in &report.targets {
            println!("  {}", path.display());
        }
        return Ok(SUCCESS);
    }

    println!("undid run {}: {} deleted, {} failed", report.run_id, report.deleted.len(), report.failed.len());
    for (path, reason) in &report.failed {
        println!("  FAILED {} ({reason})", path.display());
    }

    if report.failed.is_empty() {
        Ok(SUCCESS)
    } else {
        Ok(RUNTIME_FAILURE)
    }
}
