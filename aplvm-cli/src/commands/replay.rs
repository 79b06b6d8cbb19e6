use aplvm_core::replay::{replay, ReplayDiff};
use aplvm_core::vm::PolicyStore;

use crate::args::ReplayArgs;
use crate::exit_codes::{COMPILE_FAILURE, SUCCESS};

use super::load_registry;

pub fn run(args: ReplayArgs) -> anyhow::Result<i32> {
    let registry = load_registry(&args.tools)?;
    std::fs::create_dir_all(&args.sandbox)?;
    let mut policy = PolicyStore::load_or_create(args.sandbox.join("policy.json"))?;

    let run_id = uuid::Uuid::new_v4().to_string();
    let report = replay(&args.package_path, &args.sandbox, &registry, &mut policy, args.purge_out, run_id)?;

    if report.is_clean() {
        println!("replay {} clean, no diffs", report.run_id);
        return Ok(SUCCESS);
    }

    for diff in &report.diffs {
        match diff {
            ReplayDiff::MissingNow(path) => println!("MISSING  {}", path.display()),
            ReplayDiff::HashMismatch { path, expected, actual } => {
                println!("MISMATCH {} expected={expected} actual={actual}", path.display());
            }
        }
    }
    Ok(COMPILE_FAILURE)
}
