use aplvm_core::validate::{generate_schema, validate_all};

use crate::args::{PlanArgs, PlanCommand};
use crate::exit_codes::{COMPILE_FAILURE, SUCCESS};

use super::{load_plan_json, load_registry};

pub fn run(args: PlanArgs) -> anyhow::Result<i32> {
    match args.cmd {
        PlanCommand::Lint { plan_path, tools } => {
            let registry = load_registry(&tools)?;
            let plan_json = load_plan_json(&plan_path)?;
            let schema = generate_schema(&registry);
            let violations = validate_all(&schema, &plan_json)?;

            if violations.is_empty() {
                println!("[OK] {}", plan_path.display());
                return Ok(SUCCESS);
            }

            println!("[INVALID] {}", plan_path.display());
            for (pointer, message) in &violations {
                let pointer = if pointer.is_empty() { "/" } else { pointer };
                println!("  {pointer}: {message}");
            }
            Ok(COMPILE_FAILURE)
        }
    }
}
