use aplvm_core::validate::{generate_schema, validate};

use crate::args::ValidateArgs;
use crate::exit_codes::SUCCESS;

use super::{load_plan_json, load_registry};

pub fn run(args: ValidateArgs) -> anyhow::Result<i32> {
    let registry = load_registry(&args.tools)?;
    let plan_json = load_plan_json(&args.plan_path)?;

    let schema = generate_schema(&registry);
    validate(&schema, &plan_json)?;
    println!("[OK] {} validates against the generated schema", args.plan_path.display());
    Ok(SUCCESS)
}
