use anyhow::Context;

use aplvm_core::lower::lower;
use aplvm_core::model::CompilationMode;
use aplvm_core::validate::{generate_schema, validate};

use crate::args::CompileArgs;
use crate::exit_codes::SUCCESS;

use super::{decode_plan, load_plan_json, load_registry};

pub fn run(args: CompileArgs) -> anyhow::Result<i32> {
    let registry = load_registry(&args.tools)?;
    let plan_json = load_plan_json(&args.plan_path)?;

    let schema = generate_schema(&registry);
    validate(&schema, &plan_json)?;

    let plan = decode_plan(&plan_json)?;
    let bytecode = lower(&plan, &registry, CompilationMode::Legacy)?;
    let rendered = serde_json::to_string_pretty(&bytecode).context("serializing compiled bytecode")?;

    match args.out {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, rendered).with_context(|| format!("writing bytecode to {}", path.display()))?;
            println!("compiled {} instructions -> {}", bytecode.program.len(), path.display());
        }
        None => println!("{rendered}"),
    }

    Ok(SUCCESS)
}
