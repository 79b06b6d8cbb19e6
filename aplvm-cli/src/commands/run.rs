use anyhow::Context;

use aplvm_core::model::BytecodeEnvelope;
use aplvm_core::vm::{app_id_for, PolicyStore, QuotaLimits, Vm};

use crate::args::RunArgs;
use crate::exit_codes::SUCCESS;

pub fn run(args: RunArgs) -> anyhow::Result<i32> {
    let raw = std::fs::read_to_string(&args.bytecode_path)
        .with_context(|| format!("reading bytecode at {}", args.bytecode_path.display()))?;
    let bytecode: BytecodeEnvelope = serde_json::from_str(&raw).with_context(|| format!("parsing bytecode at {}", args.bytecode_path.display()))?;

    if args.dry_run {
        for instr in &bytecode.program {
            println!("{} {:?}", instr.opcode(), instr);
        }
        return Ok(SUCCESS);
    }

    let registry = super::load_registry(&args.tools)?;
    let program_value = serde_json::to_value(&bytecode.program)?;
    let app_id = app_id_for(&program_value)?;

    std::fs::create_dir_all(&args.sandbox).with_context(|| format!("creating sandbox root {}", args.sandbox.display()))?;
    let mut policy = PolicyStore::load_or_create(args.sandbox.join("policy.json"))?;

    let run_id = uuid::Uuid::new_v4().to_string();
    let mut vm = Vm::new(&registry, args.sandbox.clone(), QuotaLimits::default());
    let outcome = vm.run(&bytecode, &mut policy, &app_id, args.yes, run_id)?;

    println!("run {} completed, {} slots written", outcome.run_id, outcome.slots.len());
    Ok(SUCCESS)
}
