use anyhow::{bail, Context};

use aplvm_core::model::BytecodeEnvelope;
use aplvm_core::pack::pack;
use aplvm_core::vm::{app_id_for, ChecksumManifest, PolicyStore, CHECKSUMS_FILE};

use crate::args::PackArgs;
use crate::exit_codes::SUCCESS;

use super::{decode_plan, load_plan_json};

pub fn run(args: PackArgs) -> anyhow::Result<i32> {
    let plan_json = load_plan_json(&args.plan_path)?;
    let plan = decode_plan(&plan_json)?;

    let raw = std::fs::read_to_string(&args.bytecode_path)
        .with_context(|| format!("reading bytecode at {}", args.bytecode_path.display()))?;
    let bytecode: BytecodeEnvelope = serde_json::from_str(&raw)?;

    let program_value = serde_json::to_value(&bytecode.program)?;
    let app_id = app_id_for(&program_value)?;

    let policy_store = PolicyStore::load_or_create(args.sandbox.join("policy.json"))?;
    let Some(policy) = policy_store.grant(&app_id).cloned() else {
        bail!("no capability grant on record for app_id {app_id}; run the program against this sandbox first");
    };

    let checksums_path = args.sandbox.join("out").join(CHECKSUMS_FILE);
    let checksums_raw = std::fs::read_to_string(&checksums_path).with_context(|| {
        format!("reading checksum manifest at {}; run the program against this sandbox first", checksums_path.display())
    })?;
    let checksums: ChecksumManifest = serde_json::from_str(&checksums_raw).context("parsing checksum manifest")?;

    let created_at = chrono::Utc::now().to_rfc3339();
    let manifest = pack(&plan, &bytecode, &policy, &app_id, created_at, &checksums, &args.out)?;

    println!("packed {} entries -> {}", manifest.entries.len(), args.out.display());
    Ok(SUCCESS)
}
