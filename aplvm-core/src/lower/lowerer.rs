//! The Lowerer: plan → bytecode, one linear pass over `steps` in source
//! order, followed by the `verify` block.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::errors::AplError;
use crate::model::{
    variable_parts, BytecodeEnvelope, CompilationMode, Instruction, Metadata, Operand, OperandMap, OutputMap, Plan,
    Slot, Step,
};
use crate::registry::RegistryView;

use super::guard::parse_guard;
use super::symtab::Symtab;

/// Plan-level legacy operation names, distinct from both the wire opcode
/// tags (`READ_CSV`, ...) and the tool-registry names (`read_csv`, ...).
const LEGACY_OPS: &[&str] = &[
    "load_csv",
    "profile_schema",
    "split_deterministic",
    "train_linear",
    "eval_metrics",
    "emit_report",
    "build_cli",
    "bundle_zip",
];

/// Legacy op name → the tool name the equivalent `CALL_TOOL` would name.
fn legacy_op_to_tool(op: &str) -> &'static str {
    match op {
        "load_csv" => "read_csv",
        "profile_schema" => "profile",
        "split_deterministic" => "split",
        "train_linear" => "train_lr",
        "eval_metrics" => "eval",
        "emit_report" => "emit_report",
        "build_cli" => "build_cli",
        "bundle_zip" => "zip",
        other => other,
    }
}

fn resolve_input(raw: &Value, plan_inputs: &BTreeMap<String, String>, symtab: &mut Symtab) -> Operand {
    if let Value::String(s) = raw {
        if let Some((root, _field)) = variable_parts(s) {
            if let Some(path) = plan_inputs.get(root) {
                return Operand::Literal(Value::String(path.clone()));
            }
            return Operand::Slot(symtab.slot_of(root));
        }
    }
    Operand::Literal(raw.clone())
}

fn output_slot(raw: &str, symtab: &mut Symtab) -> Result<Slot, AplError> {
    let (root, field) = variable_parts(raw)
        .ok_or_else(|| AplError::lower_error(format!("output reference must start with '$': {raw:?}")))?;
    if field.is_some() {
        return Err(AplError::lower_error(format!("output reference may not contain a field path: {raw:?}")));
    }
    Ok(symtab.slot_of(root))
}

fn single_in(step: &Step) -> Result<Value, AplError> {
    match &step.input {
        Some(crate::model::IoSpec::Single(s)) => Ok(Value::String(s.clone())),
        Some(crate::model::IoSpec::Map(m)) if m.len() == 1 => Ok(m.values().next().cloned().unwrap()),
        _ => Err(AplError::lower_error(format!("step '{}' requires a single 'in' reference", step.id))),
    }
}

fn map_in<'a>(step: &'a Step, key: &str) -> Result<&'a Value, AplError> {
    match &step.input {
        Some(crate::model::IoSpec::Map(m)) => m
            .get(key)
            .ok_or_else(|| AplError::lower_error(format!("step '{}' missing required input '{key}'", step.id))),
        _ => Err(AplError::lower_error(format!("step '{}' requires a mapping 'in' with key '{key}'", step.id))),
    }
}

fn single_out(step: &Step) -> Result<String, AplError> {
    match &step.output {
        Some(crate::model::IoSpec::Single(s)) => Ok(s.clone()),
        Some(crate::model::IoSpec::Map(m)) if m.len() == 1 => Ok(m.values().next().cloned().unwrap()),
        _ => Err(AplError::lower_error(format!("step '{}' requires a single 'out' name", step.id))),
    }
}

fn map_out<'a>(step: &'a Step, key: &str) -> Result<&'a str, AplError> {
    match &step.output {
        Some(crate::model::IoSpec::Map(m)) => m
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                AplError::lower_error(format!(
                    "step '{}' must declare an explicit 'out.{key}' — a single declared output is not \
                     inferred for the other split half",
                    step.id
                ))
            }),
        _ => Err(AplError::lower_error(format!(
            "step '{}' (split_deterministic) requires 'out' to be a mapping with both 'train' and 'val' keys",
            step.id
        ))),
    }
}

fn arg_str(step: &Step, key: &str) -> Result<String, AplError> {
    step.args
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| AplError::lower_error(format!("step '{}' missing required arg '{key}'", step.id)))
}

fn arg_num(step: &Step, key: &str, default: Option<f64>) -> Result<Operand, AplError> {
    match step.args.get(key) {
        Some(v) => Ok(Operand::Literal(v.clone())),
        None => default
            .map(|d| Operand::Literal(Value::from(d)))
            .ok_or_else(|| AplError::lower_error(format!("step '{}' missing required arg '{key}'", step.id))),
    }
}

fn lower_legacy_step(
    op: &str,
    step: &Step,
    plan_inputs: &BTreeMap<String, String>,
    symtab: &mut Symtab,
) -> Result<Instruction, AplError> {
    match op {
        "load_csv" => {
            let raw = single_in(step)?;
            let out = output_slot(&single_out(step)?, symtab)?;
            Ok(Instruction::ReadCsv { in_path: resolve_input(&raw, plan_inputs, symtab), out })
        }
        "profile_schema" => {
            let raw = single_in(step)?;
            let table = resolve_input(&raw, plan_inputs, symtab)
                .as_slot()
                .ok_or_else(|| AplError::lower_error(format!("step '{}' 'in' must reference a slot", step.id)))?;
            let out = output_slot(&single_out(step)?, symtab)?;
            Ok(Instruction::Profile { table, out })
        }
        "split_deterministic" => {
            let raw = single_in(step)?;
            let table = resolve_input(&raw, plan_inputs, symtab)
                .as_slot()
                .ok_or_else(|| AplError::lower_error(format!("step '{}' 'in' must reference a slot", step.id)))?;
            let ratio = arg_num(step, "ratio", Some(0.8))?;
            let seed = arg_num(step, "seed", Some(1337.0))?;
            let train_out = output_slot(map_out(step, "train")?, symtab)?;
            let val_out = output_slot(map_out(step, "val")?, symtab)?;
            Ok(Instruction::Split { table, ratio, seed, train_out, val_out })
        }
        "train_linear" => {
            let raw = single_in(step)?;
            let train = resolve_input(&raw, plan_inputs, symtab)
                .as_slot()
                .ok_or_else(|| AplError::lower_error(format!("step '{}' 'in' must reference a slot", step.id)))?;
            let target = Operand::Literal(Value::String(arg_str(step, "target")?));
            let out = output_slot(&single_out(step)?, symtab)?;
            Ok(Instruction::TrainLr { train, target, out })
        }
        "eval_metrics" => {
            let model_raw = map_in(step, "model")?.clone();
            let val_raw = map_in(step, "val")?.clone();
            let model = resolve_input(&model_raw, plan_inputs, symtab)
                .as_slot()
                .ok_or_else(|| AplError::lower_error(format!("step '{}' 'in.model' must reference a slot", step.id)))?;
            let val = resolve_input(&val_raw, plan_inputs, symtab)
                .as_slot()
                .ok_or_else(|| AplError::lower_error(format!("step '{}' 'in.val' must reference a slot", step.id)))?;
            let out = output_slot(&single_out(step)?, symtab)?;
            Ok(Instruction::Eval { model, val, out })
        }
        "emit_report" => {
            let schema_raw = map_in(step, "schema")?.clone();
            let metrics_raw = map_in(step, "metrics")?.clone();
            let schema = resolve_input(&schema_raw, plan_inputs, symtab)
                .as_slot()
                .ok_or_else(|| AplError::lower_error(format!("step '{}' 'in.schema' must reference a slot", step.id)))?;
            let metrics = resolve_input(&metrics_raw, plan_inputs, symtab)
                .as_slot()
                .ok_or_else(|| AplError::lower_error(format!("step '{}' 'in.metrics' must reference a slot", step.id)))?;
            let out_path = Operand::Literal(Value::String(arg_str(step, "out_path")?));
            Ok(Instruction::EmitReport { schema, metrics, out_path })
        }
        "build_cli" => {
            let model_raw = map_in(step, "model")?.clone();
            let schema_raw = map_in(step, "schema")?.clone();
            let model = resolve_input(&model_raw, plan_inputs, symtab)
                .as_slot()
                .ok_or_else(|| AplError::lower_error(format!("step '{}' 'in.model' must reference a slot", step.id)))?;
            let schema = resolve_input(&schema_raw, plan_inputs, symtab)
                .as_slot()
                .ok_or_else(|| AplError::lower_error(format!("step '{}' 'in.schema' must reference a slot", step.id)))?;
            let out_dir = Operand::Literal(Value::String(arg_str(step, "out_dir")?));
            Ok(Instruction::BuildCli { model, schema, out_dir })
        }
        "bundle_zip" => {
            let src_dir = Operand::Literal(Value::String(arg_str(step, "src_dir")?));
            let dest_zip = Operand::Literal(Value::String(arg_str(step, "dest_zip")?));
            Ok(Instruction::Zip { src_dir, dest_zip })
        }
        other => Err(AplError::lower_error(format!("not a legacy op: {other}"))),
    }
}

fn lower_call_tool_step(
    op: &str,
    step: &Step,
    plan_inputs: &BTreeMap<String, String>,
    symtab: &mut Symtab,
) -> Instruction {
    let raw_inputs = step.input.as_ref().map(crate::model::IoSpec::as_map).unwrap_or_default();
    let mut inputs = OperandMap::new();
    for (port, raw) in &raw_inputs {
        if port == "value" && raw_inputs.len() == 1 && matches!(step.input, Some(crate::model::IoSpec::Single(_))) {
            inputs.insert("value".to_string(), resolve_input(raw, plan_inputs, symtab));
        } else {
            inputs.insert(port.clone(), resolve_input(raw, plan_inputs, symtab));
        }
    }
    for (k, v) in &step.args {
        inputs.insert(k.clone(), Operand::Literal(v.clone()));
    }

    let raw_outputs = step.output.as_ref().map(crate::model::IoSpec::as_map).unwrap_or_default();
    let mut outputs = OutputMap::new();
    for (port, raw) in &raw_outputs {
        if let Some(name) = raw.as_str() {
            if let Ok(slot) = output_slot(name, symtab) {
                outputs.insert(port.clone(), slot);
            }
        }
    }

    Instruction::CallTool { tool: op.to_string(), inputs, outputs }
}

/// Lower a validated [`Plan`] into a [`BytecodeEnvelope`].
///
/// `registry` supplies the set of tool names known in tool-based mode; in
/// legacy mode only [`LEGACY_OPS`] (plus `guard`) are accepted and `registry`
/// is not consulted for dispatch legality (it is still used to confirm the
/// plan's declared capabilities are a superset of what its tools require).
pub fn lower(plan: &Plan, registry: &dyn RegistryView, mode: CompilationMode) -> Result<BytecodeEnvelope, AplError> {
    let mut symtab = Symtab::new();
    let mut program = Vec::with_capacity(plan.steps.len() + plan.verify.len());
    let mut last_build_cli_dir: Option<Operand> = None;
    let mut required_capabilities: std::collections::BTreeSet<String> = std::collections::BTreeSet::new();

    for step in &plan.steps {
        if step.op == "guard" {
            let cond = step
                .cond
                .as_deref()
                .ok_or_else(|| AplError::lower_error(format!("step '{}' (guard) requires 'cond'", step.id)))?;
            let parsed = parse_guard(cond)?;
            let slot = symtab.slot_of(&parsed.root);
            program.push(Instruction::AssertGe { slot, field_path: parsed.field_path, threshold: parsed.threshold });
            continue;
        }

        if LEGACY_OPS.contains(&step.op.as_str()) {
            let instr = lower_legacy_step(&step.op, step, &plan.inputs, &mut symtab)?;
            if let Instruction::BuildCli { out_dir, .. } = &instr {
                last_build_cli_dir = Some(out_dir.clone());
            }
            if let Some(tool) = registry.capabilities_for(legacy_op_to_tool(&step.op)) {
                required_capabilities.extend(tool);
            }
            program.push(instr);
            continue;
        }

        match mode {
            CompilationMode::Legacy => {
                return Err(AplError::lower_error(format!(
                    "unknown op '{}' in legacy compilation mode",
                    step.op
                )))
            }
            CompilationMode::Tool => {
                if !registry.has_tool(&step.op) {
                    return Err(AplError::unknown_tool(step.op.clone()));
                }
                if let Some(caps) = registry.capabilities_for(&step.op) {
                    required_capabilities.extend(caps);
                }
                program.push(lower_call_tool_step(&step.op, step, &plan.inputs, &mut symtab));
            }
        }
    }

    for vstep in &plan.verify {
        match vstep.op.as_str() {
            "verify_zip" => {
                let target = vstep
                    .target
                    .as_ref()
                    .ok_or_else(|| AplError::lower_error("verify_zip requires 'target'"))?;
                let raw = Value::String(target.clone());
                program.push(Instruction::VerifyZip { zip_path: resolve_input(&raw, &plan.inputs, &mut symtab) });
            }
            "verify_cli_predicts" => {
                let app_dir = last_build_cli_dir.clone().ok_or_else(|| {
                    AplError::lower_error(
                        "verify_cli_predicts has no preceding BUILD_CLI/build_cli step to bind 'app_dir' to",
                    )
                })?;
                let sample = vstep
                    .args
                    .get("sample")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| AplError::lower_error("verify_cli_predicts requires args.sample"))?;
                program.push(Instruction::VerifyCli {
                    app_dir,
                    sample_json_path: Operand::Literal(Value::String(sample.to_string())),
                });
            }
            "verify_file_exists" | "verify_nonempty" => {
                // No dedicated instruction: these degrade to a no-op at
                // bytecode level, treated as advisory checks the packager
                // already subsumes via the checksum manifest.
            }
            other => return Err(AplError::lower_error(format!("unknown verify op: {other}"))),
        }
    }

    for cap in &required_capabilities {
        if !plan.capabilities.iter().any(|c| c == cap) {
            return Err(AplError::lower_error(format!(
                "plan does not declare capability '{cap}' required by an invoked tool"
            )));
        }
    }

    Ok(BytecodeEnvelope {
        program,
        capabilities: plan.capabilities.clone(),
        slots: symtab.name_to_slot(),
        metadata: Metadata { goal: plan.goal.clone(), inputs: plan.inputs.clone(), compilation_mode: mode },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IoSpec, VerifyStep};
    use crate::registry::StaticRegistryView;

    fn step(id: &str, op: &str) -> Step {
        Step { id: id.to_string(), op: op.to_string(), input: None, output: None, args: Default::default(), cond: None, description: None }
    }

    #[test]
    fn lowers_six_instruction_pipeline() {
        let mut s1 = step("s1", "load_csv");
        s1.input = Some(IoSpec::Single("$csv_in".to_string()));
        s1.output = Some(IoSpec::Single("$table".to_string()));

        let mut s2 = step("s2", "profile_schema");
        s2.input = Some(IoSpec::Single("$table".to_string()));
        s2.output = Some(IoSpec::Single("$schema".to_string()));

        let mut s3 = step("s3", "split_deterministic");
        s3.input = Some(IoSpec::Single("$table".to_string()));
        s3.args = [("ratio".to_string(), Value::from(0.8)), ("seed".to_string(), Value::from(1337))].into();
        s3.output = Some(IoSpec::Map([("train".to_string(), Value::from("$train")), ("val".to_string(), Value::from("$val"))].into()));

        let mut s4 = step("s4", "train_linear");
        s4.input = Some(IoSpec::Single("$train".to_string()));
        s4.args = [("target".to_string(), Value::from("y"))].into();
        s4.output = Some(IoSpec::Single("$model".to_string()));

        let mut s5 = step("s5", "eval_metrics");
        s5.input = Some(IoSpec::Map([("model".to_string(), Value::from("$model")), ("val".to_string(), Value::from("$val"))].into()));
        s5.output = Some(IoSpec::Single("$metrics".to_string()));

        let mut s6 = step("s6", "guard");
        s6.cond = Some("$metrics.R2 >= 0.6".to_string());

        let plan = Plan {
            goal: "demo".to_string(),
            capabilities: vec!["fs.read".to_string(), "fs.write".to_string()],
            inputs: [("csv_in".to_string(), "sandbox/in/data.csv".to_string())].into(),
            steps: vec![s1, s2, s3, s4, s5, s6],
            verify: vec![],
            rollback: vec![],
            generated_at: None,
        };

        let registry = StaticRegistryView::empty();
        let bc = lower(&plan, &registry, CompilationMode::Legacy).unwrap();
        assert_eq!(bc.program.len(), 6);
        assert_eq!(bc.program[5].opcode(), "ASSERT_GE");
    }

    #[test]
    fn split_without_both_outputs_is_a_compile_error() {
        let mut s1 = step("s1", "split_deterministic");
        s1.input = Some(IoSpec::Single("$table".to_string()));
        s1.output = Some(IoSpec::Single("$train".to_string()));
        let plan = Plan {
            goal: "demo".to_string(),
            capabilities: vec![],
            inputs: Default::default(),
            steps: vec![step("s0", "load_csv"), s1],
            verify: vec![],
            rollback: vec![],
            generated_at: None,
        };
        let registry = StaticRegistryView::empty();
        assert!(lower(&plan, &registry, CompilationMode::Legacy).is_err());
    }

    #[test]
    fn verify_cli_predicts_without_build_cli_is_a_compile_error() {
        let plan = Plan {
            goal: "demo".to_string(),
            capabilities: vec![],
            inputs: Default::default(),
            steps: vec![],
            verify: vec![VerifyStep { op: "verify_cli_predicts".to_string(), target: None, args: [("sample".to_string(), Value::from("s.json"))].into() }],
            rollback: vec![],
            generated_at: None,
        };
        let registry = StaticRegistryView::empty();
        assert!(lower(&plan, &registry, CompilationMode::Legacy).is_err());
    }
}
