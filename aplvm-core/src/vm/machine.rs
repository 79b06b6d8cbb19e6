//! The VM: a single-threaded, cooperative interpreter over a flat bytecode
//! program. No jumps, no loops — `ASSERT_GE` halts the run when it fails, it
//! never branches around the rest of the program.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_json::Value;

use aplvm_common::sha256_hex;

use crate::errors::AplError;
use crate::model::{BytecodeEnvelope, Instruction, Operand, RtValue, Slot};
use crate::registry::{RegistryView, ToolContext, ToolRegistry};

use super::policy::PolicyStore;
use super::quotas::{QuotaLimits, Quotas};
use super::sandbox::SandboxGuard;
use super::txlog::TxLog;

pub struct RunOutcome {
    pub run_id: String,
    pub slots: BTreeMap<Slot, RtValue>,
    /// The post-run checksum manifest: `{relative_path -> sha256}` for
    /// every file under `sandbox/out`, the artifact Replay diffs against.
    pub checksums: BTreeMap<String, String>,
}

struct VmContext<'a> {
    sandbox: &'a SandboxGuard,
    quotas: &'a mut Quotas,
    txlog: &'a TxLog,
}

impl ToolContext for VmContext<'_> {
    fn sandbox_root(&self) -> &std::path::Path {
        self.sandbox.root()
    }

    fn resolve_path(&mut self, relative: &str) -> Result<PathBuf, AplError> {
        self.sandbox.resolve(relative)
    }

    fn read_file(&mut self, relative: &str) -> Result<Vec<u8>, AplError> {
        let path = self.sandbox.resolve(relative)?;
        let bytes = std::fs::read(&path)?;
        self.quotas.charge_io(bytes.len() as u64)?;
        Ok(bytes)
    }

    fn write_file(&mut self, relative: &str, contents: &[u8]) -> Result<(), AplError> {
        let path = self.sandbox.resolve(relative)?;
        let pre_exists = path.exists();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, contents)?;
        self.quotas.charge_io(contents.len() as u64)?;
        if !pre_exists {
            self.quotas.charge_file_write()?;
        }
        self.txlog.record_write(&path, &sha256_hex(contents), !pre_exists)?;
        Ok(())
    }

    fn charge_cpu_ms(&mut self, amount: u64) -> Result<(), AplError> {
        self.quotas.charge_cpu_ms(amount)
    }
}

pub struct Vm<'a> {
    registry: &'a ToolRegistry,
    sandbox: SandboxGuard,
    quotas: Quotas,
}

impl<'a> Vm<'a> {
    pub fn new(registry: &'a ToolRegistry, sandbox_root: PathBuf, limits: QuotaLimits) -> Self {
        Vm { registry, sandbox: SandboxGuard::new(sandbox_root), quotas: Quotas::new(limits) }
    }

    /// Execute `bytecode` end to end. `app_id` and `policy` gate the run's
    /// declared capabilities once, before a single instruction dispatches.
    pub fn run(
        &mut self,
        bytecode: &BytecodeEnvelope,
        policy: &mut PolicyStore,
        app_id: &str,
        auto_grant: bool,
        run_id: impl Into<String>,
    ) -> Result<RunOutcome, AplError> {
        policy.check_or_grant(app_id, &bytecode.capabilities, auto_grant)?;

        let run_id = run_id.into();
        let txlog = TxLog::new(self.sandbox.root(), run_id.clone())?;
        let started = now_rfc3339();
        txlog.start(&started, &bytecode.metadata.goal)?;

        let mut slots: BTreeMap<Slot, RtValue> = BTreeMap::new();
        let result = self.dispatch_all(bytecode, &txlog, &mut slots, &bytecode.capabilities);

        let ended = now_rfc3339();
        txlog.end(&ended, if result.is_ok() { "ok" } else { "error" })?;
        result?;

        let manifest = super::checksums::write_output_checksums(self.sandbox.root(), &run_id)?;
        Ok(RunOutcome { run_id, slots, checksums: manifest.checksums })
    }

    fn dispatch_all(
        &mut self,
        bytecode: &BytecodeEnvelope,
        txlog: &TxLog,
        slots: &mut BTreeMap<Slot, RtValue>,
        granted: &[String],
    ) -> Result<(), AplError> {
        for instr in &bytecode.program {
            self.dispatch_one(instr, txlog, slots, granted)?;
        }
        Ok(())
    }

    fn dispatch_one(
        &mut self,
        instr: &Instruction,
        txlog: &TxLog,
        slots: &mut BTreeMap<Slot, RtValue>,
        granted: &[String],
    ) -> Result<(), AplError> {
        tracing::info_span!("instruction", opcode = instr.opcode()).in_scope(|| tracing::debug!("dispatch"));

        if let Instruction::AssertGe { slot, field_path, threshold } = instr {
            let value = slots.get(slot).ok_or_else(|| AplError::missing_input(slot))?;
            let actual = value.field_as_f64(field_path).ok_or_else(|| {
                AplError::guard_failed("ASSERT_GE", format!("field '{field_path}' is not numeric or missing"))
            })?;
            if actual < *threshold {
                return Err(AplError::guard_failed(
                    "ASSERT_GE",
                    format!("{field_path} = {actual} is below required threshold {threshold}"),
                ));
            }
            return Ok(());
        }

        let (tool_name, inputs, output_slots) = self.prepare_call(instr, slots)?;

        // Defense in depth: the capability was already required to be in the
        // plan's declared set at lowering time, and that declared set was
        // already checked against the persistent grant once at the top of
        // the run; this re-check guards against a future dispatch path that
        // skips either.
        if let Some(required) = self.registry.capabilities_for(&tool_name) {
            for cap in &required {
                if !granted.iter().any(|g| g == cap) {
                    return Err(AplError::new(
                        crate::errors::ErrorKind::PermissionDenied,
                        format!("tool '{tool_name}' requires capability '{cap}' which is not in the run's granted set"),
                    )
                    .with_tool(tool_name.clone())
                    .with_capability(cap.clone()));
                }
            }
        }

        let mut ctx = VmContext { sandbox: &self.sandbox, quotas: &mut self.quotas, txlog };

        // Compute-heavy tools charge cpu_ms by measured wall time, scaled by
        // an importance factor of ten; every other dispatch charges a flat
        // nominal cost.
        let heavy = matches!(tool_name.as_str(), "train_lr" | "eval" | "split" | "profile");
        let started = heavy.then(std::time::Instant::now);
        let outputs = self.registry.call(&tool_name, &inputs, &mut ctx)?;
        match started {
            Some(t) => ctx.charge_cpu_ms(t.elapsed().as_millis() as u64 * 10)?,
            None => ctx.charge_cpu_ms(10)?,
        }

        for (port, slot) in output_slots {
            let value = outputs.get(&port).cloned().ok_or_else(|| {
                AplError::tool_failure(tool_name.clone(), format!("tool did not produce declared output '{port}'"))
            })?;
            slots.insert(slot, RtValue::Json(value));
        }
        Ok(())
    }

    /// Build the `(tool_name, inputs, output_port -> slot)` triple a
    /// `CALL_TOOL` dispatch needs. Legacy opcodes are translated to the
    /// equivalent tool call 1:1.
    fn prepare_call(
        &self,
        instr: &Instruction,
        slots: &BTreeMap<Slot, RtValue>,
    ) -> Result<(String, BTreeMap<String, Value>, Vec<(String, Slot)>), AplError> {
        let resolve = |op: &Operand| -> Result<Value, AplError> {
            match op {
                Operand::Literal(v) => Ok(v.clone()),
                Operand::Slot(s) => slots.get(s).map(RtValue::to_json).ok_or_else(|| AplError::missing_input(s)),
            }
        };
        let resolve_slot_json = |s: &Slot| -> Result<Value, AplError> {
            slots.get(s).map(RtValue::to_json).ok_or_else(|| AplError::missing_input(s))
        };

        Ok(match instr {
            Instruction::CallTool { tool, inputs, outputs } => {
                let mut resolved = BTreeMap::new();
                for (port, op) in inputs {
                    resolved.insert(port.clone(), resolve(op)?);
                }
                (tool.clone(), resolved, outputs.iter().map(|(p, s)| (p.clone(), *s)).collect())
            }
            Instruction::ReadCsv { in_path, out } => {
                ("read_csv".to_string(), BTreeMap::from([("path".to_string(), resolve(in_path)?)]), vec![("table".to_string(), *out)])
            }
            Instruction::Profile { table, out } => {
                ("profile".to_string(), BTreeMap::from([("table".to_string(), resolve_slot_json(table)?)]), vec![("schema".to_string(), *out)])
            }
            Instruction::Split { table, ratio, seed, train_out, val_out } => (
                "split".to_string(),
                BTreeMap::from([
                    ("table".to_string(), resolve_slot_json(table)?),
                    ("ratio".to_string(), resolve(ratio)?),
                    ("seed".to_string(), resolve(seed)?),
                ]),
                vec![("train".to_string(), *train_out), ("val".to_string(), *val_out)],
            ),
            Instruction::TrainLr { train, target, out } => (
                "train_lr".to_string(),
                BTreeMap::from([("train".to_string(), resolve_slot_json(train)?), ("target".to_string(), resolve(target)?)]),
                vec![("model".to_string(), *out)],
            ),
            Instruction::Eval { model, val, out } => (
                "eval".to_string(),
                BTreeMap::from([("model".to_string(), resolve_slot_json(model)?), ("val".to_string(), resolve_slot_json(val)?)]),
                vec![("metrics".to_string(), *out)],
            ),
            Instruction::EmitReport { schema, metrics, out_path } => (
                "emit_report".to_string(),
                BTreeMap::from([
                    ("schema".to_string(), resolve_slot_json(schema)?),
                    ("metrics".to_string(), resolve_slot_json(metrics)?),
                    ("out_path".to_string(), resolve(out_path)?),
                ]),
                vec![],
            ),
            Instruction::BuildCli { model, schema, out_dir } => (
                "build_cli".to_string(),
                BTreeMap::from([
                    ("model".to_string(), resolve_slot_json(model)?),
                    ("schema".to_string(), resolve_slot_json(schema)?),
                    ("out_dir".to_string(), resolve(out_dir)?),
                ]),
                vec![],
            ),
            Instruction::Zip { src_dir, dest_zip } => (
                "zip".to_string(),
                BTreeMap::from([("src_dir".to_string(), resolve(src_dir)?), ("dest_zip".to_string(), resolve(dest_zip)?)]),
                vec![],
            ),
            Instruction::VerifyZip { zip_path } => {
                ("verify_zip".to_string(), BTreeMap::from([("zip_path".to_string(), resolve(zip_path)?)]), vec![])
            }
            Instruction::VerifyCli { app_dir, sample_json_path } => (
                "verify_cli".to_string(),
                BTreeMap::from([
                    ("app_dir".to_string(), resolve(app_dir)?),
                    ("sample_json_path".to_string(), resolve(sample_json_path)?),
                ]),
                vec![],
            ),
            Instruction::AssertGe { .. } => unreachable!("handled before prepare_call"),
        })
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Tool;
    use std::sync::Arc;

    struct EchoReadCsv;
    impl Tool for EchoReadCsv {
        fn call(&self, inputs: &BTreeMap<String, Value>, _ctx: &mut dyn ToolContext) -> Result<BTreeMap<String, Value>, AplError> {
            let path = inputs.get("path").cloned().unwrap_or(Value::Null);
            Ok(BTreeMap::from([("table".to_string(), serde_json::json!({"headers": ["x"], "rows": [], "source": path}))]))
        }
    }

    #[test]
    fn read_csv_dispatches_through_registry_and_fills_slot() {
        let mut registry = ToolRegistry::new();
        registry.register("read_csv", Arc::new(EchoReadCsv));

        let dir = tempfile::tempdir().unwrap();
        let mut vm = Vm::new(&registry, dir.path().to_path_buf(), QuotaLimits::default());

        let bytecode = BytecodeEnvelope {
            program: vec![Instruction::ReadCsv { in_path: Operand::Literal(Value::String("sandbox/in/x.csv".into())), out: Slot(0) }],
            capabilities: vec!["fs.read".to_string()],
            slots: Default::default(),
            metadata: crate::model::Metadata { goal: "demo".to_string(), inputs: Default::default(), compilation_mode: crate::model::CompilationMode::Legacy },
        };

        let mut policy = PolicyStore::load_or_create(dir.path().join("policy.json")).unwrap();
        let outcome = vm.run(&bytecode, &mut policy, "app-1", true, "run-1").unwrap();
        assert!(outcome.slots.contains_key(&Slot(0)));
    }

    #[test]
    fn assert_ge_failure_halts_the_run() {
        let registry = ToolRegistry::new();
        let dir = tempfile::tempdir().unwrap();
        let mut vm = Vm::new(&registry, dir.path().to_path_buf(), QuotaLimits::default());

        let program = BytecodeEnvelope {
            program: vec![Instruction::AssertGe { slot: Slot(0), field_path: "R2".to_string(), threshold: 0.9 }],
            capabilities: vec![],
            slots: Default::default(),
            metadata: crate::model::Metadata { goal: "demo".to_string(), inputs: Default::default(), compilation_mode: crate::model::CompilationMode::Legacy },
        };
        // No producing instruction precedes this ASSERT_GE, so the slot is
        // unwritten; the VM must report MissingInput rather than panicking.
        let mut policy = PolicyStore::load_or_create(dir.path().join("policy.json")).unwrap();
        let err = vm.run(&program, &mut policy, "app-2", true, "run-2").unwrap_err();
        assert_eq!(err.kind.as_str(), "MissingInput");
    }
}
