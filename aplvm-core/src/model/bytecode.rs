//! Bytecode program data model: slots, operands, instructions and the
//! envelope that the Lowerer emits and the VM consumes.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::Error as DeError;
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// A single-assignment register identifier allocated by Symtab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Slot(pub usize);

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

impl Serialize for Slot {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Slot {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        let digits = raw.strip_prefix('S').ok_or_else(|| D::Error::custom("slot must start with 'S'"))?;
        let idx: usize = digits.parse().map_err(D::Error::custom)?;
        Ok(Slot(idx))
    }
}

/// An instruction operand after the compiler has normalized every `$name`
/// reference to a slot index and everything else to a literal value (spec
/// §9 "variable references inside tool inputs").
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Slot(Slot),
    Literal(Value),
}

impl Operand {
    pub fn as_slot(&self) -> Option<Slot> {
        match self {
            Operand::Slot(s) => Some(*s),
            Operand::Literal(_) => None,
        }
    }
}

impl Serialize for Operand {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            Operand::Slot(slot) => slot.serialize(s),
            Operand::Literal(v) => v.serialize(s),
        }
    }
}

impl<'de> Deserialize<'de> for Operand {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let v = Value::deserialize(d)?;
        if let Value::String(s) = &v {
            if s.starts_with('S') && s[1..].chars().all(|c| c.is_ascii_digit()) && s.len() > 1 {
                let idx: usize = s[1..].parse().map_err(D::Error::custom)?;
                return Ok(Operand::Slot(Slot(idx)));
            }
        }
        Ok(Operand::Literal(v))
    }
}

pub type OperandMap = BTreeMap<String, Operand>;
pub type OutputMap = BTreeMap<String, Slot>;

/// Every variant the VM can dispatch. Legacy opcodes map 1:1 onto tool
/// invocations.
#[derive(Debug, Clone)]
pub enum Instruction {
    CallTool {
        tool: String,
        inputs: OperandMap,
        outputs: OutputMap,
    },
    AssertGe {
        slot: Slot,
        field_path: String,
        threshold: f64,
    },
    ReadCsv {
        in_path: Operand,
        out: Slot,
    },
    Profile {
        table: Slot,
        out: Slot,
    },
    Split {
        table: Slot,
        ratio: Operand,
        seed: Operand,
        train_out: Slot,
        val_out: Slot,
    },
    TrainLr {
        train: Slot,
        target: Operand,
        out: Slot,
    },
    Eval {
        model: Slot,
        val: Slot,
        out: Slot,
    },
    EmitReport {
        schema: Slot,
        metrics: Slot,
        out_path: Operand,
    },
    BuildCli {
        model: Slot,
        schema: Slot,
        out_dir: Operand,
    },
    Zip {
        src_dir: Operand,
        dest_zip: Operand,
    },
    VerifyZip {
        zip_path: Operand,
    },
    VerifyCli {
        app_dir: Operand,
        sample_json_path: Operand,
    },
}

impl Instruction {
    pub fn opcode(&self) -> &'static str {
        match self {
            Instruction::CallTool { .. } => "CALL_TOOL",
            Instruction::AssertGe { .. } => "ASSERT_GE",
            Instruction::ReadCsv { .. } => "READ_CSV",
            Instruction::Profile { .. } => "PROFILE",
            Instruction::Split { .. } => "SPLIT",
            Instruction::TrainLr { .. } => "TRAIN_LR",
            Instruction::Eval { .. } => "EVAL",
            Instruction::EmitReport { .. } => "EMIT_REPORT",
            Instruction::BuildCli { .. } => "BUILD_CLI",
            Instruction::Zip { .. } => "ZIP",
            Instruction::VerifyZip { .. } => "VERIFY_ZIP",
            Instruction::VerifyCli { .. } => "VERIFY_CLI",
        }
    }

    /// Every slot this instruction reads (not writes), used to check the
    /// single-assignment invariant: every slot is written by exactly one
    /// instruction, strictly before any instruction that reads it.
    pub fn reads(&self) -> Vec<Slot> {
        let mut slots = Vec::new();
        let mut push_operand = |op: &Operand, slots: &mut Vec<Slot>| {
            if let Operand::Slot(s) = op {
                slots.push(*s);
            }
        };
        match self {
            Instruction::CallTool { inputs, .. } => {
                for op in inputs.values() {
                    push_operand(op, &mut slots);
                }
            }
            Instruction::AssertGe { slot, .. } => slots.push(*slot),
            Instruction::ReadCsv { in_path, .. } => push_operand(in_path, &mut slots),
            Instruction::Profile { table, .. } => slots.push(*table),
            Instruction::Split { table, ratio, seed, .. } => {
                slots.push(*table);
                push_operand(ratio, &mut slots);
                push_operand(seed, &mut slots);
            }
            Instruction::TrainLr { train, target, .. } => {
                slots.push(*train);
                push_operand(target, &mut slots);
            }
            Instruction::Eval { model, val, .. } => {
                slots.push(*model);
                slots.push(*val);
            }
            Instruction::EmitReport { schema, metrics, out_path } => {
                slots.push(*schema);
                slots.push(*metrics);
                push_operand(out_path, &mut slots);
            }
            Instruction::BuildCli { model, schema, out_dir } => {
                slots.push(*model);
                slots.push(*schema);
                push_operand(out_dir, &mut slots);
            }
            Instruction::Zip { src_dir, dest_zip } => {
                push_operand(src_dir, &mut slots);
                push_operand(dest_zip, &mut slots);
            }
            Instruction::VerifyZip { zip_path } => push_operand(zip_path, &mut slots),
            Instruction::VerifyCli { app_dir, sample_json_path } => {
                push_operand(app_dir, &mut slots);
                push_operand(sample_json_path, &mut slots);
            }
        }
        slots
    }

    /// Every slot this instruction writes.
    pub fn writes(&self) -> Vec<Slot> {
        match self {
            Instruction::CallTool { outputs, .. } => outputs.values().copied().collect(),
            Instruction::AssertGe { .. } => vec![],
            Instruction::ReadCsv { out, .. } => vec![*out],
            Instruction::Profile { out, .. } => vec![*out],
            Instruction::Split { train_out, val_out, .. } => vec![*train_out, *val_out],
            Instruction::TrainLr { out, .. } => vec![*out],
            Instruction::Eval { out, .. } => vec![*out],
            Instruction::EmitReport { .. } => vec![],
            Instruction::BuildCli { .. } => vec![],
            Instruction::Zip { .. } => vec![],
            Instruction::VerifyZip { .. } => vec![],
            Instruction::VerifyCli { .. } => vec![],
        }
    }
}

impl Serialize for Instruction {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        fn operand_json(op: &Operand) -> Value {
            serde_json::to_value(op).unwrap_or(Value::Null)
        }
        let parts: Vec<Value> = match self {
            Instruction::CallTool { tool, inputs, outputs } => vec![
                Value::String(tool.clone()),
                serde_json::to_value(inputs).unwrap(),
                serde_json::to_value(outputs).unwrap(),
            ],
            Instruction::AssertGe { slot, field_path, threshold } => vec![
                Value::String(slot.to_string()),
                Value::String(field_path.clone()),
                serde_json::json!(threshold),
            ],
            Instruction::ReadCsv { in_path, out } => vec![operand_json(in_path), Value::String(out.to_string())],
            Instruction::Profile { table, out } => vec![Value::String(table.to_string()), Value::String(out.to_string())],
            Instruction::Split { table, ratio, seed, train_out, val_out } => vec![
                Value::String(table.to_string()),
                operand_json(ratio),
                operand_json(seed),
                Value::String(train_out.to_string()),
                Value::String(val_out.to_string()),
            ],
            Instruction::TrainLr { train, target, out } => vec![
                Value::String(train.to_string()),
                operand_json(target),
                Value::String(out.to_string()),
            ],
            Instruction::Eval { model, val, out } => vec![
                Value::String(model.to_string()),
                Value::String(val.to_string()),
                Value::String(out.to_string()),
            ],
            Instruction::EmitReport { schema, metrics, out_path } => vec![
                Value::String(schema.to_string()),
                Value::String(metrics.to_string()),
                operand_json(out_path),
            ],
            Instruction::BuildCli { model, schema, out_dir } => vec![
                Value::String(model.to_string()),
                Value::String(schema.to_string()),
                operand_json(out_dir),
            ],
            Instruction::Zip { src_dir, dest_zip } => vec![operand_json(src_dir), operand_json(dest_zip)],
            Instruction::VerifyZip { zip_path } => vec![operand_json(zip_path)],
            Instruction::VerifyCli { app_dir, sample_json_path } => {
                vec![operand_json(app_dir), operand_json(sample_json_path)]
            }
        };
        let mut seq = s.serialize_seq(Some(parts.len() + 1))?;
        seq.serialize_element(&Value::String(self.opcode().to_string()))?;
        for part in &parts {
            seq.serialize_element(part)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Instruction {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let arr = Vec::<Value>::deserialize(d)?;
        let mut it = arr.into_iter();
        let opcode = it
            .next()
            .and_then(|v| v.as_str().map(String::from))
            .ok_or_else(|| D::Error::custom("instruction missing opcode"))?;

        fn operand(v: Value) -> Operand {
            serde_json::from_value(v).unwrap_or(Operand::Literal(Value::Null))
        }
        fn slot(v: Value) -> Result<Slot, String> {
            let s = v.as_str().ok_or("expected slot string")?;
            serde_json::from_value(Value::String(s.to_string())).map_err(|e| e.to_string())
        }
        let rest: Vec<Value> = it.collect();
        let get = |i: usize| -> Result<Value, D::Error> {
            rest.get(i).cloned().ok_or_else(|| D::Error::custom(format!("instruction {opcode} missing operand {i}")))
        };

        Ok(match opcode.as_str() {
            "CALL_TOOL" => Instruction::CallTool {
                tool: get(0)?.as_str().unwrap_or_default().to_string(),
                inputs: serde_json::from_value(get(1)?).map_err(D::Error::custom)?,
                outputs: serde_json::from_value(get(2)?).map_err(D::Error::custom)?,
            },
            "ASSERT_GE" => Instruction::AssertGe {
                slot: slot(get(0)?).map_err(D::Error::custom)?,
                field_path: get(1)?.as_str().unwrap_or_default().to_string(),
                threshold: get(2)?.as_f64().ok_or_else(|| D::Error::custom("threshold not numeric"))?,
            },
            "READ_CSV" => Instruction::ReadCsv { in_path: operand(get(0)?), out: slot(get(1)?).map_err(D::Error::custom)? },
            "PROFILE" => Instruction::Profile { table: slot(get(0)?).map_err(D::Error::custom)?, out: slot(get(1)?).map_err(D::Error::custom)? },
            "SPLIT" => Instruction::Split {
                table: slot(get(0)?).map_err(D::Error::custom)?,
                ratio: operand(get(1)?),
                seed: operand(get(2)?),
                train_out: slot(get(3)?).map_err(D::Error::custom)?,
                val_out: slot(get(4)?).map_err(D::Error::custom)?,
            },
            "TRAIN_LR" => Instruction::TrainLr {
                train: slot(get(0)?).map_err(D::Error::custom)?,
                target: operand(get(1)?),
                out: slot(get(2)?).map_err(D::Error::custom)?,
            },
            "EVAL" => Instruction::Eval {
                model: slot(get(0)?).map_err(D::Error::custom)?,
                val: slot(get(1)?).map_err(D::Error::custom)?,
                out: slot(get(2)?).map_err(D::Error::custom)?,
            },
            "EMIT_REPORT" => Instruction::EmitReport {
                schema: slot(get(0)?).map_err(D::Error::custom)?,
                metrics: slot(get(1)?).map_err(D::Error::custom)?,
                out_path: operand(get(2)?),
            },
            "BUILD_CLI" => Instruction::BuildCli {
                model: slot(get(0)?).map_err(D::Error::custom)?,
                schema: slot(get(1)?).map_err(D::Error::custom)?,
                out_dir: operand(get(2)?),
            },
            "ZIP" => Instruction::Zip { src_dir: operand(get(0)?), dest_zip: operand(get(1)?) },
            "VERIFY_ZIP" => Instruction::VerifyZip { zip_path: operand(get(0)?) },
            "VERIFY_CLI" => Instruction::VerifyCli { app_dir: operand(get(0)?), sample_json_path: operand(get(1)?) },
            other => return Err(D::Error::custom(format!("unknown opcode: {other}"))),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompilationMode {
    Legacy,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub goal: String,
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
    pub compilation_mode: CompilationMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BytecodeEnvelope {
    pub program: Vec<Instruction>,
    pub capabilities: Vec<String>,
    pub slots: BTreeMap<String, Slot>,
    pub metadata: Metadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_round_trips_through_json() {
        let slot = Slot(7);
        let v = serde_json::to_value(slot).unwrap();
        assert_eq!(v, Value::String("S7".to_string()));
        let back: Slot = serde_json::from_value(v).unwrap();
        assert_eq!(back, slot);
    }

    #[test]
    fn call_tool_round_trips_as_array() {
        let mut inputs = OperandMap::new();
        inputs.insert("path".to_string(), Operand::Literal(Value::String("sandbox/in/x.csv".into())));
        let mut outputs = OutputMap::new();
        outputs.insert("table".to_string(), Slot(0));
        let instr = Instruction::CallTool { tool: "read_csv".to_string(), inputs, outputs };
        let v = serde_json::to_value(&instr).unwrap();
        assert!(v.is_array());
        assert_eq!(v[0], Value::String("CALL_TOOL".to_string()));
        let back: Instruction = serde_json::from_value(v).unwrap();
        assert_eq!(back.opcode(), "CALL_TOOL");
    }

    #[test]
    fn assert_ge_reads_but_does_not_write() {
        let instr = Instruction::AssertGe { slot: Slot(2), field_path: "R2".to_string(), threshold: 0.6 };
        assert_eq!(instr.reads(), vec![Slot(2)]);
        assert!(instr.writes().is_empty());
    }
}
