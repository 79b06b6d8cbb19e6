use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

const VALID_PLAN: &str = r#"{
  "goal": "demo",
  "capabilities": ["fs.read"],
  "steps": [
    {"id": "s1", "op": "guard", "cond": "$x.y >= 1"}
  ]
}"#;

const INVALID_PLAN: &str = r#"{
  "goal": "demo",
  "steps": [
    {"id": "s1", "op": "guard", "cond": "$x.y >= 1"}
  ]
}"#;

fn cmd() -> Command {
    Command::cargo_bin("aplvm").unwrap()
}

#[test]
fn validate_accepts_a_well_formed_plan() {
    let dir = tempdir().unwrap();
    let plan_path = dir.path().join("plan.json");
    fs::write(&plan_path, VALID_PLAN).unwrap();

    cmd().arg("validate").arg(&plan_path).assert().success().stdout(predicate::str::contains("[OK]"));
}

#[test]
fn validate_rejects_a_plan_missing_capabilities() {
    let dir = tempdir().unwrap();
    let plan_path = dir.path().join("plan.json");
    fs::write(&plan_path, INVALID_PLAN).unwrap();

    cmd().arg("validate").arg(&plan_path).assert().code(2).stderr(predicate::str::contains("SchemaViolation"));
}

#[test]
fn compile_writes_a_bytecode_envelope_to_out() {
    let dir = tempdir().unwrap();
    let plan_path = dir.path().join("plan.json");
    let out_path = dir.path().join("bytecode.json");
    fs::write(&plan_path, VALID_PLAN).unwrap();

    cmd().arg("compile").arg(&plan_path).arg("--out").arg(&out_path).assert().success();

    let bytecode: serde_json::Value = serde_json::from_str(&fs::read_to_string(&out_path).unwrap()).unwrap();
    assert_eq!(bytecode["program"][0]["op"], "ASSERT_GE");
    assert_eq!(bytecode["capabilities"][0], "fs.read");
}

#[test]
fn compile_rejects_a_malformed_plan_with_compile_failure_code() {
    let dir = tempdir().unwrap();
    let plan_path = dir.path().join("plan.json");
    fs::write(&plan_path, INVALID_PLAN).unwrap();

    cmd().arg("compile").arg(&plan_path).assert().code(2);
}

#[test]
fn plan_lint_reports_every_violation_not_just_the_first() {
    let dir = tempdir().unwrap();
    let plan_path = dir.path().join("plan.json");
    fs::write(
        &plan_path,
        r#"{"steps": [{"id": "s1", "op": "guard"}], "unexpected_field": true}"#,
    )
    .unwrap();

    let assertion = cmd().arg("plan").arg("lint").arg(&plan_path).assert().code(2);
    let output = assertion.get_output();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[INVALID]"));
    // at least the missing "goal", missing "capabilities", the guard step's
    // missing "cond", and the unexpected top-level key should each surface.
    assert!(stdout.lines().filter(|l| l.starts_with("  /")).count() >= 3, "expected multiple reported violations, got:\n{stdout}");
}

#[test]
fn plan_lint_prints_ok_for_a_clean_plan() {
    let dir = tempdir().unwrap();
    let plan_path = dir.path().join("plan.json");
    fs::write(&plan_path, VALID_PLAN).unwrap();

    cmd().arg("plan").arg("lint").arg(&plan_path).assert().success().stdout(predicate::str::contains("[OK]"));
}
