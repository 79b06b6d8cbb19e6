use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

const TOOLS_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../aplvm-tools/manifests");

const GUARD_PLAN: &str = r#"{
  "goal": "demo",
  "capabilities": ["fs.read"],
  "steps": [
    {"id": "s1", "op": "guard", "cond": "$x.y >= 1"}
  ]
}"#;

fn cmd() -> Command {
    Command::cargo_bin("aplvm").unwrap()
}

fn compile(dir: &std::path::Path, plan: &str) -> std::path::PathBuf {
    let plan_path = dir.join("plan.json");
    let bytecode_path = dir.join("bytecode.json");
    fs::write(&plan_path, plan).unwrap();
    cmd()
        .arg("compile")
        .arg(&plan_path)
        .arg("--tools")
        .arg(TOOLS_DIR)
        .arg("--out")
        .arg(&bytecode_path)
        .assert()
        .success();
    bytecode_path
}

#[test]
fn dry_run_prints_instructions_without_touching_the_sandbox() {
    let dir = tempdir().unwrap();
    let bytecode_path = compile(dir.path(), GUARD_PLAN);
    let sandbox = dir.path().join("sandbox");

    cmd()
        .arg("run")
        .arg(&bytecode_path)
        .arg("--sandbox")
        .arg(&sandbox)
        .arg("--tools")
        .arg(TOOLS_DIR)
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("ASSERT_GE"));

    assert!(!sandbox.exists(), "dry-run must not create the sandbox directory");
}

#[test]
fn run_fails_with_runtime_failure_on_an_unsatisfied_guard_input() {
    let dir = tempdir().unwrap();
    let bytecode_path = compile(dir.path(), GUARD_PLAN);
    let sandbox = dir.path().join("sandbox");

    // Nothing ever writes slot "x", so ASSERT_GE dispatches against a slot
    // that was never written: a MissingInput error, exit code 1.
    cmd()
        .arg("run")
        .arg(&bytecode_path)
        .arg("--sandbox")
        .arg(&sandbox)
        .arg("--tools")
        .arg(TOOLS_DIR)
        .arg("--yes")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("MissingInput"));
}

#[test]
fn undo_with_nothing_to_undo_reports_runtime_failure() {
    let dir = tempdir().unwrap();
    let sandbox = dir.path().join("sandbox");
    fs::create_dir_all(&sandbox).unwrap();

    cmd()
        .arg("undo")
        .arg("--sandbox")
        .arg(&sandbox)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("nothing to undo"));
}

#[test]
fn cache_stats_on_an_empty_sandbox_reports_zero() {
    let dir = tempdir().unwrap();
    let sandbox = dir.path().join("sandbox");

    cmd()
        .arg("cache")
        .arg("stats")
        .arg("--sandbox")
        .arg(&sandbox)
        .assert()
        .success()
        .stdout(predicate::str::contains("total_cached_calls: 0"));
}
