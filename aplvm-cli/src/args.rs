use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "aplvm",
    version,
    about = "Compile plans to bytecode, run them under a capability-sandboxed VM, and replay past runs."
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Validate a plan and lower it to bytecode.
    Compile(CompileArgs),
    /// Validate a plan against the generated schema without compiling it.
    Validate(ValidateArgs),
    /// Execute a bytecode program under the VM.
    Run(RunArgs),
    /// Bundle a plan, its bytecode, and policy into a package archive.
    Pack(PackArgs),
    /// Re-execute a packaged run and diff its outputs against the original.
    Replay(ReplayArgs),
    /// Revert the most recent run's writes.
    Undo(UndoArgs),
    /// Inspect the model-call cache.
    Cache(CacheArgs),
    /// Plan-authoring diagnostics.
    Plan(PlanArgs),
}

#[derive(Parser, Debug)]
pub struct CompileArgs {
    /// Path to the plan document (JSON or YAML).
    pub plan_path: PathBuf,
    /// Directory of tool.json manifests to discover before lowering.
    #[arg(long, env = "APLVM_TOOLS_DIR", default_value = "aplvm-tools/manifests")]
    pub tools: PathBuf,
    /// Write the compiled bytecode here instead of stdout.
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to the plan document (JSON or YAML).
    pub plan_path: PathBuf,
    #[arg(long, env = "APLVM_TOOLS_DIR", default_value = "aplvm-tools/manifests")]
    pub tools: PathBuf,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to a compiled bytecode envelope (JSON).
    pub bytecode_path: PathBuf,
    /// Sandbox root the run executes under.
    #[arg(long, env = "APLVM_SANDBOX", default_value = "sandbox")]
    pub sandbox: PathBuf,
    /// Directory of tool.json manifests to discover before dispatch.
    #[arg(long, env = "APLVM_TOOLS_DIR", default_value = "aplvm-tools/manifests")]
    pub tools: PathBuf,
    /// Auto-grant the plan's declared capabilities on first run instead of
    /// failing closed.
    #[arg(long, short = 'y')]
    pub yes: bool,
    /// Print the instructions the program would dispatch without
    /// executing any of them.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Parser, Debug)]
pub struct PackArgs {
    pub plan_path: PathBuf,
    pub bytecode_path: PathBuf,
    #[arg(long, env = "APLVM_SANDBOX", default_value = "sandbox")]
    pub sandbox: PathBuf,
    #[arg(short, long)]
    pub out: PathBuf,
}

#[derive(Parser, Debug)]
pub struct ReplayArgs {
    /// Path to a previously packed archive.
    pub package_path: PathBuf,
    #[arg(long, env = "APLVM_SANDBOX", default_value = "sandbox")]
    pub sandbox: PathBuf,
    #[arg(long, env = "APLVM_TOOLS_DIR", default_value = "aplvm-tools/manifests")]
    pub tools: PathBuf,
    /// Remove sandbox/out before replaying so stale artifacts can't mask a
    /// regression.
    #[arg(long)]
    pub purge_out: bool,
}

#[derive(Parser, Debug)]
pub struct UndoArgs {
    #[arg(long, env = "APLVM_SANDBOX", default_value = "sandbox")]
    pub sandbox: PathBuf,
    /// Print what would be deleted without deleting anything.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Parser, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub cmd: CacheCommand,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Print total_cached_calls, cache_size_bytes, and cache_hit_rate.
    Stats {
        #[arg(long, env = "APLVM_SANDBOX", default_value = "sandbox")]
        sandbox: PathBuf,
    },
}

#[derive(Parser, Debug)]
pub struct PlanArgs {
    #[command(subcommand)]
    pub cmd: PlanCommand,
}

#[derive(Subcommand, Debug)]
pub enum PlanCommand {
    /// Run the Validator over a plan and print [OK]/[INVALID] plus every
    /// schema-pointer/message pair.
    Lint {
        plan_path: PathBuf,
        #[arg(long, env = "APLVM_TOOLS_DIR", default_value = "aplvm-tools/manifests")]
        tools: PathBuf,
    },
}
