//! The 10 built-in tools the VM's legacy opcodes and `CALL_TOOL`
//! instructions both dispatch through.

pub mod tools;

use std::sync::Arc;

use aplvm_core::registry::ToolRegistry;

/// Register every built-in tool's implementation closure under its
/// canonical name. Manifests (capabilities, port shapes) are discovered
/// separately via [`ToolRegistry::discover_tools`] against this crate's
/// `manifests/` directory; this only wires the dispatchable behavior.
pub fn register_builtin_tools(registry: &mut ToolRegistry) {
    registry.register("read_csv", Arc::new(tools::read_csv::ReadCsv));
    registry.register("profile", Arc::new(tools::profile::Profile));
    registry.register("split", Arc::new(tools::split::Split));
    registry.register("train_lr", Arc::new(tools::train_lr::TrainLr));
    registry.register("eval", Arc::new(tools::eval::Eval));
    registry.register("emit_report", Arc::new(tools::emit_report::EmitReport));
    registry.register("build_cli", Arc::new(tools::build_cli::BuildCli));
    registry.register("zip", Arc::new(tools::zip::Zip));
    registry.register("verify_zip", Arc::new(tools::verify_zip::VerifyZip));
    registry.register("verify_cli", Arc::new(tools::verify_cli::VerifyCli));
}
