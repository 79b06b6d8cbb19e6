mod args;
mod commands;
mod exit_codes;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use args::{Cli, Command};
use aplvm_core::errors::AplError;

fn main() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).compact().init();

    let cli = Cli::parse();
    let code = match dispatch(cli) {
        Ok(code) => code,
        Err(err) => {
            report(&err);
            match err.downcast_ref::<AplError>() {
                Some(apl_err) => exit_codes::for_error(apl_err),
                None => exit_codes::INFRA_FAILURE,
            }
        }
    };
    std::process::exit(code);
}

fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Compile(args) => commands::compile::run(args),
        Command::Validate(args) => commands::validate::run(args),
        Command::Run(args) => commands::run::run(args),
        Command::Pack(args) => commands::pack::run(args),
        Command::Replay(args) => commands::replay::run(args),
        Command::Undo(args) => commands::undo::run(args),
        Command::Cache(args) => commands::cache::run(args),
        Command::Plan(args) => commands::plan::run(args),
    }
}

/// Print a failing command's error: compile failures surface their schema
/// pointer, runtime failures their opcode and capability/quota context,
/// everything else the plain message.
fn report(err: &anyhow::Error) {
    match err.downcast_ref::<AplError>() {
        Some(apl_err) => {
            eprint!("error[{}]: {}", apl_err.kind.as_str(), apl_err.message);
            if let Some(pointer) = &apl_err.pointer {
                eprint!(" (pointer={pointer})");
            }
            if let Some(opcode) = &apl_err.opcode {
                eprint!(" (opcode={opcode})");
            }
            if let Some(tool) = &apl_err.tool {
                eprint!(" (tool={tool})");
            }
            if let Some(capability) = &apl_err.capability {
                eprint!(" (capability={capability})");
            }
            if let Some(quota) = &apl_err.quota {
                eprint!(" (quota={quota})");
            }
            eprintln!();
        }
        None => eprintln!("error: {err:?}"),
    }
}
