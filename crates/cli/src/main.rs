//! The querygate CLI.
//!
//! Compiles requests against a configuration directory and runs them
//! against a JSON dataset with the in-memory store.

use std::path::PathBuf;

use clap::Parser;

use querygate_cli::{run, Command, Context};
use querygate_configuration::environment::ProcessEnvironment;

/// The command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "querygate", version, about)]
pub struct Args {
    /// The directory holding `configuration.json`.
    #[arg(
        long = "context",
        env = "QUERYGATE_CONFIGURATION",
        value_name = "DIRECTORY"
    )]
    pub context_path: Option<PathBuf>,
    /// The command to invoke.
    #[command(subcommand)]
    pub subcommand: Command,
}

/// The application entrypoint. It pulls information from the environment and then calls the [run]
/// function. The library remains unaware of the environment, so that we can more easily test it.
#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();
    let context_path = match args.context_path {
        None => std::env::current_dir()?,
        Some(path) => path,
    };
    let context = Context {
        context_path,
        environment: ProcessEnvironment,
    };
    run(args.subcommand, context, &mut std::io::stdout()).await?;
    Ok(())
}
