//! Forge CLI Application
//!
//! Command-line interface for the forge plan execution engine.

mod args;
mod cli;
mod renderer;

use anyhow::Result;
use args::{Args, Commands};
use clap::Parser;
use cli::Cli;
use log::debug;
use renderer::TerminalRenderer;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let Args {
        config,
        snapshot_dir,
        no_color,
        command,
    } = Args::parse();

    let engine_config = cli::load_config(config.as_deref())?;
    debug!("Forge started");

    let cli = Cli::new(
        engine_config,
        config,
        snapshot_dir,
        TerminalRenderer::new(!no_color),
    );

    match command {
        Commands::Run(args) => cli.run_plan(args).await,
        Commands::Analyze(args) => cli.analyze(args),
        Commands::Snapshot { command } => cli.handle_snapshot_command(command).await,
        Commands::Worker(args) => cli.run_worker(args).await,
    }
}
