use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

/// Run structured build plans
///
/// Forge executes a JSON plan of folder creation, file writes, shell
/// commands and commits against a target directory. Independent file writes
/// run in parallel, failed commands are corrected and retried, and the
/// target is snapshotted before each run so it can be rolled back.
#[derive(Parser)]
#[command(version, about, name = "forge")]
pub struct Args {
    /// Engine configuration file (JSON). FORGE_* environment variables
    /// override it
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Snapshot directory. Defaults to $XDG_DATA_HOME/forge/snapshots
    #[arg(long, global = true)]
    pub snapshot_dir: Option<PathBuf>,

    /// Disable colored output and use plain text
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute a plan
    #[command(alias = "r")]
    Run(RunArgs),
    /// Show how a plan would be grouped, without running it
    #[command(alias = "a")]
    Analyze(AnalyzeArgs),
    /// Manage snapshots
    #[command(alias = "s")]
    Snapshot {
        #[command(subcommand)]
        command: SnapshotCommands,
    },
    /// Process-pool worker reading tasks from stdin
    #[command(hide = true)]
    Worker(WorkerArgs),
}

#[derive(ClapArgs)]
pub struct RunArgs {
    /// Plan file (JSON)
    pub plan: PathBuf,

    /// Directory to build in. Defaults to ./<project_name>
    #[arg(long)]
    pub target: Option<PathBuf>,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,

    /// Do not snapshot the target before running
    #[arg(long)]
    pub no_snapshot: bool,

    /// Run parallel groups on threads instead of worker processes
    #[arg(long)]
    pub threads: bool,

    /// Wall-clock budget for the run
    #[arg(long)]
    pub timeout_minutes: Option<u64>,

    /// Code generator command, one argument per flag
    #[arg(long = "generator", value_name = "ARG", allow_hyphen_values = true)]
    pub generator: Vec<String>,
}

#[derive(ClapArgs)]
pub struct AnalyzeArgs {
    /// Plan file (JSON)
    pub plan: PathBuf,

    /// Print the analysis as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(ClapArgs)]
pub struct WorkerArgs {
    /// Code generator command, one argument per flag
    #[arg(long = "generator", value_name = "ARG", allow_hyphen_values = true)]
    pub generator: Vec<String>,
}

#[derive(Subcommand)]
pub enum SnapshotCommands {
    /// List snapshots, newest first
    #[command(alias = "ls")]
    List,
    /// Snapshot a directory
    Create {
        /// Directory to copy
        path: PathBuf,
        /// Free-form label stored with the snapshot
        #[arg(short, long)]
        label: Option<String>,
    },
    /// Restore a snapshot over its source directory
    Restore {
        /// Snapshot ID. Defaults to the latest snapshot
        id: Option<String>,
    },
    /// Delete one snapshot
    #[command(alias = "rm")]
    Delete {
        /// Snapshot ID
        id: String,
    },
    /// Show disk usage of all snapshots
    Usage,
    /// Delete every snapshot
    Clear,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_args_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_generator_collects_every_flag() {
        let args = Args::parse_from([
            "forge",
            "run",
            "plan.json",
            "--generator",
            "python3",
            "--generator",
            "-m",
            "--generator",
            "gen",
        ]);
        match args.command {
            Commands::Run(run) => assert_eq!(run.generator, vec!["python3", "-m", "gen"]),
            _ => panic!("Expected run command"),
        }
    }
}
