//! Core library for the Forge plan execution engine.
//!
//! This crate turns a structured [`Plan`] into a sequence of filesystem
//! operations, shell commands and commits. Steps that write disjoint files
//! run concurrently on a worker pool; everything else runs in order.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐    ┌─────────────────┐    ┌─────────────────┐
//! │  Orchestrator   │───▶│ PlanStepAnalyzer│    │ SnapshotManager │
//! │ (state machine) │    └─────────────────┘    │  (rollback)     │
//! │                 │───────────────────────────▶                 │
//! │                 │    ┌─────────────────┐    └─────────────────┘
//! │                 │───▶│ ParallelExecu-  │
//! └─────────────────┘    │ tionPool        │
//!          │             └────────┬────────┘
//!          ▼                      ▼
//! ┌──────────────────────────────────────────┐
//! │ StepExecutor  (+ RetryCorrector)         │
//! │   sandbox · code generator · git         │
//! └──────────────────────────────────────────┘
//! ```
//!
//! Every failure inside a run is captured as data: [`Orchestrator::start`]
//! always hands back a [`RunReport`] with whatever results were produced.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use forge_core::{models::Step, OrchestratorBuilder, Plan};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = OrchestratorBuilder::new().without_snapshots().build().await?;
//!
//! let plan = Plan::new(
//!     "hello",
//!     vec![
//!         Step::create_structure(["src"]),
//!         Step::create_file("src/main.py", Some("print('hello')\n")),
//!         Step::run_command("python3 src/main.py"),
//!     ],
//! );
//!
//! let report = orchestrator.start(&plan, "/tmp/hello").await?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod analyzer;
pub mod config;
pub mod corrector;
pub mod display;
pub mod error;
pub mod executor;
pub mod external;
pub mod models;
pub mod orchestrator;
pub mod pool;
pub mod snapshot;

// Re-export commonly used types
pub use agent::Agent;
pub use analyzer::{AnalysisStats, PlanStepAnalyzer};
pub use config::EngineConfig;
pub use corrector::{CorrectionStats, RetryCorrector};
pub use display::{AnalysisSummary, OperationStatus, Snapshots};
pub use error::{EngineError, Result};
pub use executor::{StepExecutor, WorkerTask};
pub use models::{
    Action, ActionKind, ErrorKind, ExecutionGroup, Plan, Progress, RunReport, RunStatus, Snapshot,
    Step, StepResult,
};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, RunController};
pub use pool::{ParallelExecutionPool, WorkerCommand};
pub use snapshot::SnapshotManager;
