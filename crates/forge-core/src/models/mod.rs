//! Data models for plans, steps and execution results.
//!
//! Plans and steps are immutable inputs: the engine never rewrites a plan it
//! is handed. Everything the engine produces ([`StepResult`], [`RunReport`],
//! [`Snapshot`]) is plain serializable data so it can cross a process
//! boundary or be printed as JSON.
//!
//! Display implementations for these models live in [`crate::display`].
//!
//! # Examples
//!
//! ```rust
//! use forge_core::models::{Plan, Step};
//!
//! let plan = Plan::new(
//!     "demo",
//!     vec![
//!         Step::create_structure(["src"]),
//!         Step::create_file("src/main.py", Some("print('hi')\n")),
//!         Step::run_command("python src/main.py"),
//!     ],
//! );
//! assert_eq!(plan.steps[2].index, 2);
//! ```

pub mod group;
pub mod plan;
pub mod report;
pub mod result;
pub mod snapshot;
pub mod status;
pub mod step;


pub use group::ExecutionGroup;
pub use plan::{GenerationContext, Plan};
pub use report::{Progress, RunReport};
pub use result::{RetryAttempt, StepResult};
pub use snapshot::{Snapshot, SnapshotUsage};
pub use status::{ErrorKind, RunStatus};
pub use step::{Action, ActionKind, Step};
