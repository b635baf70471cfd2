//! Collaborators the engine calls out to.
//!
//! Each concern is a trait with one production implementation:
//!
//! - [`CommandSandbox`] / [`ShellSandbox`]: run shell commands
//! - [`CodeGenerator`] / [`CommandGenerator`]: produce file content
//! - [`VersionControl`] / [`GitCli`]: init and commit
//! - [`ExecutionObserver`] / [`NoopObserver`]: receive run events

pub mod generator;
pub mod git;
pub mod observer;
pub mod sandbox;

pub use generator::{CodeGenerator, CommandGenerator, GenerationRequest};
pub use git::{GitCli, VcsOutcome, VersionControl};
pub use observer::{ExecutionObserver, NoopObserver};
pub use sandbox::{CommandOutput, CommandSandbox, ShellSandbox};
