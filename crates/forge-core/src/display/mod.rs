//! Markdown formatting for engine output.
//!
//! Domain models implement [`std::fmt::Display`] directly (see [`models`]);
//! the wrapper types here format collections and summaries that have no
//! single model behind them. The CLI renders the resulting markdown in the
//! terminal.
//!
//! ## Module Organization
//!
//! - [`collections`]: Collection and summary wrappers (Snapshots, AnalysisSummary)
//! - [`status`]: Confirmation messages (OperationStatus)
//! - [`datetime`]: Date/time and size formatting utilities
//! - [`models`]: Display implementations for domain models
//!
//! ```rust
//! use forge_core::{display::OperationStatus, models::RunStatus};
//!
//! assert_eq!(RunStatus::TimedOut.to_string(), "timed_out");
//! let status = OperationStatus::success("Deleted snapshot demo_20240101_120000".to_string());
//! assert!(status.to_string().starts_with("Success:"));
//! ```

pub mod collections;
pub mod datetime;
pub mod models;
pub mod status;

pub use collections::{AnalysisSummary, Snapshots};
pub use datetime::{ByteSize, LocalDateTime};
pub use status::OperationStatus;
