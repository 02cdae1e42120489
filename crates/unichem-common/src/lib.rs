//! UniChem Indexer Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared plumbing for the UniChem indexer workspace members:
//!
//! - **Error Handling**: the workspace-wide error type and result alias
//! - **Logging**: `tracing` subscriber setup (console + rotating log file)

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{IndexError, Result};
