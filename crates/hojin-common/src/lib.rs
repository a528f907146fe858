//! Hojin Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging setup and error handling for the hojin-sync workspace.
//!
//! - **Logging**: `tracing` subscriber configuration (console, rolling file, JSON)
//! - **Types**: the inclusive calendar [`DateWindow`](types::DateWindow) used by
//!   every incremental sync
//!
//! # Example
//!
//! ```no_run
//! use hojin_common::logging::{init_logging, LogConfig};
//! use hojin_common::types::DateWindow;
//!
//! fn main() -> anyhow::Result<()> {
//!     init_logging(&LogConfig::from_env()?)?;
//!     let window: DateWindow = "20250901..20251001".parse()?;
//!     tracing::info!(from = %window.from_param(), to = %window.to_param(), "Window ready");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

pub use error::{CommonError, Result};
