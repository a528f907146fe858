//! Hojin Sync Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Incremental synchronization of Japanese corporate registries into
//! PostgreSQL.
//!
//! # Sources
//!
//! - **gBizINFO**: paginated update API, one endpoint per dataset
//! - **NTA corporate number registry**: full national archive, zipped CSV
//!
//! Every table is described by the [`catalog`]. Raw records go through
//! [`transform`] (enrich, flatten, map) and are merged by a
//! [`reconcile::ReconcileSink`]; the [`orchestrator`] drives one table after
//! another and reports per-table outcomes.
//!
//! # Example
//!
//! ```no_run
//! use hojin_sync::catalog::Catalog;
//! use hojin_sync::config::SyncConfig;
//! use hojin_sync::gbiz::GbizClient;
//! use hojin_sync::orchestrator::SyncOrchestrator;
//! use hojin_sync::reconcile::PgReconcileWriter;
//! use hojin_common::types::DateWindow;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SyncConfig::from_env()?;
//!     let catalog = Catalog::builtin()?;
//!     let pool = sqlx::PgPool::connect(&config.database.url).await?;
//!     let window: DateWindow = "20250901..20251001".parse()?;
//!
//!     let report = SyncOrchestrator::new(Arc::new(PgReconcileWriter::new(pool)), window)
//!         .with_pages(Arc::new(GbizClient::new(&config.gbiz)?))
//!         .run(&catalog.select(&["award_information_gbizinfo".to_string()])?)
//!         .await;
//!     println!("{}", serde_json::to_string_pretty(&report)?);
//!     Ok(())
//! }
//! ```

pub mod bulk;
pub mod catalog;
pub mod config;
pub mod error;
pub mod gbiz;
pub mod orchestrator;
pub mod reconcile;
pub mod transform;

pub use catalog::{Catalog, TableConfig};
pub use error::{Result, SyncError};
pub use orchestrator::{SyncOrchestrator, SyncReport, SyncResult, SyncStatus};
