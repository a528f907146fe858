//! Per-table sync coordination
//!
//! Tables run one after another in the order given. Each table's batches go
//! through enrich, flatten, map and merge in fetch order. A failing table is
//! recorded with its cause and the run moves on to the next one.

use chrono::{DateTime, Utc};
use hojin_common::types::DateWindow;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::bulk::BulkSource;
use crate::catalog::{BulkSpec, SourceSpec, TableConfig};
use crate::error::{Result, SyncError};
use crate::gbiz::{PageFetcher, PagedSource};
use crate::reconcile::{MergeCounts, MergeTarget, ReconcileSink};
use crate::transform::transform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// At least one row inserted or updated
    Ok,
    /// Completed without changing anything
    Empty,
    Error,
}

/// Outcome of syncing one table
#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    pub table: String,
    pub inserted: u64,
    pub updated: u64,
    pub skipped: u64,
    pub status: SyncStatus,
    pub cause: Option<String>,
    pub duration_ms: u64,
}

impl SyncResult {
    fn from_outcome(table: &str, counts: MergeCounts, outcome: Result<()>, started: Instant) -> Self {
        let (status, cause) = match outcome {
            Ok(()) if counts.changed() == 0 => (SyncStatus::Empty, None),
            Ok(()) => (SyncStatus::Ok, None),
            Err(e) => (SyncStatus::Error, Some(format!("{} ({})", e, e.kind()))),
        };
        Self {
            table: table.to_string(),
            inserted: counts.inserted,
            updated: counts.updated,
            skipped: counts.skipped,
            status,
            cause,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// Results of one run, in table order
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub window: DateWindow,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub results: Vec<SyncResult>,
}

impl SyncReport {
    pub fn failures(&self) -> impl Iterator<Item = &SyncResult> {
        self.results.iter().filter(|r| r.status == SyncStatus::Error)
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    pub fn totals(&self) -> MergeCounts {
        self.results.iter().fold(MergeCounts::default(), |mut acc, r| {
            acc += MergeCounts {
                inserted: r.inserted,
                updated: r.updated,
                skipped: r.skipped,
            };
            acc
        })
    }
}

/// Runs catalog tables against their sources and a reconcile sink
pub struct SyncOrchestrator {
    sink: Arc<dyn ReconcileSink>,
    window: DateWindow,
    pages: Option<Arc<dyn PageFetcher>>,
    bulk: Option<BulkSource>,
}

impl SyncOrchestrator {
    pub fn new(sink: Arc<dyn ReconcileSink>, window: DateWindow) -> Self {
        Self {
            sink,
            window,
            pages: None,
            bulk: None,
        }
    }

    /// Source for paged tables
    pub fn with_pages(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.pages = Some(fetcher);
        self
    }

    /// Source for bulk tables
    pub fn with_bulk(mut self, source: BulkSource) -> Self {
        self.bulk = Some(source);
        self
    }

    pub fn window(&self) -> DateWindow {
        self.window
    }

    /// Sync `tables` in order; never fails as a whole
    pub async fn run(&self, tables: &[&TableConfig]) -> SyncReport {
        let started_at = Utc::now();
        info!(tables = tables.len(), window = %self.window, "Starting sync run");

        let mut results = Vec::with_capacity(tables.len());
        for (index, table) in tables.iter().enumerate() {
            info!(
                table = %table.name,
                source = table.source.kind(),
                "Syncing table {} / {}",
                index + 1,
                tables.len()
            );

            let started = Instant::now();
            let mut counts = MergeCounts::default();
            let outcome = self.sync_table(table, &mut counts).await;
            let result = SyncResult::from_outcome(&table.name, counts, outcome, started);

            match &result.cause {
                Some(cause) => warn!(
                    table = %table.name,
                    inserted = result.inserted,
                    updated = result.updated,
                    cause = %cause,
                    "Table sync failed"
                ),
                None => info!(
                    table = %table.name,
                    inserted = result.inserted,
                    updated = result.updated,
                    skipped = result.skipped,
                    duration_ms = result.duration_ms,
                    "Table synced"
                ),
            }
            results.push(result);
        }

        let report = SyncReport {
            window: self.window,
            started_at,
            finished_at: Utc::now(),
            results,
        };
        let totals = report.totals();
        info!(
            inserted = totals.inserted,
            updated = totals.updated,
            skipped = totals.skipped,
            failed = report.failures().count(),
            "Sync run finished"
        );
        report
    }

    /// Counts land in `counts` as they are committed, so they survive a later failure
    async fn sync_table(&self, table: &TableConfig, counts: &mut MergeCounts) -> Result<()> {
        let target = MergeTarget::for_table(table);
        match &table.source {
            SourceSpec::Paged { endpoint } => self.sync_paged(table, endpoint, &target, counts).await,
            SourceSpec::Bulk(spec) => self.sync_bulk(table, spec, &target, counts).await,
        }
    }

    async fn sync_paged(
        &self,
        table: &TableConfig,
        endpoint: &str,
        target: &MergeTarget,
        counts: &mut MergeCounts,
    ) -> Result<()> {
        let fetcher = self
            .pages
            .clone()
            .ok_or_else(|| SyncError::Config(format!("no page source configured for {}", table.name)))?;

        let mut source = PagedSource::new(fetcher, endpoint, self.window);
        while let Some(records) = source.next_batch().await? {
            let fetched = records.len();
            let batch = transform(records, table);
            debug!(table = %table.name, fetched, rows = batch.len(), "Transformed page");
            if batch.is_empty() {
                continue;
            }
            *counts += self.sink.merge_batch(target, batch).await?;
        }
        debug!(table = %table.name, fetches = source.fetches(), "Endpoint exhausted");
        Ok(())
    }

    async fn sync_bulk(
        &self,
        table: &TableConfig,
        spec: &BulkSpec,
        target: &MergeTarget,
        counts: &mut MergeCounts,
    ) -> Result<()> {
        let source = self
            .bulk
            .as_ref()
            .ok_or_else(|| SyncError::Config(format!("no bulk source configured for {}", table.name)))?;

        let mut reader = source.open(spec).await?;
        let mut load = self.sink.open_load(target).await?;
        let mut dropped = 0;
        loop {
            let (next, records) = reader.read_next().await?;
            reader = next;
            let Some(records) = records else { break };
            dropped += load.stage(transform(records, table)).await?;
        }
        debug!(table = %table.name, rows = reader.rows_read(), dropped, "Bulk payload staged");

        // skipped rows come from the load, so a rolled back load reports none
        *counts += load.finish().await?;
        Ok(())
    }
}
