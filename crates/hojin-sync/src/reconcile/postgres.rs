//! PostgreSQL reconcile writer

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, info};

use super::{drop_unkeyed_rows, sql, LandingLoad, MergeCounts, MergeMode, MergeTarget, ReconcileSink};
use crate::error::{Result, SyncError};
use crate::transform::FlatBatch;

/// Merges batches into PostgreSQL through transaction-local landing tables
#[derive(Clone)]
pub struct PgReconcileWriter {
    db: PgPool,
}

impl PgReconcileWriter {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ReconcileSink for PgReconcileWriter {
    async fn merge_batch(&self, target: &MergeTarget, batch: FlatBatch) -> Result<MergeCounts> {
        let mut load = self.open_load(target).await?;
        load.stage(batch).await?;
        load.finish().await
    }

    async fn open_load(&self, target: &MergeTarget) -> Result<Box<dyn LandingLoad>> {
        let tx = self.db.begin().await?;
        Ok(Box::new(PgLandingLoad {
            tx,
            target: target.clone(),
            columns: None,
            staged: 0,
            skipped: 0,
        }))
    }
}

/// Landing set bound to one open transaction; rolled back if dropped unfinished
struct PgLandingLoad {
    tx: Transaction<'static, Postgres>,
    target: MergeTarget,
    /// Landing columns, fixed by the first non-empty chunk
    columns: Option<Vec<String>>,
    staged: i64,
    skipped: u64,
}

impl PgLandingLoad {
    async fn create_landing(&mut self, columns: &[String]) -> Result<()> {
        let table = &self.target.table;
        sqlx::query(&sql::drop_landing(table)).execute(&mut *self.tx).await?;
        sqlx::query(&sql::create_landing(table, columns))
            .execute(&mut *self.tx)
            .await?;
        sqlx::query(&sql::add_landing_seq(table)).execute(&mut *self.tx).await?;
        debug!(table = %table, columns = columns.len(), "Created landing table");
        Ok(())
    }

    async fn merge(&mut self, columns: &[String]) -> Result<MergeCounts> {
        let target = &self.target;
        let counts = match target.mode {
            MergeMode::MergeChangedFields => {
                let statement = sql::merge_changed_fields(&target.table, columns, &target.primary_key);
                let (inserted, updated): (i64, i64) =
                    sqlx::query_as(&statement).fetch_one(&mut *self.tx).await?;
                MergeCounts {
                    inserted: inserted as u64,
                    updated: updated as u64,
                    skipped: self.skipped,
                }
            },
            MergeMode::AppendIfNew => {
                let version = target
                    .version_column
                    .as_deref()
                    .filter(|v| columns.iter().any(|c| c == v));
                let statement = sql::append_if_new(&target.table, columns, &target.primary_key, version);
                let (inserted,): (i64,) = sqlx::query_as(&statement).fetch_one(&mut *self.tx).await?;
                MergeCounts {
                    inserted: inserted as u64,
                    updated: 0,
                    skipped: self.skipped,
                }
            },
        };
        sqlx::query(&sql::drop_landing(&target.table))
            .execute(&mut *self.tx)
            .await?;
        Ok(counts)
    }
}

#[async_trait]
impl LandingLoad for PgLandingLoad {
    async fn stage(&mut self, mut batch: FlatBatch) -> Result<u64> {
        let dropped = drop_unkeyed_rows(&mut batch, &self.target.primary_key);
        self.skipped += dropped;
        if batch.is_empty() {
            return Ok(dropped);
        }

        if self.columns.is_none() {
            let columns = batch.columns().to_vec();
            self.create_landing(&columns).await?;
            self.columns = Some(columns);
        } else if let Some(extra) = self
            .columns
            .as_ref()
            .and_then(|landing| batch.columns().iter().find(|c| !landing.contains(c)))
        {
            return Err(SyncError::Write(format!(
                "chunk column '{}' is not part of the landing set for {}",
                extra, self.target.table
            )));
        }

        let rows = batch.len() as i64;
        sqlx::query(&sql::insert_landing(&self.target.table, batch.columns()))
            .bind(Json(batch.to_json_rows()))
            .bind(self.staged)
            .execute(&mut *self.tx)
            .await?;
        self.staged += rows;

        debug!(table = %self.target.table, rows, staged = self.staged, "Staged chunk");
        Ok(dropped)
    }

    async fn finish(self: Box<Self>) -> Result<MergeCounts> {
        let mut this = *self;
        let counts = match this.columns.take() {
            Some(columns) => this.merge(&columns).await?,
            None => MergeCounts {
                skipped: this.skipped,
                ..MergeCounts::default()
            },
        };
        let PgLandingLoad { tx, target, staged, .. } = this;
        tx.commit().await?;

        info!(
            table = %target.table,
            staged,
            inserted = counts.inserted,
            updated = counts.updated,
            skipped = counts.skipped,
            "Merged landing set"
        );
        Ok(counts)
    }
}
