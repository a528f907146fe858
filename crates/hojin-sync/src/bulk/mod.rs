//! Bulk archive source
//!
//! A bulk table is loaded from one zip archive holding one CSV payload. The
//! archive is downloaded into a private temporary directory, the payload is
//! extracted next to it, and rows are handed out in bounded chunks by a
//! [`BulkChunkReader`] that owns (and finally removes) that directory.

pub mod archive;
pub mod download;
pub mod reader;

pub use download::{extract_hidden_value, ArchiveFetcher, HttpArchiveFetcher};
pub use reader::BulkChunkReader;

use encoding_rs::Encoding;
use std::sync::Arc;
use tracing::info;

use crate::catalog::BulkSpec;
use crate::error::{Result, SyncError};

const ARCHIVE_FILE: &str = "archive.zip";

/// Opens bulk archives as chunked readers
pub struct BulkSource {
    fetcher: Arc<dyn ArchiveFetcher>,
    chunk_rows: usize,
}

impl BulkSource {
    pub fn new(fetcher: Arc<dyn ArchiveFetcher>, chunk_rows: usize) -> Self {
        Self {
            fetcher,
            chunk_rows,
        }
    }

    /// Download, extract and open the payload described by `spec`.
    ///
    /// Temporary files are removed on every failure path here, and by the
    /// returned reader's drop otherwise.
    pub async fn open(&self, spec: &BulkSpec) -> Result<BulkChunkReader> {
        let encoding = Encoding::for_label(spec.encoding.as_bytes())
            .ok_or_else(|| SyncError::Config(format!("unknown encoding '{}'", spec.encoding)))?;

        let workdir = tempfile::Builder::new().prefix("hojin-bulk-").tempdir()?;
        let archive_path = workdir.path().join(ARCHIVE_FILE);

        let bytes = self.fetcher.fetch_archive(&spec.request, &archive_path).await?;

        let suffix = spec.entry_suffix.clone();
        let dir = workdir.path().to_path_buf();
        let payload = tokio::task::spawn_blocking(move || -> Result<_> {
            let payload = archive::extract_entry(&archive_path, &suffix, &dir)?;
            std::fs::remove_file(&archive_path)?;
            Ok(payload)
        })
        .await
        .map_err(|e| SyncError::Io(std::io::Error::other(e)))??;

        info!(
            archive_bytes = bytes,
            chunk_rows = self.chunk_rows,
            headerless = spec.columns.is_some(),
            "Opened bulk archive"
        );

        BulkChunkReader::open(
            &payload,
            encoding,
            spec.columns.clone(),
            self.chunk_rows,
            Some(workdir),
        )
    }
}
