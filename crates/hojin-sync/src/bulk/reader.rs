//! Bounded chunk reader over a legacy-encoded CSV payload

use encoding_rs::Encoding;
use serde_json::{Map, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::{Result, SyncError};

/// Streams a CSV payload as raw records, at most `chunk_rows` at a time.
///
/// Only the current chunk is held in memory. The reader owns the temporary
/// directory holding the payload, so the extracted files are removed when it
/// is dropped, whether or not the load succeeded.
#[derive(Debug)]
pub struct BulkChunkReader {
    reader: csv::Reader<BufReader<File>>,
    columns: Vec<String>,
    encoding: &'static Encoding,
    chunk_rows: usize,
    record: csv::ByteRecord,
    rows_read: u64,
    malformed_fields: u64,
    // Declared last so the file handle above is closed before the directory goes
    _workdir: Option<TempDir>,
}

impl BulkChunkReader {
    /// Open `path`. With `declared` columns the payload is headerless;
    /// otherwise its first row names the columns.
    pub fn open(
        path: &Path,
        encoding: &'static Encoding,
        declared: Option<Vec<String>>,
        chunk_rows: usize,
        workdir: Option<TempDir>,
    ) -> Result<Self> {
        if chunk_rows == 0 {
            return Err(SyncError::Config("chunk_rows must be greater than 0".to_string()));
        }

        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(BufReader::new(File::open(path)?));

        let mut this = Self {
            reader,
            columns: Vec::new(),
            encoding,
            chunk_rows,
            record: csv::ByteRecord::new(),
            rows_read: 0,
            malformed_fields: 0,
            _workdir: workdir,
        };

        this.columns = match declared {
            Some(columns) => columns,
            None => this.read_header()?,
        };
        debug!(columns = this.columns.len(), encoding = encoding.name(), "Opened bulk payload");
        Ok(this)
    }

    fn read_header(&mut self) -> Result<Vec<String>> {
        if !self.reader.read_byte_record(&mut self.record)? {
            return Ok(Vec::new());
        }
        let header = self.record.clone();
        Ok(header
            .iter()
            .enumerate()
            .map(|(i, field)| {
                let name = self.decode(field);
                // a BOM, if any, sticks to the first header cell
                let name = if i == 0 { name.trim_start_matches('\u{feff}').to_string() } else { name };
                name.trim().to_string()
            })
            .collect())
    }

    fn decode(&mut self, bytes: &[u8]) -> String {
        let (text, had_errors) = self.encoding.decode_without_bom_handling(bytes);
        if had_errors {
            self.malformed_fields += 1;
        }
        text.into_owned()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Next chunk of records keyed by column; empty fields become null.
    ///
    /// Returns `None` once the payload is exhausted.
    pub fn next_chunk(&mut self) -> Result<Option<Vec<Value>>> {
        let mut chunk = Vec::with_capacity(self.chunk_rows.min(4096));

        while chunk.len() < self.chunk_rows {
            if !self.reader.read_byte_record(&mut self.record)? {
                break;
            }
            let record = std::mem::take(&mut self.record);
            let mut row = Map::with_capacity(self.columns.len());
            for (i, column) in self.columns.iter().enumerate() {
                let value = match record.get(i) {
                    None | Some(b"") => Value::Null,
                    Some(bytes) => {
                        let (text, had_errors) = self.encoding.decode_without_bom_handling(bytes);
                        if had_errors {
                            self.malformed_fields += 1;
                        }
                        Value::String(text.into_owned())
                    },
                };
                row.insert(column.clone(), value);
            }
            self.record = record;
            chunk.push(Value::Object(row));
        }

        if chunk.is_empty() {
            if self.malformed_fields > 0 {
                warn!(
                    fields = self.malformed_fields,
                    encoding = self.encoding.name(),
                    "Fields contained bytes invalid in the declared encoding"
                );
            }
            return Ok(None);
        }
        self.rows_read += chunk.len() as u64;
        Ok(Some(chunk))
    }

    /// [`next_chunk`](Self::next_chunk) on the blocking pool. The reader moves
    /// into the task and comes back with the chunk.
    pub async fn read_next(mut self) -> Result<(Self, Option<Vec<Value>>)> {
        let (reader, chunk) = tokio::task::spawn_blocking(move || {
            let chunk = self.next_chunk();
            (self, chunk)
        })
        .await
        .map_err(|e| SyncError::Io(std::io::Error::other(e)))?;
        Ok((reader, chunk?))
    }

    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    pub fn malformed_fields(&self) -> u64 {
        self.malformed_fields
    }
}
