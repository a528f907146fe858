//! Payload extraction from a downloaded zip archive

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::ZipArchive;

use crate::error::{Result, SyncError};

/// File name the extracted payload is written under, independent of the entry name
const PAYLOAD_FILE: &str = "payload.csv";

/// Extract the one entry whose name ends with `suffix` (case-insensitive) into `dir`.
///
/// Fails with a fetch error when no entry, or more than one, matches.
pub fn extract_entry(archive_path: &Path, suffix: &str, dir: &Path) -> Result<PathBuf> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(BufReader::new(file))?;
    let suffix = suffix.to_ascii_lowercase();

    let mut matching = Vec::new();
    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        if !entry.is_dir() && entry.name().to_ascii_lowercase().ends_with(&suffix) {
            matching.push((i, entry.name().to_string()));
        }
    }

    let (index, name) = match matching.as_slice() {
        [] => {
            return Err(SyncError::Fetch(format!(
                "archive contains no entry ending with '{}'",
                suffix
            )))
        },
        [only] => only.clone(),
        many => {
            return Err(SyncError::Fetch(format!(
                "archive contains {} entries ending with '{}'",
                many.len(),
                suffix
            )))
        },
    };

    let mut entry = archive.by_index(index)?;
    let target = dir.join(PAYLOAD_FILE);
    let mut out = File::create(&target)?;
    let bytes = std::io::copy(&mut entry, &mut out)?;
    debug!(entry = %name, bytes, "Extracted archive payload");

    Ok(target)
}
