use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use csv::{ByteRecord, ReaderBuilder, StringRecord};
use flate2::read::GzDecoder;

use super::Dataset;
use crate::cancel::CancelToken;
use crate::error::{Error, Result};

const PROGRESS_EVERY: u64 = 1_000_000;

/// Counters from one pass over a source file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Rows kept in the dataset.
    pub rows: u64,
    /// Rows dropped because they could not be interpreted.
    pub skipped: u64,
}

/// A freshly scanned dataset.
#[derive(Debug, Clone)]
pub struct Scan {
    pub dataset: Dataset,
    pub stats: ScanStats,
}

/// Open a source for reading, decompressing `.gz` files on the fly.
pub fn open_source(path: &Path) -> Result<Box<dyn Read>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::NotFound(path.to_path_buf()));
        }
        Err(err) => return Err(err.into()),
    };
    let reader = BufReader::new(file);
    if path.extension().and_then(|ext| ext.to_str()) == Some("gz") {
        Ok(Box::new(GzDecoder::new(reader)))
    } else {
        Ok(Box::new(reader))
    }
}

/// Read a header-plus-rows text table into memory.
///
/// Malformed rows (wrong width, undecodable) are skipped and counted; I/O
/// failures abort the scan. Invalid UTF-8 is replaced, not rejected.
pub fn scan_file(path: &Path, cancel: &CancelToken) -> Result<Scan> {
    let reader = open_source(path)?;
    let mut csv = ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    let headers = csv.byte_headers()?.clone();
    let columns: Vec<String> = StringRecord::from_byte_record_lossy(headers)
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut dataset = Dataset::new(columns);
    let mut stats = ScanStats::default();
    let mut raw = ByteRecord::new();
    let mut seen: usize = 0;

    loop {
        cancel.checkpoint(seen)?;
        seen += 1;
        match csv.read_byte_record(&mut raw) {
            Ok(false) => break,
            Ok(true) => {
                let record = StringRecord::from_byte_record_lossy(raw.clone());
                if dataset.push(record) {
                    stats.rows += 1;
                    if stats.rows % PROGRESS_EVERY == 0 {
                        log::info!("scanned {} rows from {}", stats.rows, path.display());
                    }
                } else {
                    stats.skipped += 1;
                    log::debug!(
                        "skipping row {} of {}: expected {} cells, found {}",
                        seen,
                        path.display(),
                        dataset.columns().len(),
                        raw.len()
                    );
                }
            }
            Err(err) if err.is_io_error() => return Err(err.into()),
            Err(err) => {
                stats.skipped += 1;
                log::debug!("skipping unreadable row in {}: {err}", path.display());
            }
        }
    }

    if stats.skipped > 0 {
        log::warn!(
            "{}: skipped {} malformed rows ({} kept)",
            path.display(),
            stats.skipped,
            stats.rows
        );
    }

    Ok(Scan { dataset, stats })
}
