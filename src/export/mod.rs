//! Export of filtered views as CSV, spreadsheet, or size-split zip archives.
//!
//! Artifacts are written to a uniquely named temporary file inside the data
//! directory and only persisted once complete; an error or cancellation
//! removes the partial file.

mod layout;
pub mod split;
#[cfg(feature = "xlsx")]
mod spreadsheet;

pub use layout::{ExportLayout, OutputColumn, ROW_NUMBER_HEADER};
pub use split::{ChunkSink, MemoryChunkSink, SplitSummary, Splitter, ZipChunkSink};

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tempfile::Builder;

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::query::View;
use crate::sequence::Sequenced;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Xlsx,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "csv" => Ok(ExportFormat::Csv),
            "xlsx" => Ok(ExportFormat::Xlsx),
            other => Err(Error::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Shaping applied on top of the row selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportOptions {
    pub format: ExportFormat,
    /// Remove columns that are empty or whitespace in every exported row.
    pub drop_empty_columns: bool,
    /// When non-empty, only these output columns are written.
    pub visible_columns: Vec<String>,
}

/// A finished artifact in the data directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub path: PathBuf,
    pub file_name: String,
    pub rows: u64,
    /// Number of parts, for split archives.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parts: Option<usize>,
}

impl Artifact {
    fn new(path: PathBuf, rows: u64, parts: Option<usize>) -> Self {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path,
            file_name,
            rows,
            parts,
        }
    }
}

/// Encodes one CSV record at a time into a reusable buffer.
#[derive(Debug, Default)]
pub struct RowEncoder {
    buf: Vec<u8>,
}

impl RowEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes of `fields` as one CSV line, including the terminator.
    pub fn encode<I, T>(&mut self, fields: I) -> Result<&[u8]>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let mut buf = std::mem::take(&mut self.buf);
        buf.clear();
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .buffer_capacity(256)
            .from_writer(buf);
        writer.write_record(fields)?;
        self.buf = writer.into_inner().map_err(|err| err.into_error())?;
        Ok(&self.buf)
    }
}

/// Write `view` as CSV. Returns the number of data rows written.
pub fn write_csv<W: Write>(
    out: W,
    seq: &Sequenced,
    view: &View,
    layout: &ExportLayout,
    cancel: &CancelToken,
) -> Result<u64> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(layout.header())?;
    let mut rows = 0;
    for (n, &row) in view.rows().iter().enumerate() {
        cancel.checkpoint(n)?;
        writer.write_record(layout.values(seq, row))?;
        rows += 1;
    }
    writer.flush()?;
    Ok(rows)
}

/// Write `view` as a single CSV or spreadsheet artifact in `dir`.
pub fn export_file(
    dir: &Path,
    seq: &Sequenced,
    view: &View,
    layout: &ExportLayout,
    format: ExportFormat,
    cancel: &CancelToken,
) -> Result<Artifact> {
    fs::create_dir_all(dir)?;
    let suffix = format!(".{}", format.extension());
    let mut temp = Builder::new()
        .prefix("Chronos_Export_")
        .suffix(&suffix)
        .tempfile_in(dir)?;

    let rows = match format {
        ExportFormat::Csv => {
            let mut out = BufWriter::new(temp.as_file_mut());
            let rows = write_csv(&mut out, seq, view, layout, cancel)?;
            out.flush()?;
            rows
        }
        #[cfg(feature = "xlsx")]
        ExportFormat::Xlsx => {
            let bytes = spreadsheet::render(seq, view, layout, cancel)?;
            temp.as_file_mut().write_all(&bytes)?;
            view.len() as u64
        }
        #[cfg(not(feature = "xlsx"))]
        ExportFormat::Xlsx => {
            return Err(Error::UnsupportedFormat("xlsx".to_string()));
        }
    };

    let (_, path) = temp.keep()?;
    log::info!("exported {rows} rows to {}", path.display());
    Ok(Artifact::new(path, rows, None))
}

/// Write `view` as a zip of CSV parts of at most `budget` bytes each.
pub fn export_split(
    dir: &Path,
    seq: &Sequenced,
    view: &View,
    layout: &ExportLayout,
    budget: u64,
    cancel: &CancelToken,
) -> Result<Artifact> {
    fs::create_dir_all(dir)?;
    let temp = Builder::new()
        .prefix("Chronos_Split_")
        .suffix(".zip")
        .tempfile_in(dir)?;
    let (file, temp_path) = temp.into_parts();

    let mut encoder = RowEncoder::new();
    let header = encoder.encode(layout.header())?.to_vec();
    let mut splitter = Splitter::new(ZipChunkSink::new(BufWriter::new(file)), budget, header);
    for (n, &row) in view.rows().iter().enumerate() {
        cancel.checkpoint(n)?;
        let bytes = encoder.encode(layout.values(seq, row))?;
        splitter.push_row(bytes)?;
    }
    let (sink, summary) = splitter.finish()?;
    let mut out = sink.into_inner()?;
    out.flush()?;
    drop(out);

    let path = temp_path.keep()?;
    log::info!(
        "split {} rows into {} parts at {}",
        summary.rows,
        summary.parts,
        path.display()
    );
    Ok(Artifact::new(path, summary.rows, Some(summary.parts)))
}
