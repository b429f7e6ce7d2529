//! Conversion of generic report uploads into the flat CSV the engine reads.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde_json::{Map, Value};
use tempfile::Builder;

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::ingest::{FileCategory, RecordCount, UploadOutcome};

/// Extensions treated as ready-made reports rather than forensic artifacts.
pub const REPORT_EXTENSIONS: &[&str] = &["csv", "xlsx", "tsv", "json", "parquet", "sqlite"];

pub fn is_report_extension(ext: &str) -> bool {
    REPORT_EXTENSIONS.iter().any(|e| e.eq_ignore_ascii_case(ext))
}

pub(crate) fn extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Convert an uploaded report into `Report_<unique>.csv` inside `data_dir`.
pub fn convert_upload(source: &Path, data_dir: &Path, cancel: &CancelToken) -> Result<UploadOutcome> {
    if !source.is_file() {
        return Err(Error::NotFound(source.to_path_buf()));
    }
    let ext = extension(source);
    fs::create_dir_all(data_dir)?;
    let mut temp = Builder::new()
        .prefix("Report_")
        .suffix(".csv")
        .tempfile_in(data_dir)?;

    let processed = match ext.as_str() {
        "csv" => {
            let mut input = File::open(source)?;
            std::io::copy(&mut input, temp.as_file_mut())?;
            RecordCount::Unknown
        }
        "tsv" => RecordCount::Known(tsv_to_csv(source, temp.as_file_mut(), cancel)?),
        "json" => RecordCount::Known(json_to_csv(source, temp.as_file_mut(), cancel)?),
        #[cfg(feature = "parquet")]
        "parquet" => RecordCount::Known(crate::ingest::parquet::parquet_to_csv(
            source,
            temp.as_file_mut(),
            cancel,
        )?),
        #[cfg(feature = "xlsx")]
        "xlsx" => RecordCount::Known(crate::ingest::workbook::workbook_to_csv(
            source,
            temp.as_file_mut(),
            cancel,
        )?),
        other => return Err(Error::UnsupportedFormat(other.to_string())),
    };

    let (_, path) = temp.keep()?;
    let csv_filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    log::info!("converted {} upload {} -> {csv_filename}", ext, source.display());
    Ok(UploadOutcome {
        status: "success",
        processed_records: processed,
        data_url: format!("/api/data/{csv_filename}"),
        csv_filename,
        xlsx_filename: None,
        file_category: FileCategory::Generic,
    })
}

fn tsv_to_csv(source: &Path, out: &mut File, cancel: &CancelToken) -> Result<u64> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_reader(BufReader::new(File::open(source)?));
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(BufWriter::new(out));
    let mut record = csv::ByteRecord::new();
    let mut lines: u64 = 0;
    while reader.read_byte_record(&mut record)? {
        cancel.checkpoint(lines as usize)?;
        writer.write_byte_record(&record)?;
        lines += 1;
    }
    writer.flush()?;
    Ok(lines.saturating_sub(1))
}

/// Flatten a JSON array of objects, or newline-delimited objects, into CSV.
/// Columns appear in first-seen order; nested values are written as JSON.
fn json_to_csv(source: &Path, out: &mut File, cancel: &CancelToken) -> Result<u64> {
    let text = fs::read_to_string(source)?;
    let records = parse_json_records(&text)?;

    let mut columns: Vec<String> = Vec::new();
    for record in &records {
        for key in record.keys() {
            if !columns.iter().any(|c| c == key) {
                columns.push(key.clone());
            }
        }
    }

    let mut writer = csv::Writer::from_writer(BufWriter::new(out));
    writer.write_record(&columns)?;
    for (n, record) in records.iter().enumerate() {
        cancel.checkpoint(n)?;
        writer.write_record(columns.iter().map(|c| json_cell(record.get(c))))?;
    }
    writer.flush()?;
    Ok(records.len() as u64)
}

fn parse_json_records(text: &str) -> Result<Vec<Map<String, Value>>> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('[') {
        let values: Vec<Value> = serde_json::from_str(trimmed)?;
        return Ok(values.into_iter().filter_map(into_object).collect());
    }
    let mut records = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(value) => records.extend(into_object(value)),
            Err(err) => log::debug!("skipping malformed json line {}: {err}", idx + 1),
        }
    }
    Ok(records)
}

fn into_object(value: Value) -> Option<Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn json_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
