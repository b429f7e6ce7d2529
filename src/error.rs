use std::path::PathBuf;

use serde_json::json;
use thiserror::Error;

/// Whole-request failures. Per-row and per-filter problems never reach this
/// type; they are absorbed where they happen and logged.
#[derive(Debug, Error)]
pub enum Error {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("invalid file name: {0:?}")]
    InvalidFileName(String),
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[cfg(feature = "parquet")]
    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
    #[cfg(feature = "parquet")]
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
    #[error("spreadsheet error: {0}")]
    Spreadsheet(String),
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// HTTP-equivalent status for transports that surface these errors.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::NotFound(_) => 404,
            Error::InvalidFileName(_) | Error::UnsupportedFormat(_) => 400,
            Error::Cancelled => 499,
            _ => 500,
        }
    }

    /// Structured error payload, `{ "error": "<message>" }`.
    pub fn to_payload(&self) -> serde_json::Value {
        json!({ "error": self.to_string() })
    }
}

#[cfg(feature = "xlsx")]
impl From<rust_xlsxwriter::XlsxError> for Error {
    fn from(value: rust_xlsxwriter::XlsxError) -> Self {
        Error::Spreadsheet(value.to_string())
    }
}

#[cfg(feature = "xlsx")]
impl From<calamine::Error> for Error {
    fn from(value: calamine::Error) -> Self {
        Error::Spreadsheet(value.to_string())
    }
}

impl From<tempfile::PersistError> for Error {
    fn from(value: tempfile::PersistError) -> Self {
        Error::Io(value.error)
    }
}

impl From<tempfile::PathPersistError> for Error {
    fn from(value: tempfile::PathPersistError) -> Self {
        Error::Io(value.error)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
