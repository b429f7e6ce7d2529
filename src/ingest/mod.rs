//! Turning uploads into flat timeline files.
//!
//! Generic reports (CSV, TSV, JSON, Parquet, Excel) are converted directly; forensic
//! artifacts go through an [`ArtifactParser`] registered for their type tag.

mod artifact;
mod convert;
#[cfg(feature = "parquet")]
mod parquet;
#[cfg(feature = "xlsx")]
mod workbook;

pub use artifact::{ArtifactOutcome, ArtifactParser, ArtifactRegistry};
pub use convert::{convert_upload, is_report_extension, REPORT_EXTENSIONS};
pub(crate) use convert::extension;

use serde::{Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Generic,
    Forensic,
}

/// Record count of a conversion; plain copies are not counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordCount {
    Known(u64),
    Unknown,
}

impl Serialize for RecordCount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RecordCount::Known(n) => serializer.serialize_u64(*n),
            RecordCount::Unknown => serializer.serialize_str("N/A"),
        }
    }
}

/// Upload response payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadOutcome {
    pub status: &'static str,
    pub processed_records: RecordCount,
    pub data_url: String,
    pub csv_filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xlsx_filename: Option<String>,
    pub file_category: FileCategory,
}
