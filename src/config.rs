//! Engine configuration.
//!
//! Every tunable the request surfaces rely on lives here so a deployment can
//! persist it as JSON next to its data directory.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::analytics::{HistogramConfig, TrendWindow, ZeroStddev};
use crate::error::Result;
use crate::temporal::ResolverPolicy;

/// Byte budget for one part of a split export.
pub const DEFAULT_SPLIT_CHUNK_BYTES: u64 = 95 * 1024 * 1024;

/// Configuration for a [`TimelineService`](crate::service::TimelineService).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding flat-table files and export artifacts.
    pub data_dir: PathBuf,

    /// Directory raw uploads are staged in before conversion.
    pub upload_dir: PathBuf,

    /// Page size used when a request does not name one.
    /// Default: 50
    pub default_page_size: i64,

    /// Histogram settings for full-file chart requests.
    pub histogram: HistogramConfig,

    /// Histogram settings for subset (selected ids) chart requests.
    pub subset_histogram: HistogramConfig,

    /// Time column policy used before sequencing and table time filters.
    pub sequence_resolver: ResolverPolicy,

    /// Time column policy used by the histogram analyzer.
    pub analysis_resolver: ResolverPolicy,

    /// Time column policy used by export time filters.
    pub export_resolver: ResolverPolicy,

    /// Byte budget of one split-export part.
    /// Default: 95 MiB
    pub split_chunk_bytes: u64,

    /// Number of datasets the analytics cache keeps loaded.
    /// Default: 4
    pub cache_capacity: usize,

    /// Column names (matched case-insensitively) carrying a severity level.
    pub severity_columns: Vec<String>,

    /// Severity values counted as elevated activity.
    pub severity_tokens: Vec<String>,

    /// Columns whose most frequent value is reported as the top entity.
    pub top_entity_columns: Vec<String>,

    /// Columns removed from every export.
    pub redundant_export_columns: Vec<String>,

    /// Columns truncated to whole seconds in exports.
    pub timestamp_display_columns: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("output"),
            upload_dir: PathBuf::from("uploads"),
            default_page_size: 50,
            histogram: HistogramConfig {
                target_buckets: 50,
                small_view_threshold: 20,
                trend: TrendWindow::Proportional,
                zero_stddev: ZeroStddev::TreatAsOne,
            },
            subset_histogram: HistogramConfig {
                target_buckets: 30,
                small_view_threshold: 20,
                trend: TrendWindow::Fixed(5),
                zero_stddev: ZeroStddev::FlagNone,
            },
            sequence_resolver: ResolverPolicy::sequencing(),
            analysis_resolver: ResolverPolicy::analysis(),
            export_resolver: ResolverPolicy::analysis(),
            split_chunk_bytes: DEFAULT_SPLIT_CHUNK_BYTES,
            cache_capacity: 4,
            severity_columns: strings(&[
                "level",
                "severity",
                "level_name",
                "levelname",
                "log_level",
                "priority",
            ]),
            severity_tokens: strings(&["1", "2", "3", "critical", "error", "warning"]),
            top_entity_columns: strings(&["EventID", "event_id", "eventid"]),
            redundant_export_columns: strings(&["line", "linenumber", "original_id"]),
            timestamp_display_columns: strings(&["Timestamp"]),
        }
    }
}

impl EngineConfig {
    /// Read a JSON configuration file; absent fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = fs::read(path.as_ref())?;
        Ok(serde_json::from_slice(&data)?)
    }

    pub fn store(&self, path: impl AsRef<Path>) -> Result<()> {
        let data = serde_json::to_vec_pretty(self)?;
        fs::write(path.as_ref(), data)?;
        Ok(())
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.upload_dir = dir.into();
        self
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}
