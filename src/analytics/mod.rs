//! Time-bucketed histograms with trend, anomaly and top-entity statistics.
//!
//! [`analyze`] turns a selection of dataset rows into a [`HistogramReport`]
//! that serialises straight into chart-ready JSON. Conditions that leave
//! nothing to chart are reported as [`Analysis::Unavailable`], never as
//! errors.

pub mod bucket;
mod histogram;
pub mod stats;

pub use histogram::{
    analyze, Analysis, Bucket, ChartSeries, Fill, GlobalStats, HistogramReport, Layout,
    NoiseInfo, ViewStats, ACTIVITY, ELEVATED, ROUTINE,
};
pub use stats::{TrendWindow, ZeroStddev};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::EngineConfig;
use crate::temporal::ResolverPolicy;

/// Bucketing and statistics settings for one kind of histogram call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistogramConfig {
    /// Bucket count the width menu aims for.
    pub target_buckets: usize,
    /// Views with at most this many timestamped records get one bar per second.
    pub small_view_threshold: usize,
    pub trend: TrendWindow,
    pub zero_stddev: ZeroStddev,
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self {
            target_buckets: 50,
            small_view_threshold: 20,
            trend: TrendWindow::Proportional,
            zero_stddev: ZeroStddev::TreatAsOne,
        }
    }
}

/// Why a histogram could not be produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Unavailable {
    #[error("Time column not found")]
    NoTimeColumn,
    #[error("No valid timestamps found")]
    NoValidTimestamps,
    #[error("No events in this time range")]
    NoEventsInRange,
    #[error("No valid IDs provided")]
    NoValidIds,
    #[error("No matching rows found")]
    NoMatchingRows,
}

/// Everything [`analyze`] needs besides the rows themselves.
#[derive(Debug, Clone)]
pub struct AnalysisProfile {
    pub histogram: HistogramConfig,
    pub resolver: ResolverPolicy,
    pub severity_columns: Vec<String>,
    pub severity_tokens: Vec<String>,
    pub top_entity_columns: Vec<String>,
}

impl AnalysisProfile {
    fn with_histogram(config: &EngineConfig, histogram: &HistogramConfig) -> Self {
        Self {
            histogram: histogram.clone(),
            resolver: config.analysis_resolver.clone(),
            severity_columns: config.severity_columns.clone(),
            severity_tokens: config.severity_tokens.clone(),
            top_entity_columns: config.top_entity_columns.clone(),
        }
    }

    pub fn full_file(config: &EngineConfig) -> Self {
        Self::with_histogram(config, &config.histogram)
    }

    pub fn subset(config: &EngineConfig) -> Self {
        Self::with_histogram(config, &config.subset_histogram)
    }
}
