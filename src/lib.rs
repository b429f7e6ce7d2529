//! Paginated, filtered and time-bucketed views over large tabular event logs.
//!
//! A source file is scanned into a [`Dataset`], put into timeline order by
//! the [`sequence`](sequence::sequence) pass, and then queried, charted or
//! exported. [`TimelineService`] wires these pieces into request surfaces.

pub mod analytics;
pub mod cache;
pub mod cancel;
pub mod config;
pub mod dataset;
pub mod error;
pub mod export;
pub mod ingest;
pub mod query;
pub mod sequence;
pub mod service;
pub mod temporal;

pub use analytics::{analyze, Analysis, AnalysisProfile, HistogramReport, Unavailable};
pub use cache::DatasetCache;
pub use cancel::CancelToken;
pub use config::EngineConfig;
pub use dataset::{scan_file, Dataset};
pub use error::{Error, Result};
pub use export::{Artifact, ExportFormat, ExportLayout, ExportOptions};
pub use ingest::{ArtifactParser, ArtifactRegistry, UploadOutcome};
pub use query::{Query, SortSpec, TablePage, TimeRange, View};
pub use sequence::{Sequenced, ID_COLUMN};
pub use service::{ExportRequest, HistogramOptions, TableRequest, TimelineService};
pub use temporal::{normalize, Instant, ResolverPolicy};
