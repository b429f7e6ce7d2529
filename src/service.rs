//! Request surfaces over the engine.
//!
//! [`TimelineService`] binds a configuration, the analytics cache and the
//! artifact registry, and exposes one method per request kind. Table and
//! export requests re-scan the source file every time; histogram requests
//! go through the cache.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::analytics::{analyze, Analysis, AnalysisProfile, Unavailable};
use crate::cache::DatasetCache;
use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::dataset::scan_file;
use crate::error::{Error, Result};
use crate::export::{self, Artifact, ExportFormat, ExportLayout, ExportOptions};
use crate::ingest::{
    self, extension, is_report_extension, ArtifactRegistry, FileCategory, RecordCount,
    UploadOutcome,
};
use crate::query::{
    ColumnFilters, FilterClause, FilterOp, Query, SortSpec, TablePage, TimeRange, View,
};
use crate::sequence::{sequence, Sequenced};

/// Prefix of the interpretation line of subset histograms.
pub const SUBSET_PREFIX: &str = "Filtered View: ";

/// Table request: paging, search, time bounds, column filters and sort.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TableRequest {
    pub page: Option<i64>,
    pub size: Option<i64>,
    pub query: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    /// JSON object of column name to substring term, as sent by the grid.
    pub col_filters: Option<String>,
    pub sort_col: Option<String>,
    pub sort_dir: Option<String>,
}

/// Options of a full-file histogram.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HistogramOptions {
    /// Top-entity value to leave out of the chart.
    pub exclude: Option<String>,
    pub query: Option<String>,
    pub col_filters: Option<String>,
    /// Chart zoom window.
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExportRequest {
    pub filename: String,
    /// Structured `{ field, type, value }` clauses.
    pub filters: Vec<Value>,
    pub selected_ids: Vec<Value>,
    pub format: ExportFormat,
    pub query: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub drop_empty_columns: bool,
    pub visible_columns: Vec<String>,
}

/// Entry point for every request kind.
#[derive(Debug)]
pub struct TimelineService {
    config: EngineConfig,
    cache: DatasetCache,
    registry: ArtifactRegistry,
}

impl TimelineService {
    pub fn new(config: EngineConfig) -> Self {
        let cache = DatasetCache::new(config.cache_capacity);
        Self {
            config,
            cache,
            registry: ArtifactRegistry::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &DatasetCache {
        &self.cache
    }

    pub fn registry_mut(&mut self) -> &mut ArtifactRegistry {
        &mut self.registry
    }

    /// Path of `filename` inside the data directory, after rejecting names
    /// that could escape it.
    pub fn data_path(&self, filename: &str) -> Result<PathBuf> {
        validate_file_name(filename)?;
        Ok(self.config.data_dir.join(filename))
    }

    /// Scan and sequence a file without going through the cache.
    pub fn load_sequenced(&self, path: &Path, cancel: &CancelToken) -> Result<Sequenced> {
        let scan = scan_file(path, cancel)?;
        if scan.stats.skipped > 0 {
            log::warn!(
                "{}: skipped {} malformed rows",
                path.display(),
                scan.stats.skipped
            );
        }
        sequence(scan.dataset, &self.config.sequence_resolver, cancel)
    }

    fn cached(&self, path: &Path, cancel: &CancelToken) -> Result<Arc<Sequenced>> {
        self.cache
            .get_or_load(path, |path| self.load_sequenced(path, cancel))
    }

    /// One page of the filtered, sorted table.
    pub fn query_table(
        &self,
        filename: &str,
        request: &TableRequest,
        cancel: &CancelToken,
    ) -> Result<TablePage> {
        let path = self.data_path(filename)?;
        let seq = self.load_sequenced(&path, cancel)?;

        let mut query = Query::new()
            .time_range(TimeRange::parse(
                request.start.as_deref(),
                request.end.as_deref(),
            ))
            .column_filters(parse_column_filters(request.col_filters.as_deref()));
        if let Some(term) = &request.query {
            query = query.search(term);
        }
        if let Some(column) = request.sort_col.as_deref().filter(|c| !c.is_empty()) {
            query = query.sort(SortSpec::from_dir(
                column,
                request.sort_dir.as_deref().unwrap_or("asc"),
            ));
        }

        let view = query.evaluate(&seq, cancel)?;
        let page = request.page.unwrap_or(1);
        let size = request.size.unwrap_or(self.config.default_page_size);
        Ok(TablePage::build(&seq, &view, page, size))
    }

    /// Histogram of the whole file, optionally filtered and zoomed.
    ///
    /// When a filter or zoom narrows the chart, the reference statistics are
    /// taken from an unfiltered pass over the same file.
    pub fn histogram(
        &self,
        filename: &str,
        options: &HistogramOptions,
        cancel: &CancelToken,
    ) -> Result<Analysis> {
        let path = self.data_path(filename)?;
        let seq = self.cached(&path, cancel)?;
        let profile = AnalysisProfile::full_file(&self.config);

        let mut query = Query::new().column_filters(parse_column_filters(
            options.col_filters.as_deref(),
        ));
        if let Some(term) = &options.query {
            query = query.search(term);
        }
        if let Some(value) = options.exclude.as_deref().filter(|v| !v.is_empty()) {
            match top_entity_column(&seq, &profile) {
                Some(column) => query = query.clause(FilterClause::new(column, FilterOp::Ne, value)),
                None => log::debug!("no top entity column; ignoring exclude {value:?}"),
            }
        }
        let zoom = TimeRange::parse(options.start.as_deref(), options.end.as_deref());

        let narrowed = query.is_filtering() || zoom.is_active();
        let rows = if query.is_filtering() {
            query.evaluate(&seq, cancel)?.rows().to_vec()
        } else {
            (0..seq.len()).collect()
        };
        let mut analysis = analyze(seq.dataset(), &rows, &profile, zoom, cancel)?;

        if narrowed {
            if let Analysis::Ready(report) = &mut analysis {
                let all: Vec<usize> = (0..seq.len()).collect();
                let full = analyze(seq.dataset(), &all, &profile, TimeRange::default(), cancel)?;
                if let Some(global) = full.report() {
                    report.overlay_global(&global.global_stats);
                }
            }
        }
        Ok(analysis)
    }

    /// Histogram of the rows with the given sequence ids, with reference
    /// statistics from the full file.
    ///
    /// Ids may be integers, integral floats or numeric strings; anything
    /// else is dropped.
    pub fn histogram_subset(
        &self,
        filename: &str,
        ids: &[Value],
        cancel: &CancelToken,
    ) -> Result<Analysis> {
        let path = self.data_path(filename)?;
        let ids = parse_ids(ids);
        if ids.is_empty() {
            return Ok(Analysis::unavailable(Unavailable::NoValidIds));
        }

        let seq = self.cached(&path, cancel)?;
        let rows = seq.rows_for_ids(&ids);
        if rows.is_empty() {
            return Ok(Analysis::unavailable(Unavailable::NoMatchingRows));
        }

        let subset = AnalysisProfile::subset(&self.config);
        let mut analysis = analyze(seq.dataset(), &rows, &subset, TimeRange::default(), cancel)?;
        if let Analysis::Ready(report) = &mut analysis {
            let all: Vec<usize> = (0..seq.len()).collect();
            let full_profile = AnalysisProfile::full_file(&self.config);
            let full = analyze(seq.dataset(), &all, &full_profile, TimeRange::default(), cancel)?;
            if let Some(global) = full.report() {
                report.overlay_global(&global.global_stats);
            }
            report.interpretation_prefix = SUBSET_PREFIX;
        }
        Ok(analysis)
    }

    /// Filtered view as a single CSV or spreadsheet artifact.
    pub fn export(&self, request: &ExportRequest, cancel: &CancelToken) -> Result<Artifact> {
        let (seq, view) = self.export_view(request, cancel)?;
        let layout = ExportLayout::plan(&seq, &view, &self.config, &export_options(request));
        export::export_file(
            &self.config.data_dir,
            &seq,
            &view,
            &layout,
            request.format,
            cancel,
        )
    }

    /// Filtered view as a zip of size-bounded CSV parts.
    pub fn export_split(&self, request: &ExportRequest, cancel: &CancelToken) -> Result<Artifact> {
        let (seq, view) = self.export_view(request, cancel)?;
        let mut options = export_options(request);
        options.format = ExportFormat::Csv;
        let layout = ExportLayout::plan(&seq, &view, &self.config, &options);
        export::export_split(
            &self.config.data_dir,
            &seq,
            &view,
            &layout,
            self.config.split_chunk_bytes,
            cancel,
        )
    }

    fn export_view(
        &self,
        request: &ExportRequest,
        cancel: &CancelToken,
    ) -> Result<(Sequenced, View)> {
        let path = self.data_path(&request.filename)?;
        let seq = self.load_sequenced(&path, cancel)?;

        let clauses = request
            .filters
            .iter()
            .filter_map(|raw| match FilterClause::from_json(raw) {
                Ok(clause) => Some(clause),
                Err(err) => {
                    log::warn!("skipping export filter {raw}: {err}");
                    None
                }
            });
        let mut query = Query::new()
            .clauses(clauses)
            .time_range(TimeRange::parse(
                request.start_time.as_deref(),
                request.end_time.as_deref(),
            ))
            .time_policy(self.config.export_resolver.clone());
        if let Some(term) = &request.query {
            query = query.search(term);
        }
        if !request.selected_ids.is_empty() {
            query = query.ids(parse_ids(&request.selected_ids));
        }

        let view = query.evaluate(&seq, cancel)?;
        Ok((seq, view))
    }

    /// Save an upload body under `file_name` in the upload directory and
    /// return its path. An existing upload of the same name is replaced.
    pub fn stage_upload(&self, file_name: &str, mut body: impl Read) -> Result<PathBuf> {
        validate_file_name(file_name)?;
        let dir = &self.config.upload_dir;
        fs::create_dir_all(dir)?;
        let mut temp = tempfile::Builder::new()
            .prefix(".upload")
            .tempfile_in(dir)?;
        io::copy(&mut body, temp.as_file_mut())?;
        let path = dir.join(file_name);
        temp.persist(&path)?;
        log::debug!("staged upload {}", path.display());
        Ok(path)
    }

    /// Convert an upload into a timeline file in the data directory.
    ///
    /// Report extensions are converted generically; anything else is handed
    /// to the parser registered for `artifact_type`.
    pub fn convert_upload(
        &self,
        source: &Path,
        artifact_type: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<UploadOutcome> {
        let ext = extension(source);
        if is_report_extension(&ext) {
            return ingest::convert_upload(source, &self.config.data_dir, cancel);
        }
        let Some(tag) = artifact_type.filter(|t| !t.is_empty()) else {
            return Err(Error::UnsupportedFormat(ext));
        };

        let outcome = self.registry.ingest(tag, source, &self.config, cancel)?;
        // Timeline names are stamped to the second and may be rewritten.
        self.cache.invalidate(&outcome.csv);
        let csv_filename = file_name(&outcome.csv);
        Ok(UploadOutcome {
            status: "success",
            processed_records: RecordCount::Known(outcome.processed_records),
            data_url: format!("/api/data/{csv_filename}"),
            csv_filename,
            xlsx_filename: outcome.spreadsheet.as_deref().map(file_name),
            file_category: FileCategory::Forensic,
        })
    }

    /// Path of an existing artifact in the data directory.
    pub fn resolve_download(&self, filename: &str) -> Result<PathBuf> {
        let path = self.data_path(filename)?;
        if path.is_file() {
            Ok(path)
        } else {
            Err(Error::NotFound(path))
        }
    }
}

fn validate_file_name(name: &str) -> Result<()> {
    let bad = name.is_empty()
        || name == "."
        || name.contains("..")
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if bad {
        return Err(Error::InvalidFileName(name.to_string()));
    }
    Ok(())
}

fn parse_column_filters(raw: Option<&str>) -> ColumnFilters {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return ColumnFilters::new();
    };
    ColumnFilters::parse(raw).unwrap_or_else(|err| {
        log::warn!("ignoring malformed column filters {raw:?}: {err}");
        ColumnFilters::new()
    })
}

/// Sequence ids from loosely typed client input.
fn parse_ids(values: &[Value]) -> Vec<u64> {
    values
        .iter()
        .filter_map(|value| match value {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64)),
            Value::String(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        })
        .collect()
}

fn top_entity_column(seq: &Sequenced, profile: &AnalysisProfile) -> Option<String> {
    let dataset = seq.dataset();
    profile
        .top_entity_columns
        .iter()
        .find_map(|name| dataset.column_index_ci(name))
        .map(|idx| dataset.columns()[idx].clone())
}

fn export_options(request: &ExportRequest) -> ExportOptions {
    ExportOptions {
        format: request.format,
        drop_empty_columns: request.drop_empty_columns,
        visible_columns: request.visible_columns.clone(),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
