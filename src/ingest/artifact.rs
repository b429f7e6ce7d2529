//! Seam for forensic artifact parsers.
//!
//! Parsers turn an artifact (a file-system journal, an event log) into a flat
//! [`Dataset`]. The registry owns the conventions around them: the timeline
//! file name, the CSV and spreadsheet copies, and the outcome payload.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::Builder;
use time::macros::format_description;
use time::OffsetDateTime;

use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::dataset::Dataset;
use crate::error::{Error, Result};

/// Produces a flat dataset from one kind of forensic artifact.
pub trait ArtifactParser: Send + Sync {
    /// Artifact type tag, such as `MFT` or `EVTX`. Matched case-insensitively.
    fn tag(&self) -> &str;

    fn parse(&self, source: &Path, cancel: &CancelToken) -> Result<Dataset>;
}

/// Files written for one ingested artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactOutcome {
    pub processed_records: u64,
    pub csv: PathBuf,
    pub spreadsheet: Option<PathBuf>,
}

#[derive(Default)]
pub struct ArtifactRegistry {
    parsers: Vec<Box<dyn ArtifactParser>>,
}

impl std::fmt::Debug for ArtifactRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tags: Vec<&str> = self.parsers.iter().map(|p| p.tag()).collect();
        f.debug_struct("ArtifactRegistry").field("tags", &tags).finish()
    }
}

impl ArtifactRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parser; a later parser with the same tag wins.
    pub fn register<P: ArtifactParser + 'static>(&mut self, parser: P) -> &mut Self {
        self.parsers.push(Box::new(parser));
        self
    }

    pub fn get(&self, tag: &str) -> Option<&dyn ArtifactParser> {
        self.parsers
            .iter()
            .rev()
            .find(|p| p.tag().eq_ignore_ascii_case(tag))
            .map(|p| p.as_ref())
    }

    /// Parse `source` with the parser for `tag` and write
    /// `Timeline_<TAG>_<YYYYmmdd_HHMMSS>.csv` (plus an `.xlsx` copy when
    /// spreadsheet support is built) into the data directory.
    pub fn ingest(
        &self,
        tag: &str,
        source: &Path,
        config: &EngineConfig,
        cancel: &CancelToken,
    ) -> Result<ArtifactOutcome> {
        let parser = self
            .get(tag)
            .ok_or_else(|| Error::UnsupportedFormat(format!("artifact type {tag}")))?;
        if !source.is_file() {
            return Err(Error::NotFound(source.to_path_buf()));
        }
        let dataset = parser.parse(source, cancel)?;
        log::info!(
            "{} parser produced {} records from {}",
            parser.tag(),
            dataset.len(),
            source.display()
        );

        fs::create_dir_all(&config.data_dir)?;
        let stem = timeline_stem(parser.tag(), OffsetDateTime::now_utc());
        let csv = write_dataset_csv(&config.data_dir, &stem, &dataset, cancel)?;
        let spreadsheet = write_spreadsheet_copy(&config.data_dir, &stem, dataset, config, cancel)?;

        Ok(ArtifactOutcome {
            processed_records: csv.1,
            csv: csv.0,
            spreadsheet,
        })
    }
}

fn timeline_stem(tag: &str, now: OffsetDateTime) -> String {
    let stamp = now
        .format(format_description!(
            "[year][month][day]_[hour][minute][second]"
        ))
        .unwrap_or_default();
    format!("Timeline_{}_{stamp}", tag.to_ascii_uppercase())
}

fn write_dataset_csv(
    dir: &Path,
    stem: &str,
    dataset: &Dataset,
    cancel: &CancelToken,
) -> Result<(PathBuf, u64)> {
    let mut temp = Builder::new().suffix(".csv").tempfile_in(dir)?;
    let mut rows = 0;
    {
        let mut writer = csv::Writer::from_writer(BufWriter::new(temp.as_file_mut()));
        writer.write_record(dataset.columns())?;
        for (n, record) in dataset.records().enumerate() {
            cancel.checkpoint(n)?;
            writer.write_record(record.iter().map(|(_, cell)| cell.unwrap_or("")))?;
            rows += 1;
        }
        writer.flush()?;
    }
    temp.as_file_mut().flush()?;
    let path = dir.join(format!("{stem}.csv"));
    temp.persist(&path)?;
    Ok((path, rows))
}

#[cfg(feature = "xlsx")]
fn write_spreadsheet_copy(
    dir: &Path,
    stem: &str,
    dataset: Dataset,
    config: &EngineConfig,
    cancel: &CancelToken,
) -> Result<Option<PathBuf>> {
    use crate::export::{export_file, ExportFormat, ExportLayout, ExportOptions};
    use crate::query::View;
    use crate::sequence::sequence;

    let seq = sequence(dataset, &config.sequence_resolver, cancel)?;
    let view = View::all(&seq);
    let layout = ExportLayout::plan(&seq, &view, config, &ExportOptions::default());
    let artifact = match export_file(dir, &seq, &view, &layout, ExportFormat::Xlsx, cancel) {
        Ok(artifact) => artifact,
        Err(Error::Spreadsheet(reason)) => {
            log::warn!("skipping spreadsheet copy of {stem}: {reason}");
            return Ok(None);
        }
        Err(err) => return Err(err),
    };
    let path = dir.join(format!("{stem}.xlsx"));
    fs::rename(&artifact.path, &path)?;
    Ok(Some(path))
}

#[cfg(not(feature = "xlsx"))]
fn write_spreadsheet_copy(
    _dir: &Path,
    _stem: &str,
    _dataset: Dataset,
    _config: &EngineConfig,
    _cancel: &CancelToken,
) -> Result<Option<PathBuf>> {
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use tempfile::tempdir;

    struct LineParser;

    impl ArtifactParser for LineParser {
        fn tag(&self) -> &str {
            "LINES"
        }

        fn parse(&self, source: &Path, _cancel: &CancelToken) -> Result<Dataset> {
            let text = fs::read_to_string(source)?;
            Ok(Dataset::from_rows(
                &["Timestamp", "Message"],
                text.lines().map(|line| {
                    let (ts, msg) = line.split_once('|').unwrap_or((line, ""));
                    vec![ts.to_string(), msg.to_string()]
                }),
            ))
        }
    }

    #[test]
    fn stems_carry_tag_and_time() {
        let now = datetime!(2024-03-05 07:08:09 UTC);
        assert_eq!(timeline_stem("evtx", now), "Timeline_EVTX_20240305_070809");
    }

    #[test]
    fn unknown_tags_are_unsupported() {
        let registry = ArtifactRegistry::new();
        let err = registry
            .ingest("MFT", Path::new("x"), &EngineConfig::default(), &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }

    #[test]
    fn ingest_writes_timeline_files() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("art.log");
        fs::write(&source, "2024-01-02 10:00:00|b\n2024-01-01 09:00:00|a\n").unwrap();
        let config = EngineConfig::default().with_data_dir(dir.path().join("output"));
        let mut registry = ArtifactRegistry::new();
        registry.register(LineParser);

        let outcome = registry
            .ingest("lines", &source, &config, &CancelToken::new())
            .unwrap();
        assert_eq!(outcome.processed_records, 2);
        let name = outcome.csv.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("Timeline_LINES_"));
        assert_eq!(
            fs::read_to_string(&outcome.csv).unwrap(),
            "Timestamp,Message\n2024-01-02 10:00:00,b\n2024-01-01 09:00:00,a\n"
        );
        if cfg!(feature = "xlsx") {
            assert!(outcome.spreadsheet.unwrap().exists());
        }
    }
}
