use std::fs;
use std::path::Path;

use serde_json::json;
use tempfile::tempdir;

use chronos::ingest::{FileCategory, RecordCount};
use chronos::{
    ArtifactParser, CancelToken, Dataset, EngineConfig, HistogramOptions, TableRequest,
    TimelineService,
};

/// Parses `time|source|message` lines.
struct PipeLogParser;

impl ArtifactParser for PipeLogParser {
    fn tag(&self) -> &str {
        "PIPELOG"
    }

    fn parse(&self, source: &Path, _cancel: &CancelToken) -> chronos::Result<Dataset> {
        let text = fs::read_to_string(source)?;
        Ok(Dataset::from_rows(
            &["Timestamp", "Source", "Message"],
            text.lines()
                .map(|line| line.splitn(3, '|').map(str::to_string).collect::<Vec<_>>()),
        ))
    }
}

fn service(root: &Path) -> TimelineService {
    TimelineService::new(EngineConfig::default().with_data_dir(root.join("output")))
}

#[test]
fn converted_reports_are_queryable() {
    let dir = tempdir().expect("tempdir");
    let source = dir.path().join("report.json");
    fs::write(
        &source,
        r#"[{"Timestamp": "2024-05-01T12:00:00", "User": "bob"},
            {"Timestamp": "2024-05-01T08:00:00", "User": "alice"}]"#,
    )
    .expect("write upload");
    let svc = service(dir.path());

    let outcome = svc
        .convert_upload(&source, None, &CancelToken::new())
        .expect("convert");
    assert_eq!(outcome.file_category, FileCategory::Generic);
    assert_eq!(outcome.processed_records, RecordCount::Known(2));
    assert!(outcome.xlsx_filename.is_none());

    let page = svc
        .query_table(&outcome.csv_filename, &TableRequest::default(), &CancelToken::new())
        .expect("query converted file");
    assert_eq!(page.total, 2);
    assert_eq!(page.data[0]["User"], json!("alice"));
}

#[cfg(feature = "xlsx")]
#[test]
fn excel_reports_are_converted_from_their_first_sheet() {
    let dir = tempdir().expect("tempdir");
    let source = dir.path().join("report.xlsx");
    let mut workbook = rust_xlsxwriter::Workbook::new();
    let sheet = workbook.add_worksheet();
    for (col, name) in ["Timestamp", "EventID", "User"].into_iter().enumerate() {
        sheet.write_string(0, col as u16, name).expect("header cell");
    }
    sheet.write_string(1, 0, "2024-05-01 12:00:00").expect("cell");
    sheet.write_number(1, 1, 4624.0).expect("cell");
    sheet.write_string(1, 2, "bob").expect("cell");
    sheet.write_string(2, 0, "2024-05-01 08:00:00").expect("cell");
    sheet.write_number(2, 1, 4625.0).expect("cell");
    sheet.write_string(2, 2, "alice").expect("cell");
    workbook.save(&source).expect("write upload");
    let svc = service(dir.path());

    let outcome = svc
        .convert_upload(&source, None, &CancelToken::new())
        .expect("convert");
    assert_eq!(outcome.file_category, FileCategory::Generic);
    assert_eq!(outcome.processed_records, RecordCount::Known(2));

    let page = svc
        .query_table(&outcome.csv_filename, &TableRequest::default(), &CancelToken::new())
        .expect("query converted file");
    assert_eq!(page.total, 2);
    assert_eq!(page.data[0]["User"], json!("alice"));
    assert_eq!(page.data[0]["EventID"], json!("4625"));
}

#[test]
fn sqlite_uploads_are_unsupported() {
    let dir = tempdir().expect("tempdir");
    let source = dir.path().join("report.sqlite");
    fs::write(&source, b"SQLite format 3\0").expect("write upload");
    let svc = service(dir.path());

    let err = svc
        .convert_upload(&source, Some("MFT"), &CancelToken::new())
        .expect_err("sqlite upload");
    assert_eq!(err.status_code(), 400);
    assert_eq!(err.to_payload(), json!({ "error": "unsupported format: sqlite" }));
}

#[test]
fn artifacts_go_through_their_registered_parser() {
    let dir = tempdir().expect("tempdir");
    let source = dir.path().join("system.plog");
    fs::write(
        &source,
        "2024-05-02 10:00:00|kernel|boot\n2024-05-01 23:59:59|sshd|accepted key\n",
    )
    .expect("write artifact");
    let mut svc = service(dir.path());
    svc.registry_mut().register(PipeLogParser);

    let outcome = svc
        .convert_upload(&source, Some("pipelog"), &CancelToken::new())
        .expect("ingest artifact");
    assert_eq!(outcome.file_category, FileCategory::Forensic);
    assert_eq!(outcome.processed_records, RecordCount::Known(2));
    assert!(outcome.csv_filename.starts_with("Timeline_PIPELOG_"));
    assert_eq!(outcome.data_url, format!("/api/data/{}", outcome.csv_filename));
    if cfg!(feature = "xlsx") {
        let xlsx = outcome.xlsx_filename.expect("spreadsheet copy");
        assert!(svc.resolve_download(&xlsx).is_ok());
    }

    let page = svc
        .query_table(&outcome.csv_filename, &TableRequest::default(), &CancelToken::new())
        .expect("query timeline");
    assert_eq!(page.data[0]["Source"], json!("sshd"));
}

#[test]
fn reingested_timelines_are_not_served_from_a_stale_cache() {
    let dir = tempdir().expect("tempdir");
    let source = dir.path().join("system.plog");
    let mut svc = service(dir.path());
    svc.registry_mut().register(PipeLogParser);

    fs::write(&source, "2024-05-02 10:00:00|kernel|boot\n").expect("write artifact");
    let first = svc
        .convert_upload(&source, Some("pipelog"), &CancelToken::new())
        .expect("first ingest");
    svc.histogram(&first.csv_filename, &HistogramOptions::default(), &CancelToken::new())
        .expect("first histogram");

    fs::write(&source, "2024-05-02 11:00:00|kernel|boot\n").expect("rewrite artifact");
    let second = svc
        .convert_upload(&source, Some("pipelog"), &CancelToken::new())
        .expect("second ingest");
    let analysis = svc
        .histogram(&second.csv_filename, &HistogramOptions::default(), &CancelToken::new())
        .expect("second histogram");

    assert_eq!(svc.cache().misses(), 2);
    let report = analysis.report().expect("histogram available");
    assert_eq!(report.stats.file_start.as_deref(), Some("2024-05-02T11:00:00"));
}
