use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{json, Value};
use tempfile::tempdir;

use chronos::{CancelToken, EngineConfig, TableRequest, TimelineService};

const EVENTS: &str = concat!(
    "Timestamp,User,Action\n",
    "2024-01-02 10:00:00,guest,logout\n",
    "2024-01-01 09:00:00,Administrator,login\n",
    "bad,system,boot\n",
    "2024-01-01 12:30:00,admin2,Login\n",
);

fn service_with(dir: &Path, name: &str, body: &str) -> TimelineService {
    fs::write(dir.join(name), body).expect("write source");
    TimelineService::new(EngineConfig::default().with_data_dir(dir))
}

fn column<'a>(data: &'a [serde_json::Map<String, Value>], name: &str) -> Vec<&'a Value> {
    data.iter().map(|row| &row[name]).collect()
}

#[test]
fn three_rows_are_numbered_in_event_time_order() {
    let dir = tempdir().expect("tempdir");
    let svc = service_with(
        dir.path(),
        "three.csv",
        "Timestamp,Label\n2024-01-02 10:00:00,b\n2024-01-01 09:00:00,a\nbad,c\n",
    );
    let page = svc
        .query_table("three.csv", &TableRequest::default(), &CancelToken::new())
        .expect("query");

    assert_eq!(page.total, 3);
    assert_eq!(column(&page.data, "_id"), vec![&json!(1), &json!(2), &json!(3)]);
    assert_eq!(
        column(&page.data, "Timestamp"),
        vec![
            &json!("2024-01-01 09:00:00"),
            &json!("2024-01-02 10:00:00"),
            &json!("bad")
        ]
    );
}

#[test]
fn ids_are_stable_across_requests() {
    let dir = tempdir().expect("tempdir");
    let svc = service_with(dir.path(), "events.csv", EVENTS);
    let request = TableRequest {
        size: Some(100),
        ..TableRequest::default()
    };
    let first = svc
        .query_table("events.csv", &request, &CancelToken::new())
        .expect("first query");
    let second = svc
        .query_table("events.csv", &request, &CancelToken::new())
        .expect("second query");
    assert_eq!(first.data, second.data);
}

#[test]
fn global_search_ignores_case() {
    let dir = tempdir().expect("tempdir");
    let svc = service_with(dir.path(), "events.csv", EVENTS);
    for term in ["ADMIN", "admin", "Admin"] {
        let request = TableRequest {
            query: Some(term.to_string()),
            ..TableRequest::default()
        };
        let page = svc
            .query_table("events.csv", &request, &CancelToken::new())
            .expect("query");
        assert_eq!(
            column(&page.data, "User"),
            vec![&json!("Administrator"), &json!("admin2")],
            "term {term}"
        );
    }
}

#[test]
fn total_matches_the_rows_paged_from_the_start() {
    let dir = tempdir().expect("tempdir");
    let svc = service_with(dir.path(), "events.csv", EVENTS);
    let filters = [
        TableRequest::default(),
        TableRequest {
            col_filters: Some(r#"{"Action":"log"}"#.to_string()),
            ..TableRequest::default()
        },
        TableRequest {
            start: Some("2024-01-01 10:00:00".to_string()),
            ..TableRequest::default()
        },
        TableRequest {
            query: Some("nobody".to_string()),
            ..TableRequest::default()
        },
    ];
    for filter in filters {
        let counted = svc
            .query_table("events.csv", &filter, &CancelToken::new())
            .expect("count");
        let all = TableRequest {
            page: Some(1),
            size: Some(counted.total.max(1) as i64),
            ..filter.clone()
        };
        let paged = svc
            .query_table("events.csv", &all, &CancelToken::new())
            .expect("page");
        assert_eq!(paged.data.len(), counted.total);
    }
}

#[test]
fn time_range_drops_rows_without_a_time() {
    let dir = tempdir().expect("tempdir");
    let svc = service_with(dir.path(), "events.csv", EVENTS);
    let request = TableRequest {
        start: Some("2024-01-01 09:30:00".to_string()),
        end: Some("2024-01-02 10:00:00".to_string()),
        ..TableRequest::default()
    };
    let page = svc
        .query_table("events.csv", &request, &CancelToken::new())
        .expect("query");
    assert_eq!(column(&page.data, "User"), vec![&json!("admin2"), &json!("guest")]);
}

#[test]
fn pages_past_the_end_are_empty() {
    let dir = tempdir().expect("tempdir");
    let svc = service_with(dir.path(), "events.csv", EVENTS);
    let request = TableRequest {
        page: Some(3),
        size: Some(2),
        ..TableRequest::default()
    };
    let page = svc
        .query_table("events.csv", &request, &CancelToken::new())
        .expect("query");
    assert_eq!(page.total, 4);
    assert_eq!(page.last_page, 2);
    assert!(page.data.is_empty());
}

#[test]
fn gzip_sources_are_read_transparently() {
    let dir = tempdir().expect("tempdir");
    let file = File::create(dir.path().join("events.csv.gz")).expect("create gz");
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder.write_all(EVENTS.as_bytes()).expect("write gz");
    encoder.finish().expect("finish gz");

    let svc = TimelineService::new(EngineConfig::default().with_data_dir(dir.path()));
    let page = svc
        .query_table("events.csv.gz", &TableRequest::default(), &CancelToken::new())
        .expect("query");
    assert_eq!(page.total, 4);
}

#[test]
fn cancelled_requests_fail_cleanly() {
    let dir = tempdir().expect("tempdir");
    let svc = service_with(dir.path(), "events.csv", EVENTS);
    let cancel = CancelToken::new();
    cancel.cancel();
    let err = svc
        .query_table("events.csv", &TableRequest::default(), &cancel)
        .expect_err("cancelled");
    assert!(matches!(err, chronos::Error::Cancelled));
}
