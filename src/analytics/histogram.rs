use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use serde_json::Value;

use crate::analytics::bucket::{self, choose_width};
use crate::analytics::stats::{anomalies, mean, rolling_mean, round1};
use crate::analytics::{AnalysisProfile, Unavailable};
use crate::cancel::CancelToken;
use crate::dataset::Dataset;
use crate::error::Result;
use crate::query::TimeRange;
use crate::temporal::{format_iso, normalize, unix_nanos, unix_seconds, Instant};

pub const ELEVATED: &str = "elevated";
pub const ROUTINE: &str = "routine";
pub const ACTIVITY: &str = "activity";

const ELEVATED_COLOR: &str = "#ff6600";
const BASE_COLOR: &str = "#3399ff";

/// Outcome of a histogram request.
#[derive(Debug, Clone)]
pub enum Analysis {
    Ready(Box<HistogramReport>),
    Unavailable { reason: Unavailable },
}

impl Analysis {
    pub fn unavailable(reason: Unavailable) -> Self {
        Analysis::Unavailable { reason }
    }

    pub fn report(&self) -> Option<&HistogramReport> {
        match self {
            Analysis::Ready(report) => Some(report),
            Analysis::Unavailable { .. } => None,
        }
    }

    /// Chart payload, or `{ "error": reason }`.
    pub fn to_payload(&self) -> Value {
        match self {
            Analysis::Ready(report) => report.to_payload(),
            Analysis::Unavailable { reason } => serde_json::json!({ "error": reason.to_string() }),
        }
    }
}

/// One time bucket (or one second, in the small-view layout).
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    /// Unix seconds of the bucket start.
    pub start: i64,
    pub count: u64,
    /// Counts per category, in [`HistogramReport::categories`] order.
    pub categories: Vec<u64>,
    pub trend: f64,
    pub anomaly: bool,
}

/// How buckets were formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Fixed-width contiguous buckets of `width` seconds.
    Bucketed { width: i64 },
    /// One bar per distinct second, for views of only a few records.
    PerSecond,
}

/// Reference statistics drawn with every chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalStats {
    pub max_bucket: u64,
    pub mean_bucket: f64,
    pub min_bucket: u64,
    pub total_events: usize,
    pub total_buckets: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoiseInfo {
    pub top_talker_id: String,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewStats {
    pub total_events: usize,
    pub file_total: usize,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub file_start: Option<String>,
    pub file_end: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HistogramReport {
    pub layout: Layout,
    pub categories: Vec<&'static str>,
    pub buckets: Vec<Bucket>,
    pub global_stats: GlobalStats,
    pub noise_info: NoiseInfo,
    pub stats: ViewStats,
    /// Text prepended to the interpretation line.
    pub interpretation_prefix: &'static str,
}

impl HistogramReport {
    /// Replace the reference statistics with those of another analysis,
    /// normally one over the full file.
    pub fn overlay_global(&mut self, global: &GlobalStats) {
        self.global_stats = global.clone();
    }

    pub fn labels(&self) -> Vec<String> {
        let width = match self.layout {
            Layout::Bucketed { width } => width,
            Layout::PerSecond => 1,
        };
        self.buckets
            .iter()
            .map(|b| bucket::label(b.start, width))
            .collect()
    }

    pub fn anomaly_count(&self) -> usize {
        self.buckets.iter().filter(|b| b.anomaly).count()
    }

    pub fn interpretation(&self) -> String {
        let labels = self.labels();
        let mut peak: Option<usize> = None;
        for (idx, bucket) in self.buckets.iter().enumerate() {
            if peak.map_or(true, |p| bucket.count > self.buckets[p].count) {
                peak = Some(idx);
            }
        }
        let (peak_label, peak_count) = match peak {
            Some(idx) => (labels[idx].as_str(), self.buckets[idx].count),
            None => ("?", 0),
        };
        let rising = match (self.buckets.first(), self.buckets.last()) {
            (Some(first), Some(last)) => last.trend > first.trend,
            _ => false,
        };
        format!(
            "{}Analysis: Peak activity at {} ({} events). Trend: {}. Anomalies found: {}.",
            self.interpretation_prefix,
            peak_label,
            peak_count,
            if rising { "Rising" } else { "Stable/Falling" },
            self.anomaly_count(),
        )
    }

    pub fn series(&self) -> Vec<ChartSeries> {
        let mut datasets = Vec::new();
        match self.layout {
            Layout::PerSecond => {
                let reference = self.global_stats.mean_bucket;
                let colors = self
                    .buckets
                    .iter()
                    .map(|b| {
                        if b.count as f64 > reference {
                            ELEVATED_COLOR
                        } else {
                            BASE_COLOR
                        }
                    })
                    .collect();
                datasets.push(ChartSeries {
                    label: ACTIVITY.to_string(),
                    data: self.buckets.iter().map(|b| Value::from(b.count)).collect(),
                    kind: None,
                    background_color: Fill::PerBar(colors),
                    stack: Some("Stack 0"),
                    order: 2,
                });
            }
            Layout::Bucketed { .. } => {
                for (idx, category) in self.categories.iter().enumerate() {
                    datasets.push(ChartSeries {
                        label: category.to_string(),
                        data: self
                            .buckets
                            .iter()
                            .map(|b| Value::from(b.categories[idx]))
                            .collect(),
                        kind: None,
                        background_color: Fill::Solid(category_color(category)),
                        stack: Some("Stack 0"),
                        order: 2,
                    });
                }
            }
        }

        datasets.push(ChartSeries {
            label: "trend".to_string(),
            data: self.buckets.iter().map(|b| Value::from(b.trend)).collect(),
            kind: Some("line"),
            background_color: Fill::Solid("rgba(0, 255, 255, 0.08)"),
            stack: None,
            order: 1,
        });

        if self.anomaly_count() > 0 {
            datasets.push(ChartSeries {
                label: "anomaly (> 2σ)".to_string(),
                data: self
                    .buckets
                    .iter()
                    .map(|b| {
                        if b.anomaly {
                            Value::from(b.count)
                        } else {
                            Value::Null
                        }
                    })
                    .collect(),
                kind: Some("scatter"),
                background_color: Fill::Solid("#ff0000"),
                stack: None,
                order: 0,
            });
        }
        datasets
    }

    pub fn to_payload(&self) -> Value {
        let payload = ChartPayload {
            labels: self.labels(),
            datasets: self.series(),
            interpretation: self.interpretation(),
            stacked: true,
            global_stats: &self.global_stats,
            noise_info: &self.noise_info,
            stats: &self.stats,
        };
        serde_json::to_value(payload).unwrap_or(Value::Null)
    }
}

fn category_color(category: &str) -> &'static str {
    if category == ELEVATED {
        ELEVATED_COLOR
    } else {
        BASE_COLOR
    }
}

/// One chart series.
#[derive(Debug, Clone, Serialize)]
pub struct ChartSeries {
    pub label: String,
    pub data: Vec<Value>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
    #[serde(rename = "backgroundColor")]
    pub background_color: Fill,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<&'static str>,
    pub order: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Fill {
    Solid(&'static str),
    PerBar(Vec<&'static str>),
}

#[derive(Serialize)]
struct ChartPayload<'a> {
    labels: Vec<String>,
    datasets: Vec<ChartSeries>,
    interpretation: String,
    stacked: bool,
    global_stats: &'a GlobalStats,
    noise_info: &'a NoiseInfo,
    stats: &'a ViewStats,
}

/// Histogram of `rows` of `dataset`, optionally zoomed to `zoom`.
///
/// The time column is resolved with the profile's own policy rather than
/// reusing the one the dataset was sequenced by.
pub fn analyze(
    dataset: &Dataset,
    rows: &[usize],
    profile: &AnalysisProfile,
    zoom: TimeRange,
    cancel: &CancelToken,
) -> Result<Analysis> {
    let Some(binding) = profile.resolver.bind(dataset) else {
        return Ok(Analysis::unavailable(Unavailable::NoTimeColumn));
    };

    let mut events: Vec<(Instant, usize)> = Vec::with_capacity(rows.len());
    for (n, &row) in rows.iter().enumerate() {
        cancel.checkpoint(n)?;
        if let Some(instant) = dataset.cell(row, binding.column).and_then(normalize) {
            events.push((instant, row));
        }
    }
    if events.is_empty() {
        return Ok(Analysis::unavailable(Unavailable::NoValidTimestamps));
    }

    let file_total = events.len();
    let file_start = events.iter().map(|e| e.0).min();
    let file_end = events.iter().map(|e| e.0).max();

    if zoom.is_active() {
        events.retain(|(instant, _)| zoom.contains(*instant));
        if events.is_empty() {
            return Ok(Analysis::unavailable(Unavailable::NoEventsInRange));
        }
    }
    cancel.check()?;

    let view_total = events.len();
    let view_start = events.iter().map(|e| e.0).min();
    let view_end = events.iter().map(|e| e.0).max();

    let severity = severity_column(dataset, &profile.severity_columns);
    let categories = if severity.is_some() {
        vec![ELEVATED, ROUTINE]
    } else {
        vec![ACTIVITY]
    };
    let elevated = |row: usize| -> bool {
        let Some(column) = severity else {
            return false;
        };
        dataset.cell(row, column).map_or(false, |cell| {
            let cell = cell.trim();
            profile
                .severity_tokens
                .iter()
                .any(|token| token.eq_ignore_ascii_case(cell))
        })
    };

    let (layout, mut buckets) = if view_total <= profile.histogram.small_view_threshold {
        (Layout::PerSecond, per_second(&events, categories.len(), &elevated))
    } else {
        let (Some(start), Some(end)) = (view_start, view_end) else {
            return Ok(Analysis::unavailable(Unavailable::NoValidTimestamps));
        };
        let span = (unix_nanos(end) - unix_nanos(start)) as f64 / 1e9;
        let width = choose_width(span, profile.histogram.target_buckets);
        log::debug!("histogram over {view_total} events: span {span}s, width {width}s");
        (
            Layout::Bucketed { width },
            bucketed(&events, width, categories.len(), &elevated),
        )
    };

    let volumes: Vec<f64> = buckets.iter().map(|b| b.count as f64).collect();
    let window = profile.histogram.trend.size(volumes.len());
    let trend = rolling_mean(&volumes, window);
    let flags = anomalies(&volumes, profile.histogram.zero_stddev);
    for ((bucket, trend), anomaly) in buckets.iter_mut().zip(trend).zip(flags) {
        bucket.trend = trend;
        bucket.anomaly = anomaly;
    }

    let global_stats = GlobalStats {
        max_bucket: buckets.iter().map(|b| b.count).max().unwrap_or(0),
        mean_bucket: round1(mean(&volumes)),
        min_bucket: buckets.iter().map(|b| b.count).min().unwrap_or(0),
        total_events: file_total,
        total_buckets: buckets.len(),
    };

    let noise_info = top_entity(dataset, &events, &profile.top_entity_columns);

    let stats = ViewStats {
        total_events: view_total,
        file_total,
        start_time: view_start.map(format_iso),
        end_time: view_end.map(format_iso),
        file_start: file_start.map(format_iso),
        file_end: file_end.map(format_iso),
    };

    Ok(Analysis::Ready(Box::new(HistogramReport {
        layout,
        categories,
        buckets,
        global_stats,
        noise_info,
        stats,
        interpretation_prefix: "",
    })))
}

fn bucketed(
    events: &[(Instant, usize)],
    width: i64,
    categories: usize,
    elevated: &dyn Fn(usize) -> bool,
) -> Vec<Bucket> {
    let instants: Vec<Instant> = events.iter().map(|e| e.0).collect();
    let (first, count, index) = bucket::assign(&instants, width);
    let mut buckets: Vec<Bucket> = (0..count)
        .map(|i| empty_bucket(first + i as i64 * width, categories))
        .collect();
    for (&(_, row), &idx) in events.iter().zip(&index) {
        tally(&mut buckets[idx], categories, elevated(row));
    }
    buckets
}

fn per_second(
    events: &[(Instant, usize)],
    categories: usize,
    elevated: &dyn Fn(usize) -> bool,
) -> Vec<Bucket> {
    let mut groups: BTreeMap<i64, Bucket> = BTreeMap::new();
    for &(instant, row) in events {
        let second = unix_seconds(instant);
        let bucket = groups
            .entry(second)
            .or_insert_with(|| empty_bucket(second, categories));
        tally(bucket, categories, elevated(row));
    }
    groups.into_values().collect()
}

fn empty_bucket(start: i64, categories: usize) -> Bucket {
    Bucket {
        start,
        count: 0,
        categories: vec![0; categories],
        trend: 0.0,
        anomaly: false,
    }
}

fn tally(bucket: &mut Bucket, categories: usize, elevated: bool) {
    bucket.count += 1;
    let slot = if categories == 1 || elevated { 0 } else { 1 };
    bucket.categories[slot] += 1;
}

fn severity_column(dataset: &Dataset, names: &[String]) -> Option<usize> {
    dataset.columns().iter().position(|column| {
        let lowered = column.to_lowercase();
        names.iter().any(|name| name.eq_ignore_ascii_case(&lowered))
    })
}

/// Most frequent value of the first present entity column. Ties go to the
/// value seen first in timeline order.
fn top_entity(dataset: &Dataset, events: &[(Instant, usize)], names: &[String]) -> NoiseInfo {
    let none = NoiseInfo {
        top_talker_id: "N/A".to_string(),
        percent: 0.0,
    };
    let Some(column) = names.iter().find_map(|name| dataset.column_index_ci(name)) else {
        return none;
    };
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (order, &(_, row)) in events.iter().enumerate() {
        if let Some(value) = dataset.cell(row, column) {
            counts.entry(value).or_insert((0, order)).0 += 1;
        }
    }
    let best = counts
        .into_iter()
        .max_by(|a, b| a.1 .0.cmp(&b.1 .0).then(b.1 .1.cmp(&a.1 .1)));
    match best {
        Some((value, (count, _))) => NoiseInfo {
            top_talker_id: value.to_string(),
            percent: round1(count as f64 / events.len() as f64 * 100.0),
        },
        None => none,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use time::macros::datetime;

    fn profile() -> AnalysisProfile {
        AnalysisProfile::full_file(&EngineConfig::default())
    }

    fn minute_series(n: usize) -> Dataset {
        let rows: Vec<Vec<String>> = (0..n)
            .map(|i| {
                let level = if i % 4 == 0 { "Error" } else { "Information" };
                let event = if i % 3 == 0 { "4624" } else { "4688" };
                vec![
                    format!("2024-01-01 10:{:02}:00", i % 60),
                    level.to_string(),
                    event.to_string(),
                ]
            })
            .collect();
        Dataset::from_rows(&["Timestamp", "Level", "EventID"], rows)
    }

    fn all_rows(dataset: &Dataset) -> Vec<usize> {
        (0..dataset.len()).collect()
    }

    fn ready(analysis: Analysis) -> HistogramReport {
        match analysis {
            Analysis::Ready(report) => *report,
            Analysis::Unavailable { reason } => panic!("unexpected: {reason}"),
        }
    }

    #[test]
    fn bucket_counts_cover_every_timestamped_row() {
        let mut rows: Vec<Vec<String>> = (0..40)
            .map(|i| vec![format!("2024-01-01 10:{:02}:00", i), "x".to_string()])
            .collect();
        rows.push(vec!["bad".to_string(), "y".to_string()]);
        let dataset = Dataset::from_rows(&["Timestamp", "User"], rows);
        let report = ready(
            analyze(
                &dataset,
                &all_rows(&dataset),
                &profile(),
                TimeRange::default(),
                &CancelToken::new(),
            )
            .unwrap(),
        );
        let sum: u64 = report.buckets.iter().map(|b| b.count).sum();
        assert_eq!(sum, 40);
        assert_eq!(report.categories, vec![ACTIVITY]);
        assert_eq!(report.layout, Layout::Bucketed { width: 60 });
        assert_eq!(report.global_stats.total_buckets, 40);
    }

    #[test]
    fn severity_splits_categories() {
        let dataset = minute_series(48);
        let report = ready(
            analyze(
                &dataset,
                &all_rows(&dataset),
                &profile(),
                TimeRange::default(),
                &CancelToken::new(),
            )
            .unwrap(),
        );
        assert_eq!(report.categories, vec![ELEVATED, ROUTINE]);
        let elevated: u64 = report.buckets.iter().map(|b| b.categories[0]).sum();
        let routine: u64 = report.buckets.iter().map(|b| b.categories[1]).sum();
        assert_eq!((elevated, routine), (12, 36));
        assert_eq!(report.noise_info.top_talker_id, "4688");
        assert_eq!(report.noise_info.percent, 66.7);
    }

    #[test]
    fn small_views_get_one_bar_per_second() {
        let dataset = Dataset::from_rows(
            &["time"],
            vec![
                vec!["2024-01-01 10:00:00"],
                vec!["2024-01-01 10:00:00"],
                vec!["2024-01-01 12:00:00"],
            ],
        );
        let report = ready(
            analyze(
                &dataset,
                &all_rows(&dataset),
                &profile(),
                TimeRange::default(),
                &CancelToken::new(),
            )
            .unwrap(),
        );
        assert_eq!(report.layout, Layout::PerSecond);
        let counts: Vec<u64> = report.buckets.iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![2, 1]);
        let series = report.series();
        assert_eq!(
            series[0].background_color,
            Fill::PerBar(vec![ELEVATED_COLOR, BASE_COLOR])
        );
    }

    #[test]
    fn missing_time_and_garbage_are_unavailable() {
        let no_time = Dataset::from_rows(&["User"], vec![vec!["a"]]);
        let analysis = analyze(&no_time, &[0], &profile(), TimeRange::default(), &CancelToken::new()).unwrap();
        assert!(matches!(
            analysis,
            Analysis::Unavailable { reason: Unavailable::NoTimeColumn }
        ));
        let garbage = Dataset::from_rows(&["time"], vec![vec!["never"]]);
        let analysis = analyze(&garbage, &[0], &profile(), TimeRange::default(), &CancelToken::new()).unwrap();
        assert_eq!(
            analysis.to_payload(),
            serde_json::json!({ "error": "No valid timestamps found" })
        );
    }

    #[test]
    fn zoom_keeps_file_totals() {
        let dataset = minute_series(40);
        let zoom = TimeRange::new(Some(datetime!(2024-01-01 10:30:00)), None);
        let report = ready(
            analyze(&dataset, &all_rows(&dataset), &profile(), zoom, &CancelToken::new()).unwrap(),
        );
        assert_eq!(report.stats.file_total, 40);
        assert_eq!(report.stats.total_events, 10);
        assert_eq!(report.stats.file_start.as_deref(), Some("2024-01-01T10:00:00"));
        assert_eq!(report.stats.start_time.as_deref(), Some("2024-01-01T10:30:00"));

        let empty = TimeRange::new(Some(datetime!(2025-01-01 00:00:00)), None);
        let analysis = analyze(&dataset, &all_rows(&dataset), &profile(), empty, &CancelToken::new()).unwrap();
        assert!(matches!(
            analysis,
            Analysis::Unavailable { reason: Unavailable::NoEventsInRange }
        ));
    }

    #[test]
    fn spike_is_reported_in_interpretation_and_series() {
        let mut rows = Vec::new();
        for minute in 0..30 {
            let repeat = if minute == 29 { 200 } else { 2 };
            for _ in 0..repeat {
                rows.push(vec![format!("2024-01-01 10:{minute:02}:00")]);
            }
        }
        let dataset = Dataset::from_rows(&["time"], rows);
        let report = ready(
            analyze(
                &dataset,
                &all_rows(&dataset),
                &profile(),
                TimeRange::default(),
                &CancelToken::new(),
            )
            .unwrap(),
        );
        assert!(report.buckets.last().unwrap().anomaly);
        let text = report.interpretation();
        assert!(text.starts_with("Analysis: Peak activity at"));
        assert!(text.contains("(200 events)"));
        assert!(text.ends_with("Anomalies found: 1."));
        let payload = report.to_payload();
        let datasets = payload["datasets"].as_array().unwrap();
        assert_eq!(datasets.last().unwrap()["type"], "scatter");
    }
}
