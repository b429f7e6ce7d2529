//! Raw cell text to [`Instant`].
//!
//! Normalization is an ordered list of pure strategies; the first one that
//! yields a value wins. Month-first (US) layouts are listed before day-first
//! layouts, so `03/04/2026` reads as March 4th.

use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, UtcOffset};

use super::Instant;
use crate::dataset::Dataset;

/// Epoch interpretations must land in `[1980-01-01, 2100-01-01)`.
const EPOCH_MIN_SECS: i128 = 315_532_800;
const EPOCH_MAX_SECS: i128 = 4_102_444_800;

/// One named way of reading a cell.
#[derive(Clone, Copy)]
pub struct ParseStrategy {
    pub name: &'static str,
    parse: fn(&str) -> Option<Instant>,
}

impl ParseStrategy {
    pub fn parse(&self, raw: &str) -> Option<Instant> {
        (self.parse)(raw)
    }
}

impl std::fmt::Debug for ParseStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParseStrategy").field("name", &self.name).finish()
    }
}

/// Strategies in priority order.
pub const STRATEGIES: &[ParseStrategy] = &[
    ParseStrategy { name: "epoch_ms", parse: epoch_millis },
    ParseStrategy { name: "epoch_s", parse: epoch_seconds },
    ParseStrategy { name: "epoch_us", parse: epoch_micros },
    ParseStrategy { name: "epoch_ns", parse: epoch_nanos },
    ParseStrategy { name: "%Y-%m-%dT%H:%M:%S%.f", parse: iso_t_fraction },
    ParseStrategy { name: "%Y-%m-%dT%H:%M:%S", parse: iso_t },
    ParseStrategy { name: "%Y-%m-%d %H:%M:%S%.f", parse: iso_space_fraction },
    ParseStrategy { name: "%Y-%m-%d %H:%M:%S", parse: iso_space },
    ParseStrategy { name: "%Y-%m-%d %H:%M", parse: iso_space_minutes },
    ParseStrategy { name: "%m/%d/%Y %I:%M:%S %p", parse: us_12h },
    ParseStrategy { name: "%m/%d/%Y %I:%M %p", parse: us_12h_minutes },
    ParseStrategy { name: "%m/%d/%Y %H:%M:%S", parse: us_24h },
    ParseStrategy { name: "%m/%d/%Y %H:%M", parse: us_24h_minutes },
    ParseStrategy { name: "%d/%m/%Y %H:%M:%S", parse: eu_24h },
    ParseStrategy { name: "%d/%m/%Y %H:%M", parse: eu_24h_minutes },
    ParseStrategy { name: "%b %d %Y %H:%M:%S", parse: abbrev_month },
    ParseStrategy { name: "%b %d, %Y %I:%M %p", parse: abbrev_month_12h },
    ParseStrategy { name: "%d-%m-%Y %H:%M:%S", parse: eu_dashed },
    ParseStrategy { name: "rfc3339", parse: rfc3339 },
    ParseStrategy { name: "%Y-%m-%d", parse: iso_date },
    ParseStrategy { name: "%m/%d/%Y", parse: us_date },
    ParseStrategy { name: "%d/%m/%Y", parse: eu_date },
];

/// Normalize one cell. Unparseable text yields `None`, never an error.
pub fn normalize(raw: &str) -> Option<Instant> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    STRATEGIES.iter().find_map(|strategy| strategy.parse(raw))
}

/// Name of the strategy that accepts `raw`, for diagnostics.
pub fn matching_strategy(raw: &str) -> Option<&'static str> {
    let raw = raw.trim();
    STRATEGIES
        .iter()
        .find(|strategy| strategy.parse(raw).is_some())
        .map(|strategy| strategy.name)
}

/// Typed projection of one column; empty cells project to `None`.
pub fn project(dataset: &Dataset, column: usize) -> Vec<Option<Instant>> {
    (0..dataset.len())
        .map(|row| dataset.cell(row, column).and_then(normalize))
        .collect()
}

fn epoch(raw: &str, nanos_per_unit: i128) -> Option<Instant> {
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: i128 = raw.parse::<u64>().ok()?.into();
    let nanos = value.checked_mul(nanos_per_unit)?;
    let secs = nanos / 1_000_000_000;
    if !(EPOCH_MIN_SECS..EPOCH_MAX_SECS).contains(&secs) {
        return None;
    }
    let dt = OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()?;
    Some(PrimitiveDateTime::new(dt.date(), dt.time()))
}

fn epoch_millis(raw: &str) -> Option<Instant> {
    epoch(raw, 1_000_000)
}

fn epoch_seconds(raw: &str) -> Option<Instant> {
    epoch(raw, 1_000_000_000)
}

fn epoch_micros(raw: &str) -> Option<Instant> {
    epoch(raw, 1_000)
}

fn epoch_nanos(raw: &str) -> Option<Instant> {
    epoch(raw, 1)
}

fn iso_t_fraction(raw: &str) -> Option<Instant> {
    PrimitiveDateTime::parse(
        raw,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
    )
    .ok()
}

fn iso_t(raw: &str) -> Option<Instant> {
    PrimitiveDateTime::parse(
        raw,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    )
    .ok()
}

fn iso_space_fraction(raw: &str) -> Option<Instant> {
    PrimitiveDateTime::parse(
        raw,
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
    )
    .ok()
}

fn iso_space(raw: &str) -> Option<Instant> {
    PrimitiveDateTime::parse(
        raw,
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    )
    .ok()
}

fn iso_space_minutes(raw: &str) -> Option<Instant> {
    PrimitiveDateTime::parse(raw, format_description!("[year]-[month]-[day] [hour]:[minute]")).ok()
}

fn us_12h(raw: &str) -> Option<Instant> {
    PrimitiveDateTime::parse(
        raw,
        format_description!(
            "[month padding:none]/[day padding:none]/[year] [hour repr:12 padding:none]:[minute]:[second] [period case_sensitive:false]"
        ),
    )
    .ok()
}

fn us_12h_minutes(raw: &str) -> Option<Instant> {
    PrimitiveDateTime::parse(
        raw,
        format_description!(
            "[month padding:none]/[day padding:none]/[year] [hour repr:12 padding:none]:[minute] [period case_sensitive:false]"
        ),
    )
    .ok()
}

fn us_24h(raw: &str) -> Option<Instant> {
    PrimitiveDateTime::parse(
        raw,
        format_description!(
            "[month padding:none]/[day padding:none]/[year] [hour padding:none]:[minute]:[second]"
        ),
    )
    .ok()
}

fn us_24h_minutes(raw: &str) -> Option<Instant> {
    PrimitiveDateTime::parse(
        raw,
        format_description!(
            "[month padding:none]/[day padding:none]/[year] [hour padding:none]:[minute]"
        ),
    )
    .ok()
}

fn eu_24h(raw: &str) -> Option<Instant> {
    PrimitiveDateTime::parse(
        raw,
        format_description!(
            "[day padding:none]/[month padding:none]/[year] [hour padding:none]:[minute]:[second]"
        ),
    )
    .ok()
}

fn eu_24h_minutes(raw: &str) -> Option<Instant> {
    PrimitiveDateTime::parse(
        raw,
        format_description!(
            "[day padding:none]/[month padding:none]/[year] [hour padding:none]:[minute]"
        ),
    )
    .ok()
}

fn abbrev_month(raw: &str) -> Option<Instant> {
    PrimitiveDateTime::parse(
        raw,
        format_description!(
            "[month repr:short case_sensitive:false] [day padding:none] [year] [hour padding:none]:[minute]:[second]"
        ),
    )
    .ok()
}

fn abbrev_month_12h(raw: &str) -> Option<Instant> {
    PrimitiveDateTime::parse(
        raw,
        format_description!(
            "[month repr:short case_sensitive:false] [day padding:none], [year] [hour repr:12 padding:none]:[minute] [period case_sensitive:false]"
        ),
    )
    .ok()
}

fn eu_dashed(raw: &str) -> Option<Instant> {
    PrimitiveDateTime::parse(
        raw,
        format_description!(
            "[day padding:none]-[month padding:none]-[year] [hour padding:none]:[minute]:[second]"
        ),
    )
    .ok()
}

fn rfc3339(raw: &str) -> Option<Instant> {
    let dt = OffsetDateTime::parse(raw, &Rfc3339).ok()?.to_offset(UtcOffset::UTC);
    Some(PrimitiveDateTime::new(dt.date(), dt.time()))
}

fn iso_date(raw: &str) -> Option<Instant> {
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .ok()
        .map(Date::midnight)
}

fn us_date(raw: &str) -> Option<Instant> {
    Date::parse(
        raw,
        format_description!("[month padding:none]/[day padding:none]/[year]"),
    )
    .ok()
    .map(Date::midnight)
}

fn eu_date(raw: &str) -> Option<Instant> {
    Date::parse(
        raw,
        format_description!("[day padding:none]/[month padding:none]/[year]"),
    )
    .ok()
    .map(Date::midnight)
}
