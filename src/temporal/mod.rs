//! Event-time detection and normalization.
//!
//! ```no_run
//! use chronos::dataset::Dataset;
//! use chronos::temporal::{normalize, ResolverPolicy};
//!
//! let dataset = Dataset::from_rows(&["Timestamp", "User"], vec![vec!["2024-01-02 10:00:00", "alice"]]);
//! let binding = ResolverPolicy::sequencing().bind(&dataset).expect("time column");
//! let instant = dataset.cell(0, binding.column).and_then(normalize);
//! ```

mod normalize;
mod resolver;

pub use normalize::{matching_strategy, normalize, project, ParseStrategy, STRATEGIES};
pub use resolver::{MatchRule, ResolverPolicy, TimeBinding};

use time::macros::format_description;
use time::PrimitiveDateTime;

/// Normalized event time. Naive, interpreted as UTC.
pub type Instant = PrimitiveDateTime;

/// Nanoseconds since the Unix epoch.
pub fn unix_nanos(instant: Instant) -> i128 {
    instant.assume_utc().unix_timestamp_nanos()
}

/// Whole seconds since the Unix epoch.
pub fn unix_seconds(instant: Instant) -> i64 {
    instant.assume_utc().unix_timestamp()
}

pub fn from_unix_seconds(secs: i64) -> Option<Instant> {
    let dt = time::OffsetDateTime::from_unix_timestamp(secs).ok()?;
    Some(PrimitiveDateTime::new(dt.date(), dt.time()))
}

/// `2024-01-02T10:00:00`, fractional seconds dropped.
pub fn format_iso(instant: Instant) -> String {
    instant
        .format(format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second]"
        ))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn seconds_round_trip_through_the_epoch() {
        let instant = datetime!(2024-01-02 10:00:00);
        assert_eq!(from_unix_seconds(unix_seconds(instant)), Some(instant));
        assert_eq!(unix_nanos(instant), unix_seconds(instant) as i128 * 1_000_000_000);
    }

    #[test]
    fn iso_format_drops_fraction() {
        assert_eq!(format_iso(datetime!(2024-01-02 10:00:00.5)), "2024-01-02T10:00:00");
    }
}
