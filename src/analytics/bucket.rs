//! Bucket width menu and epoch-aligned bucketing.

use time::macros::format_description;

use crate::temporal::{from_unix_seconds, unix_seconds, Instant};

/// Candidate bucket widths in seconds, narrowest first.
pub const BUCKET_WIDTHS: &[i64] = &[
    1,
    5,
    10,
    15,
    30,
    60,
    5 * 60,
    10 * 60,
    15 * 60,
    30 * 60,
    3600,
    2 * 3600,
    3 * 3600,
    6 * 3600,
    12 * 3600,
    86_400,
    2 * 86_400,
    7 * 86_400,
];

/// Width whose bucket count over `span_secs` is closest to `target`.
/// Ties resolve to the narrower width.
pub fn choose_width(span_secs: f64, target: usize) -> i64 {
    let target = target.max(1) as f64;
    let mut best = BUCKET_WIDTHS[0];
    let mut best_distance = f64::INFINITY;
    for &width in BUCKET_WIDTHS {
        let distance = (span_secs / width as f64 - target).abs();
        if distance < best_distance {
            best = width;
            best_distance = distance;
        }
    }
    best
}

/// Start of the width-aligned bucket holding `instant`, in Unix seconds.
pub fn bucket_start(instant: Instant, width: i64) -> i64 {
    unix_seconds(instant).div_euclid(width) * width
}

/// Contiguous counts per bucket over `instants`, including empty buckets
/// between the first and last occupied ones. Returns the first bucket start
/// and, for each instant, its bucket index.
pub fn assign(instants: &[Instant], width: i64) -> (i64, usize, Vec<usize>) {
    let starts: Vec<i64> = instants.iter().map(|&i| bucket_start(i, width)).collect();
    let first = starts.iter().copied().min().unwrap_or(0);
    let last = starts.iter().copied().max().unwrap_or(0);
    let count = if starts.is_empty() {
        0
    } else {
        ((last - first) / width) as usize + 1
    };
    let index = starts
        .iter()
        .map(|&start| ((start - first) / width) as usize)
        .collect();
    (first, count, index)
}

/// Chart label for a bucket starting at `start_secs`.
pub fn label(start_secs: i64, width: i64) -> String {
    let Some(instant) = from_unix_seconds(start_secs) else {
        return start_secs.to_string();
    };
    let formatted = if width < 60 {
        instant.format(format_description!("[hour]:[minute]:[second]"))
    } else if width >= 86_400 {
        instant.format(format_description!("[year]-[month]-[day]"))
    } else {
        instant.format(format_description!("[year]-[month]-[day] [hour]:[minute]"))
    };
    formatted.unwrap_or_else(|_| start_secs.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn width_tracks_the_target_count() {
        assert_eq!(choose_width(50.0, 50), 1);
        assert_eq!(choose_width(3000.0, 50), 60);
        assert_eq!(choose_width(86_400.0, 50), 30 * 60);
        assert_eq!(choose_width(365.0 * 86_400.0, 50), 7 * 86_400);
    }

    #[test]
    fn zero_span_picks_the_narrowest_width() {
        assert_eq!(choose_width(0.0, 30), 1);
    }

    #[test]
    fn buckets_are_epoch_aligned_and_contiguous() {
        let instants = [
            datetime!(2024-01-01 10:00:07),
            datetime!(2024-01-01 10:00:31),
            datetime!(2024-01-01 10:00:09),
        ];
        let (first, count, index) = assign(&instants, 10);
        assert_eq!(first % 10, 0);
        assert_eq!(count, 4);
        assert_eq!(index, vec![0, 3, 0]);
    }

    #[test]
    fn labels_follow_width() {
        let start = bucket_start(datetime!(2024-01-02 10:15:00), 60);
        assert_eq!(label(start, 1), "10:15:00");
        assert_eq!(label(start, 300), "2024-01-02 10:15");
        assert_eq!(label(start, 86_400), "2024-01-02");
    }
}
