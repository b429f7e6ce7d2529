//! Trend and anomaly statistics over bucket volumes.

use serde::{Deserialize, Serialize};

/// Rolling-mean window used for the trend line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendWindow {
    /// A fixed number of buckets.
    Fixed(usize),
    /// One tenth of the bucket count, at least one.
    Proportional,
}

impl TrendWindow {
    pub fn size(&self, buckets: usize) -> usize {
        match *self {
            TrendWindow::Fixed(n) => n.max(1),
            TrendWindow::Proportional => (buckets / 10).max(1),
        }
    }
}

/// Anomaly behaviour when every bucket has the same volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroStddev {
    /// Use a standard deviation of 1.
    TreatAsOne,
    /// Flag nothing.
    FlagNone,
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
pub fn stddev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Centered rolling mean. Positions the window does not fully cover are
/// filled from the nearest computed value, forward first; when no window
/// fits at all every position gets the overall mean.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    let window = window.max(1);
    let mut out: Vec<Option<f64>> = vec![None; n];
    for (i, slot) in out.iter_mut().enumerate() {
        let Some(start) = i.checked_sub(window / 2) else {
            continue;
        };
        let end = start + window;
        if end <= n {
            *slot = Some(values[start..end].iter().sum::<f64>() / window as f64);
        }
    }

    let mut last = None;
    for slot in out.iter_mut() {
        match slot {
            Some(v) => last = Some(*v),
            None => *slot = last,
        }
    }
    let mut next = None;
    for slot in out.iter_mut().rev() {
        match slot {
            Some(v) => next = Some(*v),
            None => *slot = next,
        }
    }

    let fallback = mean(values);
    out.into_iter().map(|v| v.unwrap_or(fallback)).collect()
}

/// Flags volumes at or above `mean + 2σ` of the whole series.
pub fn anomalies(values: &[f64], guard: ZeroStddev) -> Vec<bool> {
    let m = mean(values);
    let mut sigma = stddev(values);
    if sigma == 0.0 {
        match guard {
            ZeroStddev::TreatAsOne => sigma = 1.0,
            ZeroStddev::FlagNone => return vec![false; values.len()],
        }
    }
    let threshold = m + 2.0 * sigma;
    values.iter().map(|&v| v >= threshold).collect()
}

/// Round to one decimal place.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
