//! Statistical primitives shared by the analysis catalog.
//!
//! Every function here is total over its input: empty or single-point
//! series produce explicit "no data" values (`None`, empty vectors) or
//! guarded zeros instead of NaN, and zero denominators are neutralized
//! where each routine's contract documents it.

use crate::models::{Reading, TimeSeries};
use chrono::{DateTime, Duration, NaiveDateTime};

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n-1 denominator).
///
/// Guarded to 0.0 for fewer than two points so single-reading series
/// never propagate NaN.
pub fn sample_std(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(values).unwrap_or(0.0);
    let sum_sq: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    (sum_sq / (n - 1) as f64).sqrt()
}

/// Coefficient of variation (std / mean), 0.0 when the mean is zero.
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    let m = mean(values).unwrap_or(0.0);
    if m == 0.0 {
        return 0.0;
    }
    sample_std(values) / m
}

/// Trailing rolling mean with a minimum of one sample per window.
///
/// The first `window - 1` positions are computed over the points
/// available so far.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            mean(&values[start..=i]).unwrap_or(0.0)
        })
        .collect()
}

/// Trailing rolling sample standard deviation, minimum one sample.
///
/// Single-point windows are guarded to 0.0.
pub fn rolling_std(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            sample_std(&values[start..=i])
        })
        .collect()
}

/// Median, `None` for an empty slice.
pub fn median(values: &[f64]) -> Option<f64> {
    quantile(values, 0.5)
}

/// Median absolute deviation, `None` for an empty slice.
pub fn mad(values: &[f64]) -> Option<f64> {
    let med = median(values)?;
    let deviations: Vec<f64> = values.iter().map(|v| (v - med).abs()).collect();
    median(&deviations)
}

/// Quantile by linear interpolation over the sorted values.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    if lower == upper {
        return Some(sorted[lower]);
    }
    let weight = pos - lower as f64;
    Some(sorted[lower] * (1.0 - weight) + sorted[upper] * weight)
}

/// First and third quartiles, `None` for an empty slice.
pub fn quartiles(values: &[f64]) -> Option<(f64, f64)> {
    Some((quantile(values, 0.25)?, quantile(values, 0.75)?))
}

/// IQR outlier bounds: [Q1 - 1.5*IQR, Q3 + 1.5*IQR].
pub fn outlier_bounds(q1: f64, q3: f64) -> (f64, f64) {
    let iqr = q3 - q1;
    (q1 - 1.5 * iqr, q3 + 1.5 * iqr)
}

/// Standard z-score per value, with a zero std guarded to 1.
pub fn zscores(values: &[f64]) -> Vec<f64> {
    let m = mean(values).unwrap_or(0.0);
    let mut std = sample_std(values);
    if std == 0.0 {
        std = 1.0;
    }
    values.iter().map(|v| (v - m) / std).collect()
}

/// Robust z-score per value: 0.6745 * (x - median) / MAD, with a zero
/// MAD guarded to 1.
pub fn robust_zscores(values: &[f64]) -> Vec<f64> {
    let med = median(values).unwrap_or(0.0);
    let mut deviation = mad(values).unwrap_or(1.0);
    if deviation == 0.0 {
        deviation = 1.0;
    }
    values.iter().map(|v| 0.6745 * (v - med) / deviation).collect()
}

/// Round to a fixed number of decimal places.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Parse a resampling frequency code into a period.
///
/// Codes follow the usual time-series shorthand: an optional count
/// followed by `S` (seconds), `T`/`MIN` (minutes), `H` (hours) or `D`
/// (days), case-insensitive. Examples: "H", "15T", "2d".
pub fn parse_frequency(code: &str) -> Option<Duration> {
    let trimmed = code.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (count_str, unit) = trimmed.split_at(split);
    let count: i64 = if count_str.is_empty() {
        1
    } else {
        count_str.parse().ok()?
    };
    if count <= 0 {
        return None;
    }

    let period = match unit.to_ascii_lowercase().as_str() {
        "s" | "sec" => Duration::seconds(count),
        "t" | "min" => Duration::minutes(count),
        "h" => Duration::hours(count),
        "d" => Duration::days(count),
        _ => return None,
    };
    Some(period)
}

/// Summary statistics for one resampling bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketSummary {
    /// Bucket start boundary.
    pub timestamp: NaiveDateTime,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

/// Resample a series into fixed, epoch-anchored buckets.
///
/// Only buckets that contain readings are emitted; a single-reading
/// bucket gets a guarded std of 0.0.
pub fn resample(series: &TimeSeries, period: Duration) -> Vec<BucketSummary> {
    let period_secs = period.num_seconds().max(1);
    let mut buckets: Vec<(i64, Vec<f64>)> = Vec::new();

    for reading in series.readings() {
        let secs = reading.timestamp.and_utc().timestamp();
        let start = secs.div_euclid(period_secs) * period_secs;
        match buckets.last_mut() {
            Some((current, values)) if *current == start => values.push(reading.value),
            _ => buckets.push((start, vec![reading.value])),
        }
    }

    buckets
        .into_iter()
        .filter_map(|(start, values)| {
            let timestamp = DateTime::from_timestamp(start, 0)?.naive_utc();
            Some(BucketSummary {
                timestamp,
                mean: mean(&values).unwrap_or(0.0),
                std: sample_std(&values),
                min: values.iter().copied().fold(f64::INFINITY, f64::min),
                max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            })
        })
        .collect()
}

/// Series aligned on a shared time axis; `None` marks a gap where a
/// series had no reading within tolerance.
#[derive(Debug, Clone)]
pub struct AlignedSeries {
    pub ids: Vec<String>,
    /// One column per id, all of equal length.
    pub columns: Vec<Vec<Option<f64>>>,
}

/// Align series on the first one's timestamps, taking each other
/// series' nearest reading within the tolerance.
pub fn align_series(series: &[(String, &TimeSeries)], tolerance: Duration) -> AlignedSeries {
    let ids: Vec<String> = series.iter().map(|(id, _)| id.clone()).collect();
    let mut columns: Vec<Vec<Option<f64>>> = Vec::with_capacity(series.len());

    let axis: Vec<NaiveDateTime> = series
        .first()
        .map(|(_, base)| base.readings().iter().map(|r| r.timestamp).collect())
        .unwrap_or_default();

    for (index, (_, ts)) in series.iter().enumerate() {
        if index == 0 {
            columns.push(ts.readings().iter().map(|r| Some(r.value)).collect());
        } else {
            columns.push(
                axis.iter()
                    .map(|t| nearest_within(ts.readings(), *t, tolerance))
                    .collect(),
            );
        }
    }

    AlignedSeries { ids, columns }
}

/// Nearest reading value within the tolerance, by binary search over
/// the ascending timestamps.
fn nearest_within(readings: &[Reading], target: NaiveDateTime, tolerance: Duration) -> Option<f64> {
    if readings.is_empty() {
        return None;
    }
    let idx = readings.partition_point(|r| r.timestamp < target);

    let mut best: Option<(Duration, f64)> = None;
    for candidate in [idx.checked_sub(1), Some(idx)].into_iter().flatten() {
        if let Some(reading) = readings.get(candidate) {
            let gap = (reading.timestamp - target).abs();
            if gap <= tolerance && best.map_or(true, |(b, _)| gap < b) {
                best = Some((gap, reading.value));
            }
        }
    }
    best.map(|(_, value)| value)
}

/// Pairwise-complete Pearson correlation matrix over aligned columns.
///
/// An entry is `None` when fewer than two complete pairs exist or when
/// either column has zero variance over the complete pairs.
pub fn pearson_matrix(aligned: &AlignedSeries) -> Vec<Vec<Option<f64>>> {
    let n = aligned.columns.len();
    let mut matrix = vec![vec![None; n]; n];
    for i in 0..n {
        for j in 0..n {
            matrix[i][j] = pearson(&aligned.columns[i], &aligned.columns[j]);
        }
    }
    matrix
}

fn pearson(a: &[Option<f64>], b: &[Option<f64>]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = a
        .iter()
        .zip(b.iter())
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .collect();
    if pairs.len() < 2 {
        return None;
    }

    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in &pairs {
        cov += (x - mean_x) * (y - mean_y);
        var_x += (x - mean_x).powi(2);
        var_y += (y - mean_y).powi(2);
    }
    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some(cov / (var_x.sqrt() * var_y.sqrt()))
}
