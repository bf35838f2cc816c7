//! Derived metrics: uptime, incremental response-time statistics and chart retention
//!
//! Everything here is a pure function over counters. The engine owns the
//! state and calls into this module for every applied check.

use std::collections::VecDeque;

use crate::types::{ChartPoint, StatsAggregate};

/// Percentage of successful checks, `100` when nothing has been checked yet
pub fn uptime_percentage(successful: u64, total: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (successful as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}

/// Running mean after adding `value` as the `count`-th sample
pub fn incremental_mean(mean: f64, value: f64, count: u64) -> f64 {
    if count <= 1 {
        return value;
    }
    mean + (value - mean) / count as f64
}

/// A response time that may contribute to avg/min/max
fn usable_response(success: bool, response_ms: Option<f64>) -> Option<f64> {
    if !success {
        return None;
    }
    response_ms.filter(|v| v.is_finite() && *v >= 0.0)
}

/// Fold one check result into `stats`.
///
/// `samples` is the number of response times already folded into the mean;
/// the updated count is returned alongside the new aggregate.
pub fn fold_check(
    stats: &StatsAggregate,
    samples: u64,
    success: bool,
    response_ms: Option<f64>,
) -> (StatsAggregate, u64) {
    let mut next = stats.clone();
    next.total_checks += 1;
    if success {
        next.successful_checks += 1;
    } else {
        next.failed_checks += 1;
    }
    next.uptime_percentage = uptime_percentage(next.successful_checks, next.total_checks);

    let mut samples = samples;
    if let Some(value) = usable_response(success, response_ms) {
        samples += 1;
        if samples == 1 {
            next.avg_response_time = value;
            next.min_response_time = Some(value);
            next.max_response_time = Some(value);
        } else {
            next.avg_response_time = incremental_mean(next.avg_response_time, value, samples);
            next.min_response_time = Some(next.min_response_time.map_or(value, |m| m.min(value)));
            next.max_response_time = Some(next.max_response_time.map_or(value, |m| m.max(value)));
        }
    }

    (next, samples)
}

/// Append to a bounded series, evicting the oldest entries beyond `window`
pub fn push_bounded<T>(series: &mut VecDeque<T>, item: T, window: usize) {
    series.push_back(item);
    while series.len() > window {
        series.pop_front();
    }
}

/// Insert a chart point keeping the series ascending by timestamp.
///
/// In-order points are a plain bounded append. A late point is slotted into
/// place; if it is older than everything a full window retains, it is the
/// one evicted.
pub fn push_ordered(series: &mut VecDeque<ChartPoint>, point: ChartPoint, window: usize) {
    let in_order = series
        .back()
        .map_or(true, |last| last.timestamp <= point.timestamp);
    if in_order {
        push_bounded(series, point, window);
        return;
    }
    let index = series.partition_point(|p| p.timestamp <= point.timestamp);
    series.insert(index, point);
    while series.len() > window {
        series.pop_front();
    }
}

/// Order backend chart data ascending and keep the most recent `window` points
pub fn retain_recent(mut points: Vec<ChartPoint>, window: usize) -> VecDeque<ChartPoint> {
    points.sort_by_key(|p| p.timestamp);
    let skip = points.len().saturating_sub(window);
    points.into_iter().skip(skip).collect()
}
