//! Rolling timing statistics.
//!
//! Lifetime counters (samples, total, max, last) plus a bounded history of
//! the most recent samples from which the p95 is read.

use std::collections::VecDeque;

use serde::Serialize;

/// Samples kept for percentile estimation.
pub const HISTORY_LIMIT: usize = 256;

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn u64_to_f64(value: u64) -> f64 {
    f64::from(u32::try_from(value).unwrap_or(u32::MAX))
}

/// One rolling metric.
#[derive(Debug, Clone, Default)]
pub struct RollingStats {
    samples: u64,
    total: f64,
    max: f64,
    last: f64,
    history: VecDeque<f64>,
}

/// Serialized view of a [`RollingStats`], rounded to two decimals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RollingSummary {
    /// Samples recorded over the lifetime.
    pub samples: u64,
    /// Most recent sample.
    pub last: f64,
    /// Lifetime mean.
    pub avg: f64,
    /// 95th percentile of the retained history.
    pub p95: f64,
    /// Lifetime maximum.
    pub max: f64,
}

impl RollingStats {
    /// Record one sample. Negative and non-finite values count as zero.
    pub fn record(&mut self, value: f64) {
        let value = if value.is_finite() { value.max(0.0) } else { 0.0 };
        self.samples = self.samples.saturating_add(1);
        self.total += value;
        self.last = value;
        self.max = self.max.max(value);
        self.history.push_back(value);
        if self.history.len() > HISTORY_LIMIT {
            self.history.pop_front();
        }
    }

    /// Value at `floor((n - 1) * 0.95)` of the sorted history.
    pub fn p95(&self) -> f64 {
        let mut sorted: Vec<f64> = self.history.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        let index = sorted
            .len()
            .saturating_sub(1)
            .saturating_mul(95)
            .checked_div(100)
            .unwrap_or(0);
        sorted.get(index).copied().unwrap_or(0.0)
    }

    /// Rounded summary.
    pub fn summary(&self) -> RollingSummary {
        let avg = if self.samples > 0 {
            self.total / u64_to_f64(self.samples)
        } else {
            0.0
        };
        RollingSummary {
            samples: self.samples,
            last: round2(self.last),
            avg: round2(avg),
            p95: round2(self.p95()),
            max: round2(self.max),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn empty_stats_are_zero() {
        let summary = RollingStats::default().summary();
        assert_eq!(summary.samples, 0);
        assert!(close(summary.p95, 0.0));
        assert!(close(summary.avg, 0.0));
    }

    #[test]
    fn summary_tracks_last_avg_and_max() {
        let mut stats = RollingStats::default();
        for value in [1.0, 4.0, 2.5, -3.0, f64::NAN] {
            stats.record(value);
        }
        let summary = stats.summary();
        assert_eq!(summary.samples, 5);
        assert!(close(summary.last, 0.0));
        assert!(close(summary.max, 4.0));
        assert!(close(summary.avg, 1.5));
    }

    #[test]
    fn p95_reads_from_the_sorted_history() {
        let mut stats = RollingStats::default();
        for value in (1..=20).rev() {
            stats.record(f64::from(value));
        }
        // floor(19 * 0.95) = 18 -> the 19th smallest value.
        assert!(close(stats.p95(), 19.0));
    }

    #[test]
    fn history_is_bounded() {
        let mut stats = RollingStats::default();
        for _ in 0..300 {
            stats.record(1.0);
        }
        stats.record(500.0);
        assert_eq!(stats.summary().samples, 301);
        assert_eq!(stats.history.len(), HISTORY_LIMIT);
        assert!(close(stats.summary().max, 500.0));
    }

    #[test]
    fn values_round_to_two_decimals() {
        let mut stats = RollingStats::default();
        stats.record(1.23456);
        assert!(close(stats.summary().last, 1.23));
    }
}
