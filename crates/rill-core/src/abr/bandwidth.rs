//! Two-timescale bandwidth estimation fed by per-request samples
//!
//! A fast and a slow EWMA track observed throughput; taking the minimum
//! of the two is deliberately pessimistic, so the estimate collapses
//! quickly on sudden drops but rises slowly. In low-latency mode a
//! separate 3-sample window over chunked transfers filters out samples
//! that look server-paced rather than link-limited.

use super::ewma::Ewma;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, trace};

/// Half-life of the fast EWMA in seconds
const DEFAULT_FAST_HALF_LIFE: f64 = 2.0;
/// Half-life of the slow EWMA in seconds
const DEFAULT_SLOW_HALF_LIFE: f64 = 10.0;
/// No estimate until this many bytes have been sampled
const DEFAULT_MIN_TOTAL_BYTES: u64 = 150_000;
/// Samples smaller than this are not representative
const DEFAULT_MIN_CHUNK_BYTES: u64 = 16_000;
/// Chunk window length for the low-latency filter
const CHUNK_WINDOW: usize = 3;

/// Bandwidth estimator tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatorConfig {
    pub fast_half_life: f64,
    pub slow_half_life: f64,
    pub min_total_bytes: u64,
    pub min_chunk_bytes: u64,
    pub low_latency_mode: bool,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            fast_half_life: DEFAULT_FAST_HALF_LIFE,
            slow_half_life: DEFAULT_SLOW_HALF_LIFE,
            min_total_bytes: DEFAULT_MIN_TOTAL_BYTES,
            min_chunk_bytes: DEFAULT_MIN_CHUNK_BYTES,
            low_latency_mode: false,
        }
    }
}

/// Fast/slow EWMA pair plus the low-latency chunk window
#[derive(Debug)]
pub struct BandwidthEstimator {
    config: EstimatorConfig,
    fast: Ewma,
    slow: Ewma,
    bytes_sampled: u64,
    chunk_window: VecDeque<f64>,
}

impl BandwidthEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        let fast = Ewma::new(config.fast_half_life);
        let slow = Ewma::new(config.slow_half_life);
        Self {
            config,
            fast,
            slow,
            bytes_sampled: 0,
            chunk_window: VecDeque::with_capacity(CHUNK_WINDOW),
        }
    }

    /// Feed one download sample.
    ///
    /// Chunked samples in low-latency mode go through the pacing filter
    /// first: a bandwidth that lands just under the recent chunk plateau
    /// (`0.8 * mean < bw <= mean`) indicates the origin is rate-limiting
    /// delivery, and the sample is dropped without touching any state.
    pub fn add_sample(&mut self, duration_ms: f64, bytes: u64, is_chunk: bool) {
        if duration_ms <= 0.0 {
            return;
        }
        let bandwidth = bytes as f64 * 8000.0 / duration_ms;

        if is_chunk && self.config.low_latency_mode {
            if let Some(plateau) = self.chunk_mean() {
                if plateau * 0.8 < bandwidth && bandwidth <= plateau {
                    trace!(bandwidth, plateau, "Dropping server-paced chunk sample");
                    return;
                }
            }
            if self.chunk_window.len() == CHUNK_WINDOW {
                self.chunk_window.pop_front();
            }
            self.chunk_window.push_back(bandwidth);
        }

        if bytes < self.config.min_chunk_bytes {
            return;
        }

        self.bytes_sampled += bytes;
        let weight = duration_ms / 1000.0;
        self.fast.add_sample(weight, bandwidth);
        self.slow.add_sample(weight, bandwidth);

        trace!(
            bytes,
            duration_ms,
            bandwidth_mbps = bandwidth / 1_000_000.0,
            "Bandwidth sample recorded"
        );
    }

    /// Current estimate in bits per second.
    ///
    /// `server_may_limit` marks contexts (media segments in low-latency
    /// streaming) where the origin may be pacing delivery; the chunk
    /// window then provides a floor above the paced EWMA value.
    pub fn get_estimate(&self, server_may_limit: bool) -> Option<f64> {
        let regular = if self.bytes_sampled < self.config.min_total_bytes {
            None
        } else {
            match (self.fast.get_estimate(), self.slow.get_estimate()) {
                (Some(f), Some(s)) => Some(f.min(s)),
                (f, s) => f.or(s),
            }
        };

        if !self.config.low_latency_mode || !server_may_limit {
            return regular;
        }

        let low_latency = if self.chunk_window.len() == CHUNK_WINDOW {
            self.chunk_mean()
        } else {
            None
        };

        match (regular, low_latency) {
            (Some(r), Some(l)) => Some(r.max(l)),
            (r, l) => r.or(l),
        }
    }

    /// Rebuild both EWMAs and forget everything sampled so far.
    ///
    /// The chunk window is cleared as well: a stale plateau from the
    /// previous content would otherwise poison the pacing filter.
    pub fn reset(&mut self) {
        debug!("Resetting bandwidth estimator");
        self.fast = Ewma::new(self.config.fast_half_life);
        self.slow = Ewma::new(self.config.slow_half_life);
        self.bytes_sampled = 0;
        self.chunk_window.clear();
    }

    pub fn bytes_sampled(&self) -> u64 {
        self.bytes_sampled
    }

    fn chunk_mean(&self) -> Option<f64> {
        if self.chunk_window.len() < CHUNK_WINDOW {
            return None;
        }
        Some(self.chunk_window.iter().sum::<f64>() / self.chunk_window.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn low_latency_config() -> EstimatorConfig {
        EstimatorConfig { low_latency_mode: true, ..EstimatorConfig::default() }
    }

    /// 500 KB over 6667 ms is roughly 600 kbps
    fn feed_steady_600kbps(estimator: &mut BandwidthEstimator, n: usize) {
        for _ in 0..n {
            estimator.add_sample(6667.0, 500_000, false);
        }
    }

    #[test]
    fn test_no_estimate_before_min_total_bytes() {
        let mut estimator = BandwidthEstimator::new(EstimatorConfig::default());
        estimator.add_sample(1000.0, 100_000, false);
        assert!(estimator.get_estimate(false).is_none());
        estimator.add_sample(1000.0, 100_000, false);
        assert!(estimator.get_estimate(false).is_some());
    }

    #[test]
    fn test_steady_stream_estimate_accuracy() {
        let mut estimator = BandwidthEstimator::new(EstimatorConfig::default());
        feed_steady_600kbps(&mut estimator, 20);
        let estimate = estimator.get_estimate(false).unwrap();
        assert!((estimate - 600_000.0).abs() / 600_000.0 < 0.10);
    }

    #[test]
    fn test_tiny_samples_are_dropped() {
        let mut estimator = BandwidthEstimator::new(EstimatorConfig::default());
        for _ in 0..100 {
            estimator.add_sample(10.0, 1_000, false);
        }
        assert_eq!(estimator.bytes_sampled(), 0);
        assert!(estimator.get_estimate(false).is_none());
    }

    #[test]
    fn test_chunk_filter_rejects_paced_sample() {
        let mut estimator = BandwidthEstimator::new(low_latency_config());
        // fill the window with a 4 Mbps plateau: 500 KB chunks over 1 s
        for _ in 0..3 {
            estimator.add_sample(1000.0, 500_000, true);
        }
        let bytes_before = estimator.bytes_sampled();
        let window_before = estimator.chunk_window.clone();

        // 3.6 Mbps falls in (0.8 * 4M, 4M]: server pacing, not capacity
        estimator.add_sample(1000.0, 450_000, true);

        assert_eq!(estimator.bytes_sampled(), bytes_before);
        assert_eq!(estimator.chunk_window, window_before);
    }

    #[test]
    fn test_chunk_above_plateau_is_accepted() {
        let mut estimator = BandwidthEstimator::new(low_latency_config());
        for _ in 0..3 {
            estimator.add_sample(1000.0, 500_000, true);
        }
        // 6 Mbps exceeds the plateau: link capacity grew
        estimator.add_sample(1000.0, 750_000, true);
        assert_eq!(estimator.chunk_window.back().copied(), Some(6_000_000.0));
    }

    #[test]
    fn test_low_latency_estimate_prefers_chunk_window() {
        let mut estimator = BandwidthEstimator::new(low_latency_config());
        // paced EWMA samples at 1 Mbps, chunk window at 4 Mbps
        for _ in 0..10 {
            estimator.add_sample(4000.0, 500_000, false);
        }
        for _ in 0..3 {
            estimator.add_sample(100.0, 50_000, true);
        }
        let with_limit = estimator.get_estimate(true).unwrap();
        let without_limit = estimator.get_estimate(false).unwrap();
        assert!(with_limit > without_limit);
        assert!((with_limit - 4_000_000.0).abs() < 1.0);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut estimator = BandwidthEstimator::new(low_latency_config());
        feed_steady_600kbps(&mut estimator, 10);
        for _ in 0..3 {
            estimator.add_sample(1000.0, 500_000, true);
        }
        estimator.reset();
        assert_eq!(estimator.bytes_sampled(), 0);
        assert!(estimator.get_estimate(true).is_none());
        assert!(estimator.chunk_window.is_empty());
    }
}
