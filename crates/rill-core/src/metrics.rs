//! Metrics bus: fan-in of per-request download samples
//!
//! Pipelines hold cheap [`SampleReporter`] clones; one pump task drains
//! the channel, applies samples to the bandwidth estimator in emission
//! order and publishes the refreshed estimate on a last-value-cached
//! watch channel.

use crate::abr::{BandwidthEstimator, EstimatorConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// One completed or in-progress transfer observation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    pub at: DateTime<Utc>,
    /// Transfer duration in milliseconds, always positive
    pub duration_ms: f64,
    pub bytes: u64,
    /// True for intermediate chunked-transfer observations
    pub is_chunk: bool,
}

/// Cloneable handle pipelines use to emit samples
#[derive(Debug, Clone)]
pub struct SampleReporter {
    tx: mpsc::UnboundedSender<Sample>,
}

impl SampleReporter {
    pub fn report(&self, duration: Duration, bytes: u64, is_chunk: bool) {
        let duration_ms = duration.as_secs_f64() * 1000.0;
        if duration_ms <= 0.0 {
            return;
        }
        let _ = self.tx.send(Sample { at: Utc::now(), duration_ms, bytes, is_chunk });
    }
}

/// Cumulative transfer totals for diagnostics
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TransferTotals {
    pub samples: u64,
    pub bytes: u64,
}

/// Owns the estimator and the sample fan-in channel
pub struct MetricsBus {
    estimator: Arc<RwLock<BandwidthEstimator>>,
    tx: mpsc::UnboundedSender<Sample>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<Sample>>>,
    estimate_tx: watch::Sender<Option<f64>>,
    sample_count: AtomicU64,
    byte_count: AtomicU64,
}

impl MetricsBus {
    pub fn new(config: EstimatorConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (estimate_tx, _) = watch::channel(None);
        Self {
            estimator: Arc::new(RwLock::new(BandwidthEstimator::new(config))),
            tx,
            rx: Mutex::new(Some(rx)),
            estimate_tx,
            sample_count: AtomicU64::new(0),
            byte_count: AtomicU64::new(0),
        }
    }

    pub fn reporter(&self) -> SampleReporter {
        SampleReporter { tx: self.tx.clone() }
    }

    /// Last published estimate; receivers see a new value per sample
    pub fn estimate_watch(&self) -> watch::Receiver<Option<f64>> {
        self.estimate_tx.subscribe()
    }

    pub fn current_estimate(&self) -> Option<f64> {
        *self.estimate_tx.borrow()
    }

    pub fn totals(&self) -> TransferTotals {
        TransferTotals {
            samples: self.sample_count.load(Ordering::Relaxed),
            bytes: self.byte_count.load(Ordering::Relaxed),
        }
    }

    pub async fn reset(&self) {
        self.estimator.write().await.reset();
        self.estimate_tx.send_replace(None);
    }

    /// Drain samples into the estimator until cancelled.
    ///
    /// Returns immediately if the pump was already started.
    pub fn spawn_pump(self: &Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let bus = Arc::clone(self);
        tokio::spawn(async move {
            let Some(mut rx) = bus.rx.lock().await.take() else {
                return;
            };
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    sample = rx.recv() => {
                        let Some(sample) = sample else { break };
                        bus.apply(sample).await;
                    }
                }
            }
            trace!("Metrics pump stopped");
        })
    }

    async fn apply(&self, sample: Sample) {
        self.sample_count.fetch_add(1, Ordering::Relaxed);
        self.byte_count.fetch_add(sample.bytes, Ordering::Relaxed);

        let mut estimator = self.estimator.write().await;
        estimator.add_sample(sample.duration_ms, sample.bytes, sample.is_chunk);
        let estimate = estimator.get_estimate(true);
        drop(estimator);

        self.estimate_tx.send_replace(estimate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_samples_flow_into_estimate() {
        let bus = Arc::new(MetricsBus::new(EstimatorConfig::default()));
        let token = CancellationToken::new();
        let pump = bus.spawn_pump(token.clone());

        let reporter = bus.reporter();
        let mut watch = bus.estimate_watch();
        for _ in 0..5 {
            reporter.report(Duration::from_millis(1000), 250_000, false);
        }
        while bus.totals().samples < 5 {
            watch.changed().await.unwrap();
        }
        // 250 KB per second is 2 Mbps
        let estimate = bus.current_estimate().unwrap();
        assert!((estimate - 2_000_000.0).abs() / 2_000_000.0 < 0.10);
        assert_eq!(bus.totals().samples, 5);

        token.cancel();
        pump.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_pump_stops_consuming() {
        let bus = Arc::new(MetricsBus::new(EstimatorConfig::default()));
        let token = CancellationToken::new();
        let pump = bus.spawn_pump(token.clone());
        token.cancel();
        pump.await.unwrap();

        bus.reporter().report(Duration::from_millis(1000), 500_000, false);
        tokio::task::yield_now().await;
        assert_eq!(bus.totals().samples, 0);
    }

    #[tokio::test]
    async fn test_reset_clears_published_estimate() {
        let bus = Arc::new(MetricsBus::new(EstimatorConfig::default()));
        let token = CancellationToken::new();
        bus.spawn_pump(token.clone());

        let mut watch = bus.estimate_watch();
        bus.reporter().report(Duration::from_millis(1000), 500_000, false);
        watch.changed().await.unwrap();
        assert!(bus.current_estimate().is_some());

        bus.reset().await;
        assert!(bus.current_estimate().is_none());
        token.cancel();
    }
}
