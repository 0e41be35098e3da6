use replay_core::{Outcome, OutcomeRecorder};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[cfg(feature = "prometheus")]
use crate::metrics::MetricsCollector;
#[cfg(feature = "prometheus")]
use std::sync::Arc;

/// Process-wide replay counters.
///
/// Every update is a single `fetch_add`; readers take a `snapshot()` at any
/// time without coordinating with writers.
#[derive(Default)]
pub struct ReplayStats {
    success: AtomicU64,
    failure: AtomicU64,
    latency_ms: AtomicU64,
    #[cfg(feature = "prometheus")]
    metrics: Option<Arc<MetricsCollector>>,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub success: u64,
    pub failure: u64,
    pub latency_ms: u64,
}

impl StatsSnapshot {
    pub fn completed(&self) -> u64 {
        self.success + self.failure
    }

    /// Mean latency over completed attempts, 0 when nothing completed.
    pub fn mean_latency_ms(&self) -> f64 {
        match self.completed() {
            0 => 0.0,
            n => self.latency_ms as f64 / n as f64,
        }
    }
}

impl ReplayStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirror every update into a Prometheus collector as well.
    #[cfg(feature = "prometheus")]
    pub fn with_metrics(metrics: Arc<MetricsCollector>) -> Self {
        Self {
            metrics: Some(metrics),
            ..Self::default()
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            success: self.success.load(Ordering::Relaxed),
            failure: self.failure.load(Ordering::Relaxed),
            latency_ms: self.latency_ms.load(Ordering::Relaxed),
        }
    }

    pub fn success(&self) -> u64 {
        self.success.load(Ordering::Relaxed)
    }

    pub fn failure(&self) -> u64 {
        self.failure.load(Ordering::Relaxed)
    }

    pub fn latency_ms(&self) -> u64 {
        self.latency_ms.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for ReplayStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplayStats")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

impl OutcomeRecorder for ReplayStats {
    #[inline]
    fn record(&self, outcome: Outcome) {
        match outcome {
            Outcome::Success => self.success.fetch_add(1, Ordering::Relaxed),
            Outcome::Failure => self.failure.fetch_add(1, Ordering::Relaxed),
        };
        #[cfg(feature = "prometheus")]
        if let Some(ref metrics) = self.metrics {
            metrics.record_outcome(outcome);
        }
    }

    #[inline]
    fn add_latency(&self, elapsed: Duration) {
        let ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.fetch_add(ms, Ordering::Relaxed);
        #[cfg(feature = "prometheus")]
        if let Some(ref metrics) = self.metrics {
            metrics.observe_latency(elapsed);
        }
    }

    #[inline]
    fn observe_status(&self, status: u16) {
        #[cfg(feature = "prometheus")]
        if let Some(ref metrics) = self.metrics {
            metrics.record_status(status);
        }
        #[cfg(not(feature = "prometheus"))]
        let _ = status;
    }
}
