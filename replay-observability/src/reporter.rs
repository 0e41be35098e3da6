use crate::stats::{ReplayStats, StatsSnapshot};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Counters for one reporting interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalReport {
    pub success: u64,
    pub failure: u64,
    pub requests_per_sec: f64,
    pub mean_latency_ms: f64,
}

impl IntervalReport {
    /// Delta between two snapshots taken `elapsed` apart.
    pub fn between(prev: &StatsSnapshot, cur: &StatsSnapshot, elapsed: Duration) -> Self {
        let delta = StatsSnapshot {
            success: cur.success.saturating_sub(prev.success),
            failure: cur.failure.saturating_sub(prev.failure),
            latency_ms: cur.latency_ms.saturating_sub(prev.latency_ms),
        };
        let secs = elapsed.as_secs_f64();
        let requests_per_sec = if secs > 0.0 {
            delta.completed() as f64 / secs
        } else {
            0.0
        };
        Self {
            success: delta.success,
            failure: delta.failure,
            requests_per_sec,
            mean_latency_ms: delta.mean_latency_ms(),
        }
    }
}

/// Periodic log reporter for the replay counters.
pub struct Reporter;

impl Reporter {
    /// Log interval counters every `every` until `cancel` fires.
    ///
    /// The task resolves to the final snapshot so callers can print a summary.
    pub fn spawn(
        stats: Arc<ReplayStats>,
        every: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<StatsSnapshot> {
        tokio::spawn(Self::report_loop(stats, every, cancel))
    }

    async fn report_loop(
        stats: Arc<ReplayStats>,
        every: Duration,
        cancel: CancellationToken,
    ) -> StatsSnapshot {
        let mut tick = interval(every);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately.
        tick.tick().await;

        let mut prev = stats.snapshot();
        let mut last = tokio::time::Instant::now();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tick.tick() => {
                    let cur = stats.snapshot();
                    let now = tokio::time::Instant::now();
                    let report = IntervalReport::between(&prev, &cur, now - last);
                    info!(
                        success = report.success,
                        failure = report.failure,
                        rps = report.requests_per_sec,
                        mean_latency_ms = report.mean_latency_ms,
                        total = cur.completed(),
                        "Replay progress"
                    );
                    prev = cur;
                    last = now;
                }
            }
        }

        stats.snapshot()
    }
}
