use crate::error::ReplayError;
use crate::replayer::{Completed, Replayer};
use replay_core::{LogLine, Target};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{Interval, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Totals for one driver run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Lines handed to the replayer.
    pub dispatched: u64,
    /// Attempts that finished, with or without an error.
    pub completed: u64,
    /// Attempts that finished with an error.
    pub errors: u64,
}

/// Feeds log lines to the replayer with bounded concurrency.
///
/// Each line is replayed once in its own task. A failed line never stops the
/// run.
pub struct Driver {
    replayer: Arc<Replayer>,
    target: Arc<Target>,
    concurrency: usize,
    max_rate: Option<u32>,
}

impl Driver {
    pub fn new(replayer: Arc<Replayer>, target: Target, concurrency: usize) -> Self {
        Self {
            replayer,
            target: Arc::new(target),
            concurrency: concurrency.max(1),
            max_rate: None,
        }
    }

    /// Cap dispatch at `rate` lines per second.
    pub fn with_max_rate(mut self, rate: Option<u32>) -> Self {
        self.max_rate = rate.filter(|r| *r > 0);
        self
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Replay every line received on `lines` until the channel closes or
    /// `cancel` fires, then wait for in-flight attempts.
    pub async fn run(&self, mut lines: mpsc::Receiver<LogLine>, cancel: CancellationToken) -> RunSummary {
        let slots = Arc::new(Semaphore::new(self.concurrency));
        let mut pace = self.max_rate.map(pacer);
        let mut tasks: JoinSet<Result<Completed, ReplayError>> = JoinSet::new();
        let mut summary = RunSummary::default();

        info!(
            origin = %self.target,
            concurrency = self.concurrency,
            max_rate = ?self.max_rate,
            "Replay run starting"
        );

        loop {
            let line = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = lines.recv() => match next {
                    Some(line) => line,
                    None => break,
                },
            };

            if let Some(ref mut pace) = pace {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = pace.tick() => {}
                }
            }

            let slot = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                slot = Arc::clone(&slots).acquire_owned() => match slot {
                    Ok(slot) => slot,
                    Err(_) => break,
                },
            };

            while let Some(done) = tasks.try_join_next() {
                tally(&mut summary, done);
            }

            let replayer = Arc::clone(&self.replayer);
            let target = Arc::clone(&self.target);
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let _slot = slot;
                replayer.replay(&cancel, &target, &line).await
            });
            summary.dispatched += 1;
        }

        while let Some(done) = tasks.join_next().await {
            tally(&mut summary, done);
        }

        info!(
            dispatched = summary.dispatched,
            completed = summary.completed,
            errors = summary.errors,
            cancelled = cancel.is_cancelled(),
            "Replay run finished"
        );
        summary
    }
}

fn pacer(rate: u32) -> Interval {
    let mut tick = interval(Duration::from_secs_f64(1.0 / f64::from(rate)));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tick
}

fn tally(summary: &mut RunSummary, done: Result<Result<Completed, ReplayError>, JoinError>) {
    match done {
        Ok(Ok(_)) => summary.completed += 1,
        Ok(Err(e)) => {
            summary.completed += 1;
            summary.errors += 1;
            debug!(error = %e, stage = ?e.stage(), "Replay attempt failed");
        }
        Err(e) => {
            warn!(error = %e, "Replay task aborted");
        }
    }
}
