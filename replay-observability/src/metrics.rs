use prometheus::{Histogram, HistogramOpts, IntCounterVec, Opts, Registry};
use replay_core::Outcome;
use std::time::Duration;

/// Metrics collector. Every counter is a no-op unless `enabled`.
///
/// When `enabled = false` no Registry is created and every record call is a
/// branch on a bool.
pub struct MetricsCollector {
    enabled: bool,
    registry: Option<Registry>,
    pub requests_total: Option<IntCounterVec>,
    pub responses_total: Option<IntCounterVec>,
    pub request_duration: Option<Histogram>,
}

impl MetricsCollector {
    /// Create a new collector. When `enabled = false`, everything is None.
    pub fn new(enabled: bool) -> anyhow::Result<Self> {
        if !enabled {
            return Ok(Self {
                enabled: false,
                registry: None,
                requests_total: None,
                responses_total: None,
                request_duration: None,
            });
        }

        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("requests_total", "Replay attempts by outcome").namespace("replay"),
            &["outcome"],
        )?;

        let responses_total = IntCounterVec::new(
            Opts::new("responses_total", "Responses received from the target by status")
                .namespace("replay"),
            &["status"],
        )?;

        let request_duration = Histogram::with_opts(
            HistogramOpts::new("request_duration_seconds", "Replay latency incl. body drain")
                .namespace("replay")
                .buckets(vec![
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ]),
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(responses_total.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;

        Ok(Self {
            enabled: true,
            registry: Some(registry),
            requests_total: Some(requests_total),
            responses_total: Some(responses_total),
            request_duration: Some(request_duration),
        })
    }

    #[inline]
    pub fn record_outcome(&self, outcome: Outcome) {
        if !self.enabled {
            return;
        }
        if let Some(ref counter) = self.requests_total {
            counter.with_label_values(&[outcome.as_str()]).inc();
        }
    }

    #[inline]
    pub fn record_status(&self, status: u16) {
        if !self.enabled {
            return;
        }
        if let Some(ref counter) = self.responses_total {
            let mut buf = itoa::Buffer::new();
            counter.with_label_values(&[buf.format(status)]).inc();
        }
    }

    #[inline]
    pub fn observe_latency(&self, elapsed: Duration) {
        if !self.enabled {
            return;
        }
        if let Some(ref hist) = self.request_duration {
            hist.observe(elapsed.as_secs_f64());
        }
    }

    /// Render prometheus text exposition format.
    pub fn render(&self) -> String {
        match self.registry {
            Some(ref registry) => crate::exporter::render_metrics(registry),
            None => String::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}
