pub mod reporter;
pub mod stats;

#[cfg(feature = "prometheus")]
pub mod metrics;

#[cfg(feature = "prometheus")]
pub mod exporter;

pub use reporter::{IntervalReport, Reporter};
pub use stats::{ReplayStats, StatsSnapshot};

#[cfg(feature = "prometheus")]
pub use metrics::MetricsCollector;
