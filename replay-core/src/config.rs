use crate::error::CoreError;
use crate::target::Target;
use figment::{Figment, providers::{Env, Format, Yaml}};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level replay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Origin that all replayed requests are sent to.
    #[serde(default)]
    pub target: Option<String>,
    /// JSON-lines file of log records. `-` reads stdin.
    #[serde(default = "default_input")]
    pub input: PathBuf,
    /// Maximum replay attempts in flight.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Lines dispatched per second. `None` = as fast as concurrency allows.
    #[serde(default)]
    pub max_rate: Option<u32>,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub replay: ReplaySettings,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP client settings for the replay transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Whole request/response cycle, body included.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    /// TCP connect plus TLS handshake.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_tcp_keepalive")]
    pub tcp_keepalive_secs: u64,
    #[serde(default = "default_per_host_cap")]
    pub max_idle_per_host: usize,
    /// Requests beyond this per host wait for a slot instead of failing.
    #[serde(default = "default_per_host_cap")]
    pub max_conns_per_host: usize,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    /// Accept any certificate from the target. Replay targets are often
    /// staging hosts with self-signed or mismatched certificates.
    #[serde(default = "default_true")]
    pub skip_tls_verify: bool,
}

/// Request shaping applied to every replayed line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplaySettings {
    #[serde(default = "default_accept_language")]
    pub accept_language: String,
}

/// Observability settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// How often the reporter logs interval counters.
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
    #[serde(default)]
    pub prometheus: PrometheusConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    /// When false, no prometheus counters are updated on the hot path.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_addr")]
    pub addr: String,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

// ── Defaults ──────────────────────────────────────────────────

fn default_input() -> PathBuf { PathBuf::from("-") }
fn default_concurrency() -> usize { 64 }
fn default_request_timeout() -> u64 { 10_000 }
fn default_connect_timeout() -> u64 { 30_000 }
fn default_tcp_keepalive() -> u64 { 30 }
fn default_per_host_cap() -> usize { 2048 }
fn default_idle_timeout() -> u64 { 90 }
fn default_true() -> bool { true }
fn default_accept_language() -> String { "en-US;q=0.9,en;q=0.8".into() }
fn default_report_interval() -> u64 { 1 }
fn default_metrics_addr() -> String { "0.0.0.0:9464".into() }
fn default_metrics_path() -> String { "/metrics".into() }

// ── Impls ─────────────────────────────────────────────────────

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            target: None,
            input: default_input(),
            concurrency: default_concurrency(),
            max_rate: None,
            transport: TransportConfig::default(),
            replay: ReplaySettings::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout(),
            connect_timeout_ms: default_connect_timeout(),
            tcp_keepalive_secs: default_tcp_keepalive(),
            max_idle_per_host: default_per_host_cap(),
            max_conns_per_host: default_per_host_cap(),
            idle_timeout_secs: default_idle_timeout(),
            skip_tls_verify: true,
        }
    }
}

impl Default for ReplaySettings {
    fn default() -> Self {
        Self {
            accept_language: default_accept_language(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: default_report_interval(),
            prometheus: PrometheusConfig::default(),
        }
    }
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: default_metrics_addr(),
            path: default_metrics_path(),
        }
    }
}

impl TransportConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn tcp_keepalive(&self) -> Duration {
        Duration::from_secs(self.tcp_keepalive_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl ObservabilityConfig {
    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }
}

impl ReplayConfig {
    /// Load configuration from YAML file + env overrides.
    ///
    /// Env keys use `__` for nesting: `REPLAY_TRANSPORT__REQUEST_TIMEOUT_MS`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let config: ReplayConfig = Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("REPLAY_").split("__"))
            .extract()?;
        Ok(config)
    }

    /// Reject values that would stall or misconfigure a run.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.concurrency == 0 {
            return Err(CoreError::Config("concurrency must be at least 1".into()));
        }
        if self.max_rate == Some(0) {
            return Err(CoreError::Config("max_rate must be positive when set".into()));
        }
        if self.transport.max_conns_per_host == 0 {
            return Err(CoreError::Config(
                "transport.max_conns_per_host must be at least 1".into(),
            ));
        }
        if self.transport.request_timeout_ms == 0 {
            return Err(CoreError::Config(
                "transport.request_timeout_ms must be positive".into(),
            ));
        }
        if self.observability.report_interval_secs == 0 {
            return Err(CoreError::Config(
                "observability.report_interval_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Parse the configured target, if any.
    pub fn target(&self) -> Result<Option<Target>, CoreError> {
        self.target.as_deref().map(Target::parse).transpose()
    }
}
