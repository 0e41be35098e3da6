// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  replay: access-log traffic replayer
//
//  Input:     JSON-lines log records (file or stdin)
//  Engine:    one shared pooled HTTP client, bounded concurrency
//  Reporting: periodic log lines + optional Prometheus scrape endpoint
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

mod input;

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use anyhow::Context;
use clap::Parser;
use replay_core::config::ReplayConfig;
use replay_core::{OutcomeRecorder, Target};
use replay_engine::{Driver, HttpTransport, Replayer, Transport};
use replay_observability::{MetricsCollector, ReplayStats, Reporter, exporter};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "replay", version, about = "Replay captured HTTP access logs against a live target")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "replay.yaml")]
    config: PathBuf,

    /// Target origin, e.g. https://staging.example.com (overrides config)
    #[arg(short, long)]
    target: Option<String>,

    /// JSON-lines input file, `-` for stdin (overrides config)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Maximum replays in flight (overrides config)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Lines dispatched per second (overrides config)
    #[arg(long)]
    max_rate: Option<u32>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ── Tracing ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "replay starting");

    // ── Config ──
    let mut config = if cli.config.exists() {
        info!(path = %cli.config.display(), "Loading config file");
        ReplayConfig::load(&cli.config)?
    } else {
        info!("No config file found, using defaults");
        ReplayConfig::default()
    };
    apply_overrides(&mut config, &cli);
    config.validate()?;

    let target: Target = config
        .target()?
        .context("no target configured: pass --target or set `target` in the config file")?;

    // ── Raise file-descriptor limit (EMFILE guard) ──
    #[cfg(unix)]
    raise_fd_limit(config.transport.max_conns_per_host + config.concurrency + 256);

    // ── Accounting ──
    let metrics = Arc::new(MetricsCollector::new(config.observability.prometheus.enabled)?);
    let stats = Arc::new(if metrics.is_enabled() {
        ReplayStats::with_metrics(Arc::clone(&metrics))
    } else {
        ReplayStats::new()
    });

    // ── Transport + replayer (built once, shared by every attempt) ──
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&config.transport)?);
    let recorder: Arc<dyn OutcomeRecorder> = stats.clone();
    let replayer = Arc::new(Replayer::with_settings(transport, recorder, &config.replay)?);

    // ── Shutdown ──
    let cancel = CancellationToken::new();
    tokio::spawn(wait_for_shutdown(cancel.clone()));

    // ── Metrics endpoint ──
    let background = CancellationToken::new();
    let exporter_handle = if metrics.is_enabled() {
        let prom = &config.observability.prometheus;
        let listener = tokio::net::TcpListener::bind(&prom.addr)
            .await
            .with_context(|| format!("binding metrics endpoint on {}", prom.addr))?;
        let path = prom.path.clone();
        let metrics = Arc::clone(&metrics);
        let stop = background.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = exporter::serve(listener, &path, metrics, stop).await {
                error!(error = %e, "Metrics endpoint failed");
            }
        }))
    } else {
        None
    };

    // ── Reporter ──
    let reporter = Reporter::spawn(
        Arc::clone(&stats),
        config.observability.report_interval(),
        background.clone(),
    );

    // ── Input → driver ──
    let (tx, rx) = mpsc::channel(config.concurrency.saturating_mul(2).max(1));
    let input_path = config.input.clone();
    let reader_cancel = cancel.clone();
    let reader = tokio::spawn(async move { input::read_lines(&input_path, tx, reader_cancel).await });

    let driver = Driver::new(replayer, target, config.concurrency).with_max_rate(config.max_rate);
    let summary = driver.run(rx, cancel.clone()).await;

    match reader.await {
        Ok(Ok(input)) => info!(read = input.read, skipped = input.skipped, "Input consumed"),
        Ok(Err(e)) => error!(error = %e, "Reading input failed"),
        Err(e) => error!(error = %e, "Input reader task failed"),
    }

    background.cancel();
    let totals = reporter.await?;
    if let Some(handle) = exporter_handle {
        let _ = handle.await;
    }

    info!(
        dispatched = summary.dispatched,
        errors = summary.errors,
        success = totals.success,
        failure = totals.failure,
        mean_latency_ms = totals.mean_latency_ms(),
        "replay finished"
    );
    Ok(())
}

fn apply_overrides(config: &mut ReplayConfig, cli: &Cli) {
    if let Some(ref target) = cli.target {
        config.target = Some(target.clone());
    }
    if let Some(ref input) = cli.input {
        config.input = input.clone();
    }
    if let Some(concurrency) = cli.concurrency {
        config.concurrency = concurrency;
    }
    if cli.max_rate.is_some() {
        config.max_rate = cli.max_rate;
    }
}

/// Cancel the run on Ctrl+C or SIGTERM.
async fn wait_for_shutdown(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable, Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("Shutdown signal received, stopping...");
    cancel.cancel();
}

/// Raise RLIMIT_NOFILE to min(hard_limit, wanted) so the transport can hold
/// a full per-host pool without hitting EMFILE (os error 24).
#[cfg(unix)]
fn raise_fd_limit(wanted: usize) {
    unsafe {
        let mut rl = libc::rlimit { rlim_cur: 0, rlim_max: 0 };
        if libc::getrlimit(libc::RLIMIT_NOFILE, &mut rl) != 0 {
            tracing::warn!("getrlimit(RLIMIT_NOFILE) failed, fd limit unchanged");
            return;
        }
        let wanted = wanted as libc::rlim_t;
        let hard = rl.rlim_max;
        let target: libc::rlim_t = if hard == libc::RLIM_INFINITY || hard > wanted {
            wanted
        } else {
            hard
        };
        if rl.rlim_cur >= target {
            tracing::debug!(limit = rl.rlim_cur, "fd limit already sufficient");
            return;
        }
        rl.rlim_cur = target;
        if libc::setrlimit(libc::RLIMIT_NOFILE, &rl) != 0 {
            tracing::warn!(
                tried = target,
                "setrlimit(RLIMIT_NOFILE) failed, run 'ulimit -n' higher \
                 or lower transport.max_conns_per_host"
            );
        } else {
            tracing::info!(limit = target, "File descriptor limit raised");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_replace_config_values() {
        let cli = Cli::parse_from([
            "replay",
            "--target",
            "https://replay.test",
            "--input",
            "traffic.jsonl",
            "--concurrency",
            "12",
            "--max-rate",
            "300",
        ]);
        let mut config = ReplayConfig::default();
        apply_overrides(&mut config, &cli);

        assert_eq!(config.target.as_deref(), Some("https://replay.test"));
        assert_eq!(config.input, PathBuf::from("traffic.jsonl"));
        assert_eq!(config.concurrency, 12);
        assert_eq!(config.max_rate, Some(300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn cli_without_overrides_keeps_config() {
        let cli = Cli::parse_from(["replay"]);
        let mut config = ReplayConfig {
            target: Some("http://10.0.0.1".into()),
            max_rate: Some(5),
            ..ReplayConfig::default()
        };
        apply_overrides(&mut config, &cli);

        assert_eq!(config.target.as_deref(), Some("http://10.0.0.1"));
        assert_eq!(config.max_rate, Some(5));
        assert_eq!(cli.config, PathBuf::from("replay.yaml"));
        assert_eq!(cli.log_level, "info");
    }
}
