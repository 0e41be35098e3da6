use replay_core::LogLine;
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Counters for one pass over the input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputStats {
    pub read: u64,
    pub skipped: u64,
}

/// Stream JSON-lines records from `path` (`-` = stdin) into `tx`.
pub async fn read_lines(
    path: &Path,
    tx: mpsc::Sender<LogLine>,
    cancel: CancellationToken,
) -> anyhow::Result<InputStats> {
    let stats = if path.as_os_str() == "-" {
        debug!("Reading log lines from stdin");
        forward(BufReader::new(tokio::io::stdin()), tx, cancel).await?
    } else {
        debug!(path = %path.display(), "Reading log lines from file");
        let file = tokio::fs::File::open(path).await?;
        forward(BufReader::new(file), tx, cancel).await?
    };
    Ok(stats)
}

/// Decode one record per line and send it on. Blank lines are ignored;
/// undecodable lines are logged and skipped. Stops early when the receiver
/// goes away or `cancel` fires.
pub async fn forward<R>(
    reader: R,
    tx: mpsc::Sender<LogLine>,
    cancel: CancellationToken,
) -> std::io::Result<InputStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut stats = InputStats::default();
    let mut lineno = 0u64;

    loop {
        let raw = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = lines.next_line() => match next? {
                Some(raw) => raw,
                None => break,
            },
        };
        lineno += 1;

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }

        let line: LogLine = match serde_json::from_str(trimmed) {
            Ok(line) => line,
            Err(e) => {
                warn!(line = lineno, error = %e, "Skipping undecodable log line");
                stats.skipped += 1;
                continue;
            }
        };

        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = tx.send(line) => sent,
        };
        if sent.is_err() {
            debug!("Replay driver stopped reading input");
            break;
        }
        stats.read += 1;
    }

    Ok(stats)
}
