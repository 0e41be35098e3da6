use crate::error::{ReplayError, TransportError};
use crate::transport::Transport;
use http::header::{ACCEPT_LANGUAGE, HOST, HeaderName, HeaderValue, USER_AGENT};
use replay_core::config::ReplaySettings;
use replay_core::{LogLine, Outcome, OutcomeRecorder, Target};
use reqwest::{Method, Request};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// A replay attempt that got a response back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completed {
    pub status: u16,
    pub outcome: Outcome,
    /// From send until the body was drained.
    pub elapsed: Duration,
}

/// Turns one log line into one live request against the target.
///
/// Stateless apart from the shared transport and recorder, so a single
/// instance is driven concurrently from many tasks.
pub struct Replayer {
    transport: Arc<dyn Transport>,
    recorder: Arc<dyn OutcomeRecorder>,
    accept_language: HeaderValue,
}

impl Replayer {
    pub fn new(transport: Arc<dyn Transport>, recorder: Arc<dyn OutcomeRecorder>) -> Self {
        Self {
            transport,
            recorder,
            accept_language: HeaderValue::from_static("en-US;q=0.9,en;q=0.8"),
        }
    }

    pub fn with_settings(
        transport: Arc<dyn Transport>,
        recorder: Arc<dyn OutcomeRecorder>,
        settings: &ReplaySettings,
    ) -> Result<Self, ReplayError> {
        let accept_language =
            HeaderValue::from_str(&settings.accept_language).map_err(|source| {
                ReplayError::InvalidHeader { header: "Accept-Language", source }
            })?;
        Ok(Self {
            transport,
            recorder,
            accept_language,
        })
    }

    /// Replay `line` against `target` and record its outcome.
    ///
    /// Exactly one outcome is recorded per call. Latency is added only when a
    /// response came back. Errors are returned for unusable input and for
    /// transport failures; HTTP error statuses are returned as `Completed`
    /// with a failure outcome.
    pub async fn replay(
        &self,
        cancel: &CancellationToken,
        target: &Target,
        line: &LogLine,
    ) -> Result<Completed, ReplayError> {
        debug!(url = %line.url, method = %line.method, "Replaying line");

        let request = match self.build_request(target, line) {
            Ok(request) => request,
            Err(e) => {
                self.recorder.record(Outcome::Failure);
                return Err(e);
            }
        };
        let url = request.url().to_string();

        debug!(url = %url, "Sending");
        let start = Instant::now();
        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransportError::Cancelled),
            res = self.transport.execute(request) => res,
        };
        let mut exchange = match sent {
            Ok(exchange) => exchange,
            Err(source) => {
                self.recorder.record(Outcome::Failure);
                return Err(ReplayError::Transport { url, source });
            }
        };

        let status = exchange.status().as_u16();
        debug!(url = %url, status, "Response");
        let outcome = Outcome::from_status(status);
        self.recorder.observe_status(status);
        self.recorder.record(outcome);

        // Reading to EOF makes the origin finish work it would otherwise
        // abandon once headers are out.
        let drained = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransportError::Cancelled),
            res = exchange.drain() => res,
        };
        if let Err(e) = drained {
            warn!(url = %url, status, error = %e, "Error draining response body");
        }
        drop(exchange);

        let elapsed = start.elapsed();
        self.recorder.add_latency(elapsed);

        Ok(Completed {
            status,
            outcome,
            elapsed,
        })
    }

    /// Rewrite the line onto `target` and build the bodiless request.
    pub fn build_request(&self, target: &Target, line: &LogLine) -> Result<Request, ReplayError> {
        let url = target
            .rewrite(&line.url)
            .map_err(|source| ReplayError::InvalidUrl {
                url: line.url.clone(),
                source,
            })?;

        let method =
            Method::from_bytes(line.method.as_bytes()).map_err(|source| ReplayError::InvalidMethod {
                method: line.method.clone(),
                source,
            })?;

        let user_agent = HeaderValue::from_str(&line.user_agent)
            .map_err(|source| ReplayError::InvalidHeader { header: "User-Agent", source })?;
        let host = HeaderValue::from_str(target.host())
            .map_err(|source| ReplayError::InvalidHeader { header: "Host", source })?;
        let forwarded_for = HeaderValue::from_str(&line.ipclient)
            .map_err(|source| ReplayError::InvalidHeader { header: "X-Forwarded-For", source })?;

        let mut request = Request::new(method, url);
        let headers = request.headers_mut();
        headers.insert(USER_AGENT, user_agent);
        headers.insert(ACCEPT_LANGUAGE, self.accept_language.clone());
        headers.insert(HOST, host);
        headers.insert(X_FORWARDED_FOR, forwarded_for);
        Ok(request)
    }
}
