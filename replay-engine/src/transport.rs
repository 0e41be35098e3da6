use crate::error::TransportError;
use async_trait::async_trait;
use dashmap::DashMap;
use replay_core::config::TransportConfig;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

/// A response plus the per-host slot it occupies.
///
/// The slot is released when the exchange is dropped, which the replayer does
/// only after the body has been drained.
pub struct Exchange {
    response: reqwest::Response,
    _slot: Option<OwnedSemaphorePermit>,
}

impl Exchange {
    pub fn new(response: reqwest::Response) -> Self {
        Self { response, _slot: None }
    }

    fn with_slot(response: reqwest::Response, slot: OwnedSemaphorePermit) -> Self {
        Self { response, _slot: Some(slot) }
    }

    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    /// Read and discard the whole body, returning the byte count.
    pub async fn drain(&mut self) -> Result<u64, TransportError> {
        let mut total = 0u64;
        while let Some(chunk) = self.response.chunk().await? {
            total += chunk.len() as u64;
        }
        Ok(total)
    }
}

/// Executes one HTTP request. One attempt per call: no retry, no redirect
/// following.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: reqwest::Request) -> Result<Exchange, TransportError>;
}

/// Connection-pooled client shared by every replay attempt.
///
/// Built once at startup. Concurrency per target authority is capped by a
/// semaphore; callers over the cap wait for a slot, bounded by the request
/// timeout.
pub struct HttpTransport {
    client: reqwest::Client,
    request_timeout: Duration,
    max_conns_per_host: usize,
    slots: DashMap<String, Arc<Semaphore>>,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .tcp_keepalive(config.tcp_keepalive())
            .pool_idle_timeout(config.idle_timeout())
            .pool_max_idle_per_host(config.max_idle_per_host)
            .danger_accept_invalid_certs(config.skip_tls_verify)
            .no_gzip()
            .build()
            .map_err(TransportError::Build)?;

        info!(
            request_timeout_ms = config.request_timeout_ms,
            connect_timeout_ms = config.connect_timeout_ms,
            max_conns_per_host = config.max_conns_per_host,
            max_idle_per_host = config.max_idle_per_host,
            skip_tls_verify = config.skip_tls_verify,
            "Replay transport ready"
        );

        Ok(Self {
            client,
            request_timeout: config.request_timeout(),
            max_conns_per_host: config.max_conns_per_host.max(1),
            slots: DashMap::new(),
        })
    }

    /// Slots currently free for `authority`, or the full cap if it has not
    /// been contacted yet.
    pub fn available_slots(&self, authority: &str) -> usize {
        self.slots
            .get(authority)
            .map(|s| s.available_permits())
            .unwrap_or(self.max_conns_per_host)
    }

    fn host_slots(&self, authority: &str) -> Arc<Semaphore> {
        if let Some(existing) = self.slots.get(authority) {
            return Arc::clone(existing.value());
        }
        let entry = self
            .slots
            .entry(authority.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.max_conns_per_host)));
        Arc::clone(entry.value())
    }
}

/// `host:port` with the scheme's default port filled in.
pub(crate) fn authority_of(url: &reqwest::Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port_or_known_default() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, mut request: reqwest::Request) -> Result<Exchange, TransportError> {
        let authority = authority_of(request.url());
        let slots = self.host_slots(&authority);

        let queued = Instant::now();
        let slot = match tokio::time::timeout(self.request_timeout, slots.acquire_owned()).await {
            Ok(Ok(slot)) => slot,
            // The semaphore is never closed.
            Ok(Err(_)) | Err(_) => {
                return Err(TransportError::QueueTimeout {
                    host: authority,
                    waited: queued.elapsed(),
                });
            }
        };

        // Time spent queued counts against the request's own budget.
        let waited = queued.elapsed();
        if waited > Duration::from_millis(1) {
            debug!(host = %authority, waited_ms = waited.as_millis() as u64, "Waited for connection slot");
        }
        *request.timeout_mut() = Some(self.request_timeout.saturating_sub(waited));

        let response = self.client.execute(request).await?;
        Ok(Exchange::with_slot(response, slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authority_fills_default_ports() {
        let https = reqwest::Url::parse("https://replay.test/a").unwrap();
        assert_eq!(authority_of(&https), "replay.test:443");
        let http = reqwest::Url::parse("http://replay.test:8080/").unwrap();
        assert_eq!(authority_of(&http), "replay.test:8080");
    }

    #[test]
    fn transport_builds_from_default_config() {
        let transport = HttpTransport::new(&TransportConfig::default()).unwrap();
        assert_eq!(transport.available_slots("replay.test:443"), 2048);
    }

    #[test]
    fn slots_are_shared_per_authority() {
        let config = TransportConfig { max_conns_per_host: 3, ..TransportConfig::default() };
        let transport = HttpTransport::new(&config).unwrap();
        let a = transport.host_slots("a:80");
        let b = transport.host_slots("a:80");
        let c = transport.host_slots("c:80");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(a.available_permits(), 3);
    }

    #[tokio::test]
    async fn drain_counts_body_bytes() {
        let response = http::Response::builder()
            .status(200)
            .body("hello world")
            .unwrap();
        let mut exchange = Exchange::new(reqwest::Response::from(response));
        assert_eq!(exchange.status(), StatusCode::OK);
        assert_eq!(exchange.drain().await.unwrap(), 11);
        assert_eq!(exchange.drain().await.unwrap(), 0);
    }
}
