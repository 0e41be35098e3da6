use replay_core::AttemptStage;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single transport round trip.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("{0}")]
    Request(#[from] reqwest::Error),

    #[error("no connection slot to {host} within {waited:?}")]
    QueueTimeout { host: String, waited: Duration },

    #[error("request cancelled")]
    Cancelled,
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        match self {
            TransportError::Request(e) => e.is_timeout(),
            TransportError::QueueTimeout { .. } => true,
            _ => false,
        }
    }
}

/// Why a replay attempt produced no response.
///
/// HTTP error statuses are not errors; they come back as a failed outcome.
#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("error parsing URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("error creating request: invalid method {method:?}")]
    InvalidMethod {
        method: String,
        #[source]
        source: http::method::InvalidMethod,
    },

    #[error("error creating request: invalid {header} header value")]
    InvalidHeader {
        header: &'static str,
        #[source]
        source: http::header::InvalidHeaderValue,
    },

    #[error("error sending request for {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: TransportError,
    },
}

impl ReplayError {
    /// Terminal state of the attempt that produced this error.
    pub fn stage(&self) -> AttemptStage {
        match self {
            ReplayError::InvalidUrl { .. } => AttemptStage::ParseFailed,
            ReplayError::InvalidMethod { .. } | ReplayError::InvalidHeader { .. } => {
                AttemptStage::BuildFailed
            }
            ReplayError::Transport { .. } => AttemptStage::TransportFailed,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ReplayError::Transport { source, .. } if source.is_timeout())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            ReplayError::Transport {
                source: TransportError::Cancelled,
                ..
            }
        )
    }
}
