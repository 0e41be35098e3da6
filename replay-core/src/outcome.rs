use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Classification of one finished replay attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    /// `[200, 400)` is a success. Redirects are never followed, so a final
    /// 3xx lands here too.
    pub fn from_status(code: u16) -> Self {
        if (200..400).contains(&code) {
            Outcome::Success
        } else {
            Outcome::Failure
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal state of a replay attempt. No state transitions back to pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptStage {
    ParseFailed,
    BuildFailed,
    TransportFailed,
    Completed(u16),
}

impl AttemptStage {
    /// Outcome recorded for an attempt that ended in this state.
    pub fn outcome(&self) -> Outcome {
        match self {
            AttemptStage::Completed(status) => Outcome::from_status(*status),
            _ => Outcome::Failure,
        }
    }
}

/// Accumulator for replay outcomes, shared by every concurrent attempt.
///
/// Implementations must be lock-free on the hot path: each call is a single
/// atomic add (or a no-op).
pub trait OutcomeRecorder: Send + Sync {
    fn record(&self, outcome: Outcome);

    fn add_latency(&self, elapsed: Duration);

    /// Status code of a response that made it back. Optional detail for
    /// breakdowns; the outcome is still reported through `record`.
    fn observe_status(&self, _status: u16) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_range_is_200_to_399() {
        for code in [200, 201, 204, 301, 302, 304, 399] {
            assert_eq!(Outcome::from_status(code), Outcome::Success, "code {code}");
        }
    }

    #[test]
    fn everything_else_is_failure() {
        for code in [0, 100, 199, 400, 404, 429, 500, 503, 599, 600, 999] {
            assert_eq!(Outcome::from_status(code), Outcome::Failure, "code {code}");
        }
    }

    #[test]
    fn non_completed_stages_are_failures() {
        assert_eq!(AttemptStage::ParseFailed.outcome(), Outcome::Failure);
        assert_eq!(AttemptStage::BuildFailed.outcome(), Outcome::Failure);
        assert_eq!(AttemptStage::TransportFailed.outcome(), Outcome::Failure);
        assert_eq!(AttemptStage::Completed(204).outcome(), Outcome::Success);
        assert_eq!(AttemptStage::Completed(502).outcome(), Outcome::Failure);
    }

    #[test]
    fn outcome_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Outcome::Success).unwrap(), "\"success\"");
        assert_eq!(Outcome::Failure.to_string(), "failure");
    }
}
