use serde::{Deserialize, Serialize};

/// One previously observed HTTP request, as produced by an upstream log parser.
///
/// Only these four fields are read by the replayer. The URL may be absolute
/// (`http://origin/a?b`) or a bare request target (`/a?b`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub url: String,
    pub method: String,
    #[serde(rename = "userAgent", alias = "user_agent", default)]
    pub user_agent: String,
    #[serde(default)]
    pub ipclient: String,
}

impl LogLine {
    pub fn new(
        url: impl Into<String>,
        method: impl Into<String>,
        user_agent: impl Into<String>,
        ipclient: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            user_agent: user_agent.into(),
            ipclient: ipclient.into(),
        }
    }
}
