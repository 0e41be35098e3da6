use thiserror::Error;

/// Errors raised while loading configuration or building run inputs.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid target {target}: {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("Invalid target URL {target}: {source}")]
    TargetParse {
        target: String,
        #[source]
        source: url::ParseError,
    },
}

impl CoreError {
    /// Short, stable label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::Config(_) => "config",
            CoreError::InvalidTarget { .. } | CoreError::TargetParse { .. } => "target",
        }
    }
}
