pub mod config;
pub mod error;
pub mod log_line;
pub mod outcome;
pub mod target;

pub use config::ReplayConfig;
pub use error::CoreError;
pub use log_line::LogLine;
pub use outcome::{AttemptStage, Outcome, OutcomeRecorder};
pub use target::Target;
