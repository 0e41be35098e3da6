pub mod driver;
pub mod error;
pub mod replayer;
pub mod transport;

pub use driver::{Driver, RunSummary};
pub use error::{ReplayError, TransportError};
pub use replayer::{Completed, Replayer};
pub use transport::{Exchange, HttpTransport, Transport};
