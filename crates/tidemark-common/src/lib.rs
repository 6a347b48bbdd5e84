pub mod error;
pub mod progress;
pub mod types;

pub use error::{Error, Result};
pub use progress::{NoopProgress, ProgressSink, TracingProgress};
pub use types::{Direction, DuplicatePolicy, MigrationNumber};
