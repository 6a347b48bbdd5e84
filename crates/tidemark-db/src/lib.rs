pub mod database;
pub mod dialect;
pub mod sqlite;
pub mod value;

#[cfg(any(test, feature = "testing"))]
pub mod recording;

pub use database::Database;
pub use dialect::Dialect;
pub use sqlite::SqliteDatabase;
pub use value::{Row, SqlValue};

#[cfg(any(test, feature = "testing"))]
pub use recording::RecordingDatabase;
