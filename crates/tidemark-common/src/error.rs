use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("invalid migration number: {0}")]
    InvalidTarget(i64),

    #[error(
        "the current migration number ({current}) is higher than latest available ({latest}). Something is wrong!"
    )]
    InconsistentState { current: i64, latest: i64 },

    #[error("malformed migration: {0}")]
    MalformedMigration(String),

    #[error("duplicate migration number: {0}")]
    DuplicateMigration(i64),

    #[error("migration {number} failed: {message}")]
    Migration { number: i64, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the caller can fix this by passing different arguments, as
    /// opposed to repairing the database or the migration set.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Error::InvalidTarget(_))
    }
}
