use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Identity and ordering key of a migration. Always strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct MigrationNumber(i64);

impl MigrationNumber {
    pub fn new(value: i64) -> Result<Self> {
        if value <= 0 {
            return Err(Error::MalformedMigration(format!(
                "migration number must be positive, got {value}"
            )));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for MigrationNumber {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        Self::new(value)
    }
}

impl From<MigrationNumber> for i64 {
    fn from(number: MigrationNumber) -> Self {
        number.0
    }
}

impl fmt::Display for MigrationNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// `Down` only when the ledger is ahead of the target.
    pub fn between(current: i64, target: i64) -> Self {
        if current > target {
            Direction::Down
        } else {
            Direction::Up
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do when two migrations claim the same number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    #[default]
    Reject,
    /// The unit loaded last wins. Matches older runners that indexed
    /// migrations in a plain map.
    KeepLast,
}
