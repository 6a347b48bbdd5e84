use std::collections::BTreeMap;
use std::sync::Arc;

use tidemark_common::{DuplicatePolicy, Error, MigrationNumber, Result};
use tracing::{debug, warn};

use crate::migration::Migration;
use crate::source::MigrationSource;

type Index = BTreeMap<MigrationNumber, Arc<dyn Migration>>;

/// Every known migration, keyed by number.
///
/// The source is read once, on first use; later calls reuse the index.
pub struct MigrationRegistry {
    source: Box<dyn MigrationSource>,
    policy: DuplicatePolicy,
    loaded: Option<Index>,
}

impl MigrationRegistry {
    pub fn new(source: impl MigrationSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            policy: DuplicatePolicy::default(),
            loaded: None,
        }
    }

    pub fn with_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn load_all(&mut self) -> Result<&Index> {
        let index = match self.loaded.take() {
            Some(index) => index,
            None => index_units(self.source.load()?, self.policy)?,
        };
        Ok(&*self.loaded.insert(index))
    }

    /// Highest registered number, 0 when empty.
    pub fn latest_number(&mut self) -> Result<i64> {
        Ok(self
            .load_all()?
            .keys()
            .next_back()
            .map_or(0, |n| n.get()))
    }

    /// Registered numbers, ascending.
    pub fn numbers(&mut self) -> Result<Vec<MigrationNumber>> {
        Ok(self.load_all()?.keys().copied().collect())
    }

    pub fn contains(&mut self, number: i64) -> Result<bool> {
        let Ok(number) = MigrationNumber::new(number) else {
            return Ok(false);
        };
        Ok(self.load_all()?.contains_key(&number))
    }

    pub fn get(&mut self, number: MigrationNumber) -> Result<Option<Arc<dyn Migration>>> {
        Ok(self.load_all()?.get(&number).cloned())
    }
}

fn index_units(units: Vec<Arc<dyn Migration>>, policy: DuplicatePolicy) -> Result<Index> {
    let mut index = Index::new();
    for unit in units {
        let number = unit.number()?;
        if let Some(previous) = index.insert(number, unit) {
            match policy {
                DuplicatePolicy::Reject => return Err(Error::DuplicateMigration(number.get())),
                DuplicatePolicy::KeepLast => warn!(
                    "migration {number} ({}) replaced by a later unit with the same number",
                    previous.name()
                ),
            }
        }
    }
    debug!("indexed {} migrations", index.len());
    Ok(index)
}
