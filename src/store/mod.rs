//! Row store capability boundary
//!
//! The write protocol depends on exactly two primitives:
//! - `read_row`: fetch the cells of one row that survive a filter
//! - `apply_conditional`: atomically evaluate a predicate against one row and
//!   apply one of two mutations depending on the result
//!
//! There are no multi-row transactions and no version tokens. Backends:
//! - `MemRowStore`: mutex-guarded map, for tests and ephemeral runs
//! - `SledRowStore`: persistent, behind the `sled-backend` feature

pub mod filter;
pub mod memory;
pub mod schema;
#[cfg(feature = "sled-backend")]
pub mod sled_store;

pub use filter::RowFilter;
pub use memory::MemRowStore;
pub use schema::ScanRow;
#[cfg(feature = "sled-backend")]
pub use sled_store::SledRowStore;

use crate::common::{Result, StoreBackend, StoreConfig};
use crate::record::RowKey;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Cells of one row, keyed by column family. One cell per family.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    cells: BTreeMap<String, Vec<u8>>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, family: &str) -> Option<&[u8]> {
        self.cells.get(family).map(Vec::as_slice)
    }

    pub fn set(&mut self, family: impl Into<String>, value: Vec<u8>) {
        self.cells.insert(family.into(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn families(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().map(String::as_str)
    }

    /// Overwrite the cells named by `mutation`, leaving the rest untouched.
    pub fn apply(&mut self, mutation: &Mutation) {
        for (family, value) in &mutation.cells {
            self.cells.insert(family.clone(), value.clone());
        }
    }

    pub(crate) fn retain(&self, mut keep: impl FnMut(&str, &[u8]) -> bool) -> Row {
        Row {
            cells: self
                .cells
                .iter()
                .filter(|(family, value)| keep(family.as_str(), value.as_slice()))
                .map(|(family, value)| (family.clone(), value.clone()))
                .collect(),
        }
    }
}

/// A set of cell writes applied to one row as a unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mutation {
    cells: Vec<(String, Vec<u8>)>,
}

impl Mutation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, family: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.cells.push((family.into(), value.into()));
        self
    }

    pub fn families(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(family, _)| family.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Predicate plus the mutation to apply on each branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionalMutation {
    pub predicate: RowFilter,
    pub on_match: Option<Mutation>,
    pub on_no_match: Option<Mutation>,
}

impl ConditionalMutation {
    pub fn new(predicate: RowFilter) -> Self {
        Self {
            predicate,
            on_match: None,
            on_no_match: None,
        }
    }

    pub fn on_match(mut self, mutation: Mutation) -> Self {
        self.on_match = Some(mutation);
        self
    }

    pub fn on_no_match(mut self, mutation: Mutation) -> Self {
        self.on_no_match = Some(mutation);
        self
    }

    /// Evaluate the predicate against the current row.
    /// Returns whether it matched and the branch to apply, if any.
    pub fn resolve(&self, row: &Row) -> (bool, Option<&Mutation>) {
        if self.predicate.matches(row) {
            (true, self.on_match.as_ref())
        } else {
            (false, self.on_no_match.as_ref())
        }
    }
}

/// Trait for row store backends.
///
/// `apply_conditional` must be atomic per row: no other write to the same row
/// may land between the predicate check and the mutation.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Cells of `key` surviving `filter`, or `None` if nothing survives.
    async fn read_row(&self, key: &RowKey, filter: &RowFilter) -> Result<Option<Row>>;

    /// Returns whether the predicate matched.
    async fn apply_conditional(&self, key: &RowKey, mutation: &ConditionalMutation)
        -> Result<bool>;

    /// Startup probe. Backends that can fail to connect report it here.
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Build the configured backend. Construction failures surface here, at
/// startup, never per message.
pub fn open(config: &StoreConfig) -> Result<Arc<dyn RowStore>> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemRowStore::new())),
        #[cfg(feature = "sled-backend")]
        StoreBackend::Sled => Ok(Arc::new(SledRowStore::open(&config.path)?)),
        #[cfg(not(feature = "sled-backend"))]
        StoreBackend::Sled => Err(crate::common::Error::InvalidConfig(
            "sled backend not compiled in (enable the sled-backend feature)".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_apply_overwrites_named_cells() {
        let mut row = Row::new();
        row.set("ip", b"10.0.0.1".to_vec());
        row.set("data", b"old".to_vec());

        row.apply(&Mutation::new().set("data", b"new".to_vec()));

        assert_eq!(row.get("data"), Some(&b"new"[..]));
        assert_eq!(row.get("ip"), Some(&b"10.0.0.1"[..]));
        assert_eq!(row.len(), 2);
    }

    #[test]
    fn test_resolve_picks_branch() {
        let create = Mutation::new().set("timestamp", 1i64.to_be_bytes().to_vec());
        let cond = ConditionalMutation::new(RowFilter::family("timestamp"))
            .on_no_match(create.clone());

        let empty = Row::new();
        assert_eq!(cond.resolve(&empty), (false, Some(&create)));

        let mut existing = Row::new();
        existing.apply(&create);
        assert_eq!(cond.resolve(&existing), (true, None));
    }

    #[test]
    fn test_open_memory_backend() {
        let config = StoreConfig {
            backend: StoreBackend::Memory,
            ..Default::default()
        };
        assert!(open(&config).is_ok());
    }
}
