//! Persistent row store on sled
//!
//! Each row is one sled entry: the row key maps to the bincode-encoded cell
//! map. Conditional mutations read the entry, evaluate the predicate, and
//! publish the result with `compare_and_swap`; a lost swap re-reads and
//! re-evaluates, so the predicate always holds against the value replaced.

use crate::common::{Error, Result};
use crate::record::RowKey;
use crate::store::schema::TABLE_NAME;
use crate::store::{ConditionalMutation, Row, RowFilter, RowStore};
use async_trait::async_trait;
use std::path::Path;

pub struct SledRowStore {
    db: sled::Db,
    tree: sled::Tree,
}

impl SledRowStore {
    /// Open or create the store. Fails fast if the directory is unusable.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path).map_err(|e| {
            Error::StoreUnavailable(format!("cannot open {}: {}", path.display(), e))
        })?;
        let tree = db.open_tree(TABLE_NAME).map_err(store_error)?;
        tracing::info!("Row store opened at {:?}: {} rows", path, tree.len());
        Ok(Self { db, tree })
    }

    /// Flush to disk
    pub fn flush(&self) -> Result<()> {
        self.db.flush().map_err(store_error)?;
        Ok(())
    }

    fn decode(key: &RowKey, bytes: &[u8]) -> Result<Row> {
        bincode::deserialize(bytes).map_err(|e| Error::Corrupted {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }
}

fn store_error(e: sled::Error) -> Error {
    Error::StoreUnavailable(e.to_string())
}

#[async_trait]
impl RowStore for SledRowStore {
    async fn read_row(&self, key: &RowKey, filter: &RowFilter) -> Result<Option<Row>> {
        match self.tree.get(key.as_bytes()).map_err(store_error)? {
            Some(bytes) => {
                let row = filter.apply(&Self::decode(key, &bytes)?);
                Ok(if row.is_empty() { None } else { Some(row) })
            }
            None => Ok(None),
        }
    }

    async fn apply_conditional(
        &self,
        key: &RowKey,
        mutation: &ConditionalMutation,
    ) -> Result<bool> {
        loop {
            let current = self.tree.get(key.as_bytes()).map_err(store_error)?;
            let mut row = match &current {
                Some(bytes) => Self::decode(key, bytes)?,
                None => Row::new(),
            };

            let (matched, branch) = mutation.resolve(&row);
            let Some(branch) = branch else {
                return Ok(matched);
            };
            row.apply(branch);
            let encoded = bincode::serialize(&row)?;

            match self
                .tree
                .compare_and_swap(key.as_bytes(), current, Some(encoded))
                .map_err(store_error)?
            {
                Ok(()) => return Ok(matched),
                Err(_) => {
                    tracing::debug!(key = %key, "Row changed during conditional mutation, re-evaluating");
                }
            }
        }
    }

    async fn health_check(&self) -> Result<()> {
        // Touch the tree so a broken mount surfaces here and not per message
        self.tree.first().map_err(store_error)?;
        Ok(())
    }
}
