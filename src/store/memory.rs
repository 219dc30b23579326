//! In-memory row store

use crate::common::Result;
use crate::record::RowKey;
use crate::store::{ConditionalMutation, Row, RowFilter, RowStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Mutex-guarded map of rows. Conditional mutations hold the lock across
/// predicate evaluation and write, which makes them atomic per row.
#[derive(Debug, Default)]
pub struct MemRowStore {
    rows: Mutex<HashMap<String, Row>>,
}

impl MemRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full row, bypassing filters
    pub fn snapshot(&self, key: &RowKey) -> Option<Row> {
        self.lock().get(key.as_str()).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Row>> {
        // A panic mid-write cannot leave a half-applied row: `Row::apply` only inserts.
        self.rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RowStore for MemRowStore {
    async fn read_row(&self, key: &RowKey, filter: &RowFilter) -> Result<Option<Row>> {
        let rows = self.lock();
        Ok(rows
            .get(key.as_str())
            .map(|row| filter.apply(row))
            .filter(|row| !row.is_empty()))
    }

    async fn apply_conditional(
        &self,
        key: &RowKey,
        mutation: &ConditionalMutation,
    ) -> Result<bool> {
        let mut rows = self.lock();
        let current = rows.get(key.as_str()).cloned().unwrap_or_default();
        let (matched, branch) = mutation.resolve(&current);
        if let Some(branch) = branch {
            rows.entry(key.to_string()).or_default().apply(branch);
        }
        Ok(matched)
    }
}
