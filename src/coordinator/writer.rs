//! Last-writer-wins write protocol
//!
//! The row store offers no version token, so the timestamp cell doubles as
//! one. Each attempt reads only the timestamp, decides, and then writes with a
//! predicate that pins the row to what was read:
//!
//! ```text
//! read ts ──absent──▶ create iff timestamp family empty ──▶ Stored | CreateConflict
//!    │
//!    ├── stored >= incoming ──▶ Skipped
//!    │
//!    └── stored <  incoming ──▶ update iff ts == observed ──▶ Stored
//!                                        │ lost
//!                                        ▼
//!                           retry from read (bounded)
//! ```
//!
//! A lost update race usually means a newer record just landed, in which case
//! the re-read turns into a skip instead of a nack and redelivery.

use crate::common::{Error, Result};
use crate::coordinator::retry::RetryPolicy;
use crate::record::{RowKey, ScanRecord};
use crate::store::schema::{create_mutation, decode_timestamp, update_mutation, TIMESTAMP_FAMILY};
use crate::store::{ConditionalMutation, RowFilter, RowStore};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The record is now the stored value for its key
    Stored,
    /// The stored value is at least as new; nothing was written
    Skipped,
}

pub struct WriteCoordinator {
    store: Arc<dyn RowStore>,
    policy: RetryPolicy,
}

impl WriteCoordinator {
    pub fn new(store: Arc<dyn RowStore>) -> Self {
        Self::with_policy(store, RetryPolicy::default())
    }

    pub fn with_policy(store: Arc<dyn RowStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Persist `record` under `key` unless a record at least as new is stored.
    pub async fn put(&self, key: &RowKey, record: &ScanRecord) -> Result<PutOutcome> {
        let timestamp_filter = RowFilter::family(TIMESTAMP_FAMILY);
        let mut last_error: Option<Error> = None;

        for attempt in self.policy.attempts() {
            let row = self.store.read_row(key, &timestamp_filter).await?;
            let observed = row
                .as_ref()
                .and_then(|row| row.get(TIMESTAMP_FAMILY))
                .map(<[u8]>::to_vec);

            let Some(observed) = observed else {
                if attempt == 1 {
                    return self.create(key, record).await;
                }
                // Present on the previous attempt, gone now. Nothing deletes rows.
                return Err(last_error.unwrap_or_else(|| {
                    Error::Internal(format!("row {} disappeared between attempts", key))
                }));
            };

            let stored = decode_timestamp(key, &observed)?;
            if stored >= record.timestamp {
                tracing::debug!(
                    key = %key,
                    stored,
                    incoming = record.timestamp,
                    "Stored record is not older, skipping"
                );
                return Ok(PutOutcome::Skipped);
            }

            if self.update(key, record, observed).await? {
                tracing::debug!(key = %key, attempt, timestamp = record.timestamp, "Row updated");
                return Ok(PutOutcome::Stored);
            }

            let err = Error::UpdateConflict {
                key: key.to_string(),
                attempts: attempt,
            };
            if self.policy.is_final(attempt) {
                tracing::warn!(key = %key, attempt, "Update race lost, retry budget exhausted");
                return Err(err);
            }
            tracing::debug!(key = %key, attempt, "Update race lost, re-reading");
            last_error = Some(err);
        }

        Err(last_error
            .unwrap_or_else(|| Error::Internal(format!("no write attempt made for {}", key))))
    }

    /// First write for a key: every column, iff the timestamp family is empty.
    async fn create(&self, key: &RowKey, record: &ScanRecord) -> Result<PutOutcome> {
        let mutation = ConditionalMutation::new(RowFilter::family(TIMESTAMP_FAMILY))
            .on_no_match(create_mutation(record));

        if self.store.apply_conditional(key, &mutation).await? {
            // Another writer created the row between our read and write.
            tracing::warn!(key = %key, timestamp = record.timestamp, "Row created concurrently");
            return Err(Error::CreateConflict {
                key: key.to_string(),
            });
        }

        tracing::debug!(key = %key, timestamp = record.timestamp, "Row created");
        Ok(PutOutcome::Stored)
    }

    /// `data` + `timestamp`, iff the timestamp still holds the observed bytes.
    async fn update(&self, key: &RowKey, record: &ScanRecord, observed: Vec<u8>) -> Result<bool> {
        let predicate = RowFilter::chain([
            RowFilter::family(TIMESTAMP_FAMILY),
            RowFilter::ValueEquals(observed),
        ]);
        let mutation = ConditionalMutation::new(predicate).on_match(update_mutation(record));
        self.store.apply_conditional(key, &mutation).await
    }
}
