//! Dispatch counters
//!
//! Lock-free counters shared by every handler task. A snapshot is cheap to
//! take and serializes to JSON for the CLI summary.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for tracking event counts
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Per-dispatcher outcome counters
#[derive(Debug, Default)]
pub struct DispatchStats {
    /// Messages pulled from the source
    pub received: Counter,
    /// Writes that changed the row
    pub stored: Counter,
    /// Stale or duplicate records, acked without a write
    pub skipped: Counter,
    /// Undecodable messages, acked and discarded
    pub dropped: Counter,
    /// Failed writes handed back for redelivery
    pub nacked: Counter,
    /// Ack or nack calls the source rejected
    pub ack_failures: Counter,
}

impl DispatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.get(),
            stored: self.stored.get(),
            skipped: self.skipped.get(),
            dropped: self.dropped.get(),
            nacked: self.nacked.get(),
            ack_failures: self.ack_failures.get(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub received: u64,
    pub stored: u64,
    pub skipped: u64,
    pub dropped: u64,
    pub nacked: u64,
    pub ack_failures: u64,
}

impl StatsSnapshot {
    /// Messages that reached a final ack or nack
    pub fn settled(&self) -> u64 {
        self.stored + self.skipped + self.dropped + self.nacked
    }
}
