//! End-to-end dispatch: queue → decoder → coordinator → store → ack/nack

use async_trait::async_trait;
use scan_processor::common::Result;
use scan_processor::ingest::{MemoryQueue, MessageDispatcher};
use scan_processor::store::schema::ScanRow;
use scan_processor::store::{ConditionalMutation, MemRowStore, Row, RowFilter};
use scan_processor::{RowKey, RowStore, WriteCoordinator};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Counts every call that reaches the store
#[derive(Default)]
struct CountingStore {
    inner: MemRowStore,
    reads: AtomicUsize,
    mutations: AtomicUsize,
}

#[async_trait]
impl RowStore for CountingStore {
    async fn read_row(&self, key: &RowKey, filter: &RowFilter) -> Result<Option<Row>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read_row(key, filter).await
    }

    async fn apply_conditional(
        &self,
        key: &RowKey,
        mutation: &ConditionalMutation,
    ) -> Result<bool> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        self.inner.apply_conditional(key, mutation).await
    }
}

fn envelope(version: &str, timestamp: i64, data: serde_json::Value) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "ip": "10.0.0.1",
        "port": 443,
        "service": "tls",
        "timestamp": timestamp,
        "data_version": version,
        "data": data,
    }))
    .unwrap()
}

async fn dispatch_all(store: Arc<dyn RowStore>, messages: Vec<Vec<u8>>) -> Arc<MemoryQueue> {
    let queue = Arc::new(MemoryQueue::new(5));
    for message in messages {
        queue.publish(message).unwrap();
    }
    queue.close();

    let coordinator = Arc::new(WriteCoordinator::new(store));
    let dispatcher = MessageDispatcher::new(queue.clone(), coordinator, 1);
    dispatcher.run(CancellationToken::new()).await.unwrap();
    queue
}

#[tokio::test]
async fn test_unknown_version_is_acked_without_write() {
    let store = Arc::new(CountingStore::default());
    let queue = dispatch_all(
        store.clone(),
        vec![envelope("v7", 100, json!({"response_str": "x"}))],
    )
    .await;

    assert_eq!(queue.acked(), 1);
    assert!(queue.dead_letters().is_empty());
    assert_eq!(store.reads.load(Ordering::SeqCst), 0);
    assert_eq!(store.mutations.load(Ordering::SeqCst), 0);
    assert!(store.inner.is_empty());
}

#[tokio::test]
async fn test_invalid_base64_is_acked_without_write() {
    let store = Arc::new(CountingStore::default());
    let queue = dispatch_all(
        store.clone(),
        vec![envelope("v1", 100, json!({"response_bytes_utf8": "%%%"}))],
    )
    .await;

    assert_eq!(queue.acked(), 1);
    assert_eq!(store.mutations.load(Ordering::SeqCst), 0);
    assert!(store.inner.is_empty());
}

#[tokio::test]
async fn test_mixed_versions_converge() {
    let store = Arc::new(MemRowStore::new());
    let queue = dispatch_all(
        store.clone(),
        vec![
            envelope("v2", 200, json!({"response_str": "B"})),
            // base64("A")
            envelope("v1", 100, json!({"response_bytes_utf8": "QQ=="})),
            envelope("v2", 200, json!({"response_str": "B"})),
        ],
    )
    .await;

    assert_eq!(queue.acked(), 3);
    let key = RowKey::new("10.0.0.1", 443, "tls");
    let row = ScanRow::from_row(&key, &store.snapshot(&key).unwrap()).unwrap();
    assert_eq!(row.timestamp, 200);
    assert_eq!(row.data, "B");
}

/// A store that refuses every call: each delivery is nacked until the queue
/// dead-letters the message.
#[tokio::test]
async fn test_unavailable_store_exhausts_deliveries() {
    struct Unavailable;

    #[async_trait]
    impl RowStore for Unavailable {
        async fn read_row(&self, _key: &RowKey, _filter: &RowFilter) -> Result<Option<Row>> {
            Err(scan_processor::Error::StoreUnavailable("deadline exceeded".into()))
        }

        async fn apply_conditional(
            &self,
            _key: &RowKey,
            _mutation: &ConditionalMutation,
        ) -> Result<bool> {
            Err(scan_processor::Error::StoreUnavailable("deadline exceeded".into()))
        }
    }

    let queue = Arc::new(MemoryQueue::new(3));
    queue
        .publish(envelope("v2", 1, json!({"response_str": "x"})))
        .unwrap();
    queue.close();

    let coordinator = Arc::new(WriteCoordinator::new(Arc::new(Unavailable)));
    let dispatcher = MessageDispatcher::new(queue.clone(), coordinator, 2);
    dispatcher.run(CancellationToken::new()).await.unwrap();

    let snap = dispatcher.stats().snapshot();
    assert_eq!(snap.received, 3);
    assert_eq!(snap.nacked, 3);
    assert_eq!(queue.acked(), 0);
    let dead = queue.dead_letters();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].delivery_attempt, 3);
}

#[cfg(feature = "sled-backend")]
#[tokio::test]
async fn test_sled_end_to_end() {
    use scan_processor::store::SledRowStore;
    use tempfile::TempDir;

    let dir = TempDir::new().unwrap();
    let key = RowKey::new("10.0.0.1", 443, "tls");
    let store = Arc::new(SledRowStore::open(dir.path()).unwrap());

    let queue = dispatch_all(
        store.clone(),
        vec![
            envelope("v2", 200, json!({"response_str": "B"})),
            envelope("v2", 100, json!({"response_str": "A"})),
        ],
    )
    .await;
    assert_eq!(queue.acked(), 2);
    store.flush().unwrap();

    let row = store
        .read_row(&key, &RowFilter::PassAll)
        .await
        .unwrap()
        .unwrap();
    let row = ScanRow::from_row(&key, &row).unwrap();
    assert_eq!(row.timestamp, 200);
    assert_eq!(row.data, "B");
    assert_eq!(row.service, "tls");
}
