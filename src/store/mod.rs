pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::queue_item::QueueItem;
use crate::models::subscriber::Subscriber;

/// Errors surfaced by a store adapter. `ThroughputExceeded` is distinguished
/// because the batcher handles it differently from every other failure.
#[derive(Debug, Clone)]
pub enum StoreError {
    ThroughputExceeded,
    Unavailable(String),
    Other(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::ThroughputExceeded => write!(f, "throughput exceeded"),
            StoreError::Unavailable(msg) => write!(f, "store unavailable: {msg}"),
            StoreError::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Primary key of a queue or archive record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueKey {
    pub queue_placement: String,
    pub run_at_modified: String,
}

/// One request inside a bulk write. Puts carry the full document so the same
/// call shape covers new items, in-place updates and archive copies.
#[derive(Debug, Clone)]
pub enum WriteRequest {
    Put(serde_json::Value),
    Delete(QueueKey),
}

/// Result of a bulk write: the subset of requests the store failed to apply.
/// An empty `unprocessed` list means the whole batch landed.
#[derive(Debug, Default)]
pub struct BatchWriteOutput {
    pub unprocessed: Vec<WriteRequest>,
}

/// Durable range-queryable store consumed by the queue engine.
///
/// Implemented by host-provided adapters; this crate ships only the
/// in-memory adapter used for development and tests. Reads backing the
/// due-batch query are expected to be strongly consistent.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Liveness probe for the backing table/namespace.
    async fn table_is_active(&self) -> Result<bool, StoreError>;

    /// Pending items due at or before `due_before` (epoch ms), ascending by
    /// due time, at most `limit` of them.
    async fn query_due(&self, due_before: i64, limit: usize) -> Result<Vec<QueueItem>, StoreError>;

    /// Applies up to the store's bulk-write limit of put/delete requests,
    /// reporting any subset it could not apply.
    async fn batch_write(
        &self,
        requests: Vec<WriteRequest>,
    ) -> Result<BatchWriteOutput, StoreError>;

    /// Deletes one record by key. Deleting an absent key is not an error.
    async fn delete_item(&self, key: &QueueKey) -> Result<(), StoreError>;

    /// Keys of all still-pending tasks for a subscriber (index query).
    async fn queued_items_for_subscriber(
        &self,
        subscriber_id: &str,
    ) -> Result<Vec<QueueKey>, StoreError>;

    async fn get_subscriber(&self, subscriber_id: &str)
    -> Result<Option<Subscriber>, StoreError>;

    /// Flags the subscriber unsubscribed and resets their tags to
    /// `["unsubscribed"]`.
    async fn mark_unsubscribed(&self, subscriber_id: &str) -> Result<(), StoreError>;

    async fn get_setting(&self, name: &str) -> Result<Option<serde_json::Value>, StoreError>;

    async fn put_setting(&self, name: &str, value: serde_json::Value) -> Result<(), StoreError>;
}
