//! In-memory store adapter for development and tests.
//!
//! Plays the role the bundled mock store plays in hosted deployments: the
//! whole engine can run against it, and tests can script partial bulk-write
//! failures, throughput errors and liveness outages through the injection
//! knobs.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::models::queue_item::{QUEUED_PLACEMENT, QueueItem};
use crate::models::subscriber::Subscriber;
use crate::store::{BatchWriteOutput, QueueKey, QueueStore, StoreError, WriteRequest};

/// Scripted behavior for one future `batch_write` call.
#[derive(Debug, Clone)]
pub enum BatchWritePlan {
    /// Apply all but the last `n` requests and report those as unprocessed.
    LeaveUnprocessed(usize),
    /// Fail the call outright without applying anything.
    Fail(StoreError),
}

#[derive(Default)]
struct Tables {
    /// Queue and archive records, keyed (partition, sort key). BTreeMap keeps
    /// the due-batch query ordered without extra work.
    queue: BTreeMap<(String, String), serde_json::Value>,
    subscribers: HashMap<String, Subscriber>,
    settings: HashMap<String, serde_json::Value>,
}

pub struct MemoryStore {
    tables: Mutex<Tables>,
    batch_write_plan: Mutex<VecDeque<BatchWritePlan>>,
    table_active: AtomicBool,
    liveness_delay_ms: AtomicU64,
    query_due_calls: AtomicUsize,
    batch_write_calls: AtomicUsize,
    table_is_active_calls: AtomicUsize,
    put_setting_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            batch_write_plan: Mutex::new(VecDeque::new()),
            table_active: AtomicBool::new(true),
            liveness_delay_ms: AtomicU64::new(0),
            query_due_calls: AtomicUsize::new(0),
            batch_write_calls: AtomicUsize::new(0),
            table_is_active_calls: AtomicUsize::new(0),
            put_setting_calls: AtomicUsize::new(0),
        }
    }

    /// Inserts a queue item directly, bypassing the write path.
    pub async fn insert_queue_item(&self, item: &QueueItem) {
        let value = serde_json::to_value(item).expect("queue item serializes");
        let mut tables = self.tables.lock().await;
        tables.queue.insert(
            (item.queue_placement.clone(), item.run_at_modified.clone()),
            value,
        );
    }

    pub async fn seed_subscriber(&self, subscriber: Subscriber) {
        let mut tables = self.tables.lock().await;
        tables
            .subscribers
            .insert(subscriber.subscriber_id.clone(), subscriber);
    }

    pub async fn seed_setting(&self, name: &str, value: serde_json::Value) {
        let mut tables = self.tables.lock().await;
        tables.settings.insert(name.to_string(), value);
    }

    /// All still-pending queue items, in sort-key order.
    pub async fn pending_items(&self) -> Vec<QueueItem> {
        let tables = self.tables.lock().await;
        tables
            .queue
            .range(partition_range(QUEUED_PLACEMENT))
            .filter_map(|(_, value)| serde_json::from_value(value.clone()).ok())
            .collect()
    }

    /// Raw records stored under the given partition (archive inspection).
    pub async fn items_in_partition(&self, partition: &str) -> Vec<serde_json::Value> {
        let tables = self.tables.lock().await;
        tables
            .queue
            .range(partition_range(partition))
            .map(|(_, value)| value.clone())
            .collect()
    }

    pub async fn setting(&self, name: &str) -> Option<serde_json::Value> {
        let tables = self.tables.lock().await;
        tables.settings.get(name).cloned()
    }

    pub async fn stored_subscriber(&self, subscriber_id: &str) -> Option<Subscriber> {
        let tables = self.tables.lock().await;
        tables.subscribers.get(subscriber_id).cloned()
    }

    /// Queues scripted behavior for upcoming `batch_write` calls; once the
    /// script is exhausted, writes succeed fully again.
    pub async fn plan_batch_writes(&self, plan: impl IntoIterator<Item = BatchWritePlan>) {
        let mut scripted = self.batch_write_plan.lock().await;
        scripted.extend(plan);
    }

    pub fn set_table_active(&self, active: bool) {
        self.table_active.store(active, Ordering::SeqCst);
    }

    /// Adds an artificial delay to the liveness probe, used to hold a tick
    /// in flight.
    pub fn set_liveness_delay(&self, delay: Duration) {
        self.liveness_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn query_due_calls(&self) -> usize {
        self.query_due_calls.load(Ordering::SeqCst)
    }

    pub fn batch_write_calls(&self) -> usize {
        self.batch_write_calls.load(Ordering::SeqCst)
    }

    pub fn table_is_active_calls(&self) -> usize {
        self.table_is_active_calls.load(Ordering::SeqCst)
    }

    pub fn put_setting_calls(&self) -> usize {
        self.put_setting_calls.load(Ordering::SeqCst)
    }

    fn apply(tables: &mut Tables, request: &WriteRequest) -> Result<(), StoreError> {
        match request {
            WriteRequest::Put(value) => {
                let key = document_key(value)?;
                tables
                    .queue
                    .insert((key.queue_placement, key.run_at_modified), value.clone());
                Ok(())
            }
            WriteRequest::Delete(key) => {
                tables
                    .queue
                    .remove(&(key.queue_placement.clone(), key.run_at_modified.clone()));
                Ok(())
            }
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn table_is_active(&self) -> Result<bool, StoreError> {
        self.table_is_active_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.liveness_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(self.table_active.load(Ordering::SeqCst))
    }

    async fn query_due(&self, due_before: i64, limit: usize) -> Result<Vec<QueueItem>, StoreError> {
        self.query_due_calls.fetch_add(1, Ordering::SeqCst);
        // Sort keys carry a fractional suffix ("{run_at}.{fraction}"), so the
        // bare millisecond string sorts before every key within that
        // millisecond. Bounding below the next millisecond keeps items due at
        // exactly `due_before` in range.
        let due_bound = due_before.saturating_add(1).to_string();
        let tables = self.tables.lock().await;
        let items = tables
            .queue
            .range((
                std::ops::Bound::Included((QUEUED_PLACEMENT.to_string(), String::new())),
                std::ops::Bound::Excluded((QUEUED_PLACEMENT.to_string(), due_bound)),
            ))
            .filter_map(|(key, value)| match serde_json::from_value(value.clone()) {
                Ok(item) => Some(item),
                Err(e) => {
                    tracing::warn!("Skipping malformed queue record {key:?}: {e}");
                    None
                }
            })
            .take(limit)
            .collect();
        Ok(items)
    }

    async fn batch_write(
        &self,
        requests: Vec<WriteRequest>,
    ) -> Result<BatchWriteOutput, StoreError> {
        self.batch_write_calls.fetch_add(1, Ordering::SeqCst);
        let plan = self.batch_write_plan.lock().await.pop_front();
        let leave = match plan {
            Some(BatchWritePlan::Fail(e)) => return Err(e),
            Some(BatchWritePlan::LeaveUnprocessed(n)) => n.min(requests.len()),
            None => 0,
        };

        let mut tables = self.tables.lock().await;
        let applied = requests.len() - leave;
        for request in &requests[..applied] {
            MemoryStore::apply(&mut tables, request)?;
        }
        Ok(BatchWriteOutput {
            unprocessed: requests[applied..].to_vec(),
        })
    }

    async fn delete_item(&self, key: &QueueKey) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        tables
            .queue
            .remove(&(key.queue_placement.clone(), key.run_at_modified.clone()));
        Ok(())
    }

    async fn queued_items_for_subscriber(
        &self,
        subscriber_id: &str,
    ) -> Result<Vec<QueueKey>, StoreError> {
        let tables = self.tables.lock().await;
        let keys = tables
            .queue
            .range(partition_range(QUEUED_PLACEMENT))
            .filter(|(_, value)| {
                value.get("subscriber_id").and_then(|v| v.as_str()) == Some(subscriber_id)
            })
            .map(|((placement, sort_key), _)| QueueKey {
                queue_placement: placement.clone(),
                run_at_modified: sort_key.clone(),
            })
            .collect();
        Ok(keys)
    }

    async fn get_subscriber(
        &self,
        subscriber_id: &str,
    ) -> Result<Option<Subscriber>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.subscribers.get(subscriber_id).cloned())
    }

    async fn mark_unsubscribed(&self, subscriber_id: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        let subscriber = tables
            .subscribers
            .entry(subscriber_id.to_string())
            .or_insert_with(|| Subscriber {
                subscriber_id: subscriber_id.to_string(),
                ..Subscriber::default()
            });
        subscriber.unsubscribed = true;
        subscriber.tags = vec!["unsubscribed".to_string()];
        Ok(())
    }

    async fn get_setting(&self, name: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.settings.get(name).cloned())
    }

    async fn put_setting(&self, name: &str, value: serde_json::Value) -> Result<(), StoreError> {
        self.put_setting_calls.fetch_add(1, Ordering::SeqCst);
        let mut tables = self.tables.lock().await;
        tables.settings.insert(name.to_string(), value);
        Ok(())
    }
}

fn partition_range(
    partition: &str,
) -> (
    std::ops::Bound<(String, String)>,
    std::ops::Bound<(String, String)>,
) {
    (
        std::ops::Bound::Included((partition.to_string(), String::new())),
        std::ops::Bound::Excluded((format!("{partition}\u{0}"), String::new())),
    )
}

fn document_key(value: &serde_json::Value) -> Result<QueueKey, StoreError> {
    let queue_placement = value
        .get("queue_placement")
        .and_then(|v| v.as_str())
        .ok_or_else(|| StoreError::Other("put request missing queue_placement".into()))?;
    let run_at_modified = value
        .get("run_at_modified")
        .and_then(|v| v.as_str())
        .ok_or_else(|| StoreError::Other("put request missing run_at_modified".into()))?;
    Ok(QueueKey {
        queue_placement: queue_placement.to_string(),
        run_at_modified: run_at_modified.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::queue_item::TaskKind;

    #[tokio::test]
    async fn query_due_respects_due_time_and_limit() {
        let store = MemoryStore::new();
        for run_at in [100, 200, 300, 400] {
            store
                .insert_queue_item(&QueueItem::new(TaskKind::Wait, run_at))
                .await;
        }

        let due = store.query_due(300, 10).await.unwrap();
        assert_eq!(due.len(), 3);
        assert!(due.windows(2).all(|w| w[0].run_at <= w[1].run_at));

        let capped = store.query_due(300, 2).await.unwrap();
        assert_eq!(capped.len(), 2);
    }

    #[tokio::test]
    async fn query_due_ignores_archived_partitions() {
        let store = MemoryStore::new();
        let mut archived = QueueItem::new(TaskKind::Wait, 100);
        archived.queue_placement = "2019-01-01".into();
        store.insert_queue_item(&archived).await;

        let due = store.query_due(i64::MAX, 10).await.unwrap();
        assert!(due.is_empty());
    }

    #[tokio::test]
    async fn scripted_batch_write_reports_unprocessed_tail() {
        let store = MemoryStore::new();
        store
            .plan_batch_writes([BatchWritePlan::LeaveUnprocessed(2)])
            .await;

        let requests: Vec<WriteRequest> = (0..5)
            .map(|i| {
                WriteRequest::Put(
                    serde_json::to_value(QueueItem::new(TaskKind::Wait, i)).unwrap(),
                )
            })
            .collect();
        let output = store.batch_write(requests).await.unwrap();
        assert_eq!(output.unprocessed.len(), 2);
        assert_eq!(store.pending_items().await.len(), 3);

        // Script exhausted: the next write applies fully.
        let output = store.batch_write(output.unprocessed).await.unwrap();
        assert!(output.unprocessed.is_empty());
        assert_eq!(store.pending_items().await.len(), 5);
    }
}
