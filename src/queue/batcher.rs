//! Write-until-done batching against the store's bulk-write API.
//!
//! Bulk writes can partially fail: the store applies what it can and hands
//! back the rest as unprocessed. Each chunk here is driven until the store
//! has accepted every request, absorbing partial failures and
//! throughput-exceeded errors with randomized backoff so concurrent chunks
//! do not retry in lockstep.

use std::time::Duration;

use futures_util::future::join_all;

use crate::queue::WRITE_BATCH_SIZE;
use crate::store::{QueueStore, StoreError, WriteRequest};

/// Backoff and bounding knobs for driving one chunk to completion.
///
/// Delays are upper bounds; each wait is drawn uniformly from zero to the
/// bound. Archive writes are lower priority and back off harder.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Cap on bulk-write calls per chunk before it is abandoned.
    pub max_attempts: u32,
    /// Delay bound after a partial failure (unprocessed subset resubmit).
    pub unprocessed_delay: Duration,
    /// Delay bound after a throughput-exceeded error (whole chunk resubmit).
    pub throughput_delay: Duration,
}

impl RetryPolicy {
    /// Policy for cleanup and follow-up writes.
    pub fn cleanup() -> Self {
        Self {
            max_attempts: 25,
            unprocessed_delay: Duration::from_millis(300),
            throughput_delay: Duration::from_millis(500),
        }
    }

    /// Policy for archive writes.
    pub fn archive() -> Self {
        Self {
            max_attempts: 25,
            unprocessed_delay: Duration::from_millis(800),
            throughput_delay: Duration::from_millis(3000),
        }
    }
}

/// Splits requests into chunks of the store's bulk-write limit.
pub fn split_requests(requests: Vec<WriteRequest>) -> Vec<Vec<WriteRequest>> {
    let mut batches = Vec::new();
    let mut current = Vec::new();
    for request in requests {
        if current.len() == WRITE_BATCH_SIZE {
            batches.push(std::mem::take(&mut current));
        }
        current.push(request);
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

/// Drives one chunk to completion, returning how many requests the store
/// accepted. Unrecoverable errors abandon the remainder of the chunk rather
/// than propagating; the other chunks keep going.
pub async fn write_until_done(
    store: &dyn QueueStore,
    mut batch: Vec<WriteRequest>,
    policy: &RetryPolicy,
) -> usize {
    let mut completed = 0;
    let mut attempts = 0;
    while !batch.is_empty() {
        if attempts >= policy.max_attempts {
            tracing::warn!(
                "Abandoning chunk after {attempts} attempts with {} requests unwritten",
                batch.len()
            );
            break;
        }
        attempts += 1;

        match store.batch_write(batch.clone()).await {
            Ok(output) => {
                if output.unprocessed.is_empty() {
                    completed += batch.len();
                    break;
                }
                tracing::debug!(
                    "Rescheduling {} unprocessed write requests",
                    output.unprocessed.len()
                );
                completed += batch.len() - output.unprocessed.len();
                batch = output.unprocessed;
                tokio::time::sleep(jitter(policy.unprocessed_delay)).await;
            }
            Err(StoreError::ThroughputExceeded) => {
                tracing::debug!("Requeuing chunk after throughput exceeded");
                tokio::time::sleep(jitter(policy.throughput_delay)).await;
            }
            Err(e) => {
                tracing::error!("Chunk write failed: {e}; sample request: {:?}", batch.first());
                break;
            }
        }
    }
    completed
}

/// Splits the requests into chunks and drives them all concurrently,
/// returning the total number accepted.
pub async fn write_all(
    store: &dyn QueueStore,
    requests: Vec<WriteRequest>,
    policy: &RetryPolicy,
) -> usize {
    let counts = join_all(
        split_requests(requests)
            .into_iter()
            .map(|batch| write_until_done(store, batch, policy)),
    )
    .await;
    counts.into_iter().sum()
}

fn jitter(bound: Duration) -> Duration {
    bound.mul_f64(rand::random::<f64>())
}
