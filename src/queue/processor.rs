//! One processing cycle: fetch due tasks, dispatch them by type, clean up,
//! archive, and queue follow-ups.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;

use crate::error::QueueError;
use crate::handlers;
use crate::models::archive::ArchiveItem;
use crate::models::queue_item::{QueueItem, TaskKind};
use crate::models::task_result::TaskResult;
use crate::queue::batcher::{self, RetryPolicy};
use crate::queue::{MAX_ATTEMPTS, READ_BATCH_SIZE, next_steps};
use crate::state::SharedState;
use crate::store::WriteRequest;

pub struct Processor {
    state: SharedState,
    /// Set once the "nothing to process" message has been logged, so idle
    /// ticks do not spam the log.
    nothing_to_process_last_batch: AtomicBool,
}

impl Processor {
    pub fn new(state: SharedState) -> Self {
        Self {
            state,
            nothing_to_process_last_batch: AtomicBool::new(false),
        }
    }

    /// Fetches the next batch of due tasks and processes them. An empty
    /// batch is a no-op.
    pub async fn process(&self) -> Result<(), QueueError> {
        let now = Utc::now().timestamp_millis();
        let batch = self.state.store.query_due(now, READ_BATCH_SIZE).await?;

        if batch.is_empty() {
            if !self.nothing_to_process_last_batch.swap(true, Ordering::SeqCst) {
                tracing::debug!("Nothing to process");
            }
            return Ok(());
        }
        self.nothing_to_process_last_batch
            .store(false, Ordering::SeqCst);

        tracing::debug!("Pulled {} items to process", batch.len());
        self.process_batch(batch).await;
        Ok(())
    }

    async fn process_batch(&self, batch: Vec<QueueItem>) {
        let mut email_batch = Vec::new();
        let mut choice_batch = Vec::new();
        let mut unsubscribe_batch = Vec::new();
        let mut wait_batch = Vec::new();
        for item in batch {
            match item.kind {
                TaskKind::SendEmail => email_batch.push(item),
                TaskKind::TagChoice => choice_batch.push(item),
                TaskKind::Unsubscribe => unsubscribe_batch.push(item),
                TaskKind::Wait => wait_batch.push(item),
                TaskKind::Unknown => {
                    tracing::warn!(
                        "Dropping task with unrecognised type (key {:?})",
                        item.key()
                    );
                }
            }
        }

        if email_batch.is_empty()
            && choice_batch.is_empty()
            && unsubscribe_batch.is_empty()
            && wait_batch.is_empty()
        {
            tracing::info!("No tasks with recognised task types");
            return;
        }

        let date_stamp = Utc::now().format("%Y-%m-%d").to_string();

        // Handlers for the non-empty sub-batches run concurrently; empty
        // ones short-circuit without being invoked.
        let state = &self.state;
        let (email_results, choice_results, unsubscribe_results) = futures_util::join!(
            async {
                if email_batch.is_empty() {
                    Vec::new()
                } else {
                    handlers::email::run(state, email_batch, &date_stamp).await
                }
            },
            async {
                if choice_batch.is_empty() {
                    Vec::new()
                } else {
                    handlers::tag_choice::run(state, choice_batch).await
                }
            },
            async {
                if unsubscribe_batch.is_empty() {
                    Vec::new()
                } else {
                    handlers::unsubscribe::run(state, unsubscribe_batch).await
                }
            },
        );
        let wait_results = handlers::wait::run(wait_batch);

        let mut results = email_results;
        results.extend(choice_results);
        results.extend(unsubscribe_results);
        results.extend(wait_results);
        tracing::debug!("Got {} processing results. Now cleaning up", results.len());

        // Clean up: terminal items (success, or out of attempts) are deleted;
        // first-time failures are rewritten in place for one more try.
        let cleanup_requests: Vec<WriteRequest> = results
            .iter()
            .filter_map(|result| {
                if is_terminal(result) {
                    Some(WriteRequest::Delete(result.item.key()))
                } else {
                    let updated = reschedule_for_retry(result);
                    match serde_json::to_value(&updated) {
                        Ok(value) => Some(WriteRequest::Put(value)),
                        Err(e) => {
                            tracing::error!("Failed to serialize retry update: {e}");
                            None
                        }
                    }
                }
            })
            .collect();
        let cleaned = batcher::write_all(
            &*self.state.store,
            cleanup_requests,
            &RetryPolicy::cleanup(),
        )
        .await;
        tracing::debug!("{cleaned} cleanup tasks complete");

        // Archive the terminal items (deleted rows live on as audit records).
        let archive_requests: Vec<WriteRequest> = results
            .iter()
            .filter(|result| is_terminal(result))
            .filter_map(
                |result| match serde_json::to_value(ArchiveItem::from_result(result, &date_stamp)) {
                    Ok(value) => Some(WriteRequest::Put(value)),
                    Err(e) => {
                        tracing::error!("Failed to serialize archive item: {e}");
                        None
                    }
                },
            )
            .collect();
        if !archive_requests.is_empty() {
            let archived =
                batcher::write_all(&*self.state.store, archive_requests, &RetryPolicy::archive())
                    .await;
            tracing::debug!("{archived} archive tasks complete");
        }

        // Queue follow-up actions for the successful tasks.
        let successes: Vec<QueueItem> = results
            .into_iter()
            .filter(TaskResult::is_success)
            .map(|result| result.item)
            .collect();
        if !successes.is_empty() {
            next_steps::queue_next_steps(&self.state, successes).await;
        }
    }
}

/// A result is terminal when the task succeeded or this failure was its last
/// permitted attempt.
fn is_terminal(result: &TaskResult) -> bool {
    result.is_success() || result.item.attempts + 1 >= MAX_ATTEMPTS
}

/// The in-place rewrite that gives a first-time failure its retry: attempt
/// counted, failure flagged, reason appended to any prior one.
fn reschedule_for_retry(result: &TaskResult) -> QueueItem {
    let mut updated = result.item.clone();
    updated.failed = true;
    updated.attempts += 1;
    updated.last_attempt = Some(result.timestamp);
    if let Some(reason) = &result.failure_reason {
        let prior = updated.failure_reason.as_deref().unwrap_or("");
        updated.failure_reason = Some(format!("{prior} {reason}").trim().to_string());
    }
    updated
}
