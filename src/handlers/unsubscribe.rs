use futures_util::future::join_all;

use crate::models::queue_item::QueueItem;
use crate::models::task_result::TaskResult;
use crate::state::AppState;

/// Unsubscribes each task's subscriber: flags the record, resets tags to
/// `["unsubscribed"]` and deletes every still-queued task for them so no
/// further sends go out. The queued-task deletes are direct (not routed
/// through the write-until-done batcher).
pub async fn run(state: &AppState, batch: Vec<QueueItem>) -> Vec<TaskResult> {
    join_all(batch.into_iter().map(|item| async move {
        match unsubscribe_one(state, &item).await {
            Ok(()) => TaskResult::success(item),
            Err(reason) => TaskResult::failed(item, reason),
        }
    }))
    .await
}

async fn unsubscribe_one(state: &AppState, item: &QueueItem) -> Result<(), String> {
    let queued = state
        .store
        .queued_items_for_subscriber(&item.subscriber_id)
        .await
        .map_err(|e| format!("Failed to look up queued tasks: {e}"))?;

    state
        .store
        .mark_unsubscribed(&item.subscriber_id)
        .await
        .map_err(|e| format!("Failed to update subscriber: {e}"))?;

    // The unsubscribe task itself is among the queued items; deleting it
    // here is fine, the processor's own cleanup delete is idempotent.
    let deletes = join_all(
        queued
            .iter()
            .map(|key| async move { state.store.delete_item(key).await }),
    )
    .await;
    for result in deletes {
        result.map_err(|e| format!("Failed to delete queued task: {e}"))?;
    }
    Ok(())
}
