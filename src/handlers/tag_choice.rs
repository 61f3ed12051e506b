use futures_util::future::join_all;

use crate::models::queue_item::QueueItem;
use crate::models::task_result::TaskResult;
use crate::state::AppState;

/// Refreshes the subscriber snapshot on each task so the follow-up
/// resolution sees current tags. A missing subscriber or a store error fails
/// the task with the reason captured.
pub async fn run(state: &AppState, batch: Vec<QueueItem>) -> Vec<TaskResult> {
    join_all(batch.into_iter().map(|item| async move {
        match state.store.get_subscriber(&item.subscriber_id).await {
            Ok(Some(subscriber)) => {
                let mut item = item;
                item.subscriber = Some(subscriber);
                TaskResult::success(item)
            }
            Ok(None) => TaskResult::failed(item, "Subscriber not found"),
            Err(e) => TaskResult::failed(item, e.to_string()),
        }
    }))
    .await
}
