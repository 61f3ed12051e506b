use crate::models::queue_item::QueueItem;
use crate::models::task_result::TaskResult;

/// Wait tasks exist only for their due time; by the time one is pulled the
/// delay has already elapsed, so clearing it is all there is to do.
pub fn run(batch: Vec<QueueItem>) -> Vec<TaskResult> {
    batch.into_iter().map(TaskResult::success).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::queue_item::TaskKind;

    #[test]
    fn every_wait_task_succeeds() {
        let batch = vec![
            QueueItem::new(TaskKind::Wait, 100),
            QueueItem::new(TaskKind::Wait, 200),
        ];
        let results = run(batch);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.is_success()));
    }
}
