use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::models::queue_item::QueueItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Success,
    Failed,
}

/// Outcome of running one handler over one queue item. Handlers produce
/// exactly one result per input item; failures are captured here instead of
/// being thrown past the handler.
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub item: QueueItem,
    pub status: TaskStatus,
    pub timestamp: i64,
    pub failure_reason: Option<String>,
}

impl TaskResult {
    pub fn success(item: QueueItem) -> Self {
        Self {
            item,
            status: TaskStatus::Success,
            timestamp: Utc::now().timestamp_millis(),
            failure_reason: None,
        }
    }

    pub fn failed(item: QueueItem, reason: impl Into<String>) -> Self {
        Self {
            item,
            status: TaskStatus::Failed,
            timestamp: Utc::now().timestamp_millis(),
            failure_reason: Some(reason.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Success
    }
}
