use serde::{Deserialize, Serialize};

use crate::models::queue_item::TaskKind;
use crate::models::subscriber::Subscriber;
use crate::models::task_result::TaskResult;

/// Terminal, read-only projection of a processed queue item.
///
/// The subscriber snapshot and send params are nulled out before archiving;
/// lineage fields survive so a send can be traced back to its broadcast or
/// workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveItem {
    /// Partition: the item's original `start_date` when present (broadcast
    /// sends), otherwise the day it was processed.
    pub queue_placement: String,
    pub run_at_modified: String,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    pub run_at: i64,
    pub attempts: u32,
    pub completed: bool,
    pub failed: bool,
    pub last_attempt: i64,
    /// Always null; kept in the record so archived rows share the queue item
    /// shape.
    pub params: Option<serde_json::Value>,
    pub subscriber: Option<Subscriber>,
    pub subscriber_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broadcast_run_at_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoresponder_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoresponder_step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_reason: Option<Vec<String>>,
}

impl ArchiveItem {
    /// Projects a processing result into its archive record. `date_stamp` is
    /// the processing day, used when the item carries no `start_date`.
    pub fn from_result(result: &TaskResult, date_stamp: &str) -> Self {
        let item = &result.item;
        Self {
            queue_placement: item
                .start_date
                .clone()
                .unwrap_or_else(|| date_stamp.to_string()),
            run_at_modified: item.run_at_modified.clone(),
            kind: item.kind,
            run_at: item.run_at,
            attempts: item.attempts + 1,
            completed: true,
            failed: item.failed,
            last_attempt: result.timestamp,
            params: None,
            subscriber: None,
            subscriber_id: item.subscriber_id.clone(),
            template_id: item.template_id.clone(),
            broadcast_run_at_id: item.broadcast_run_at_id.clone(),
            failure_reason: item.failure_reason.clone(),
            autoresponder_id: item.autoresponder_id.clone(),
            autoresponder_step: item.autoresponder_step.clone(),
            tag_reason: item.tag_reason.clone(),
        }
    }
}
