use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::queue_item::{EmailBody, TaskKind};

/// A named multi-step follow-up workflow. Definitions are read-only to the
/// engine and fetched through the setting cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Autoresponder {
    #[serde(default)]
    pub steps: HashMap<String, Step>,
}

/// One step of an autoresponder. The routing fields decide the follow-up
/// step; the payload fields are copied onto the queue item built for it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Step {
    #[serde(rename = "type", default)]
    pub kind: TaskKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_to_check: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yes_action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_action: Option<String>,
    /// Delay in milliseconds before the follow-up step becomes due.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_next_in: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_on_open: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_on_click: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_reason: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<EmailBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_email: Option<String>,
}
