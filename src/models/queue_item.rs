use serde::{Deserialize, Serialize};

use crate::models::subscriber::Subscriber;
use crate::store::QueueKey;

/// Partition value a task keeps while it is pending. Archived copies move to
/// a date-stamp partition instead.
pub const QUEUED_PLACEMENT: &str = "queued";

/// The closed set of task types the processor dispatches on.
///
/// `Unknown` absorbs unrecognised type strings coming out of the store so a
/// single bad record cannot fail batch deserialization; the processor drops
/// such tasks with a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    SendEmail,
    TagChoice,
    Unsubscribe,
    Wait,
    Unknown,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::SendEmail => "send-email",
            TaskKind::TagChoice => "tag-choice",
            TaskKind::Unsubscribe => "unsubscribe",
            TaskKind::Wait => "wait",
            TaskKind::Unknown => "unknown",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "send-email" => TaskKind::SendEmail,
            "tag-choice" => TaskKind::TagChoice,
            "unsubscribe" => TaskKind::Unsubscribe,
            "wait" => TaskKind::Wait,
            _ => TaskKind::Unknown,
        }
    }
}

impl Default for TaskKind {
    fn default() -> Self {
        TaskKind::Unknown
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for TaskKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TaskKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(TaskKind::from_str(&value))
    }
}

/// Body of an ad-hoc (non-templated) send. At least one part should be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// One unit of scheduled work.
///
/// Identity is (`queue_placement`, `run_at_modified`): the sort key is the
/// due time in epoch milliseconds with a random fractional suffix, which
/// keeps due-time ordering while guaranteeing uniqueness among items created
/// in the same millisecond.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub queue_placement: String,
    pub run_at_modified: String,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    pub run_at: i64,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub failed: bool,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt: Option<i64>,
    #[serde(default)]
    pub subscriber_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscriber: Option<Subscriber>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_on_open: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_on_click: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoresponder_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoresponder_step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_reason: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broadcast_run_at_id: Option<String>,
    // Ad-hoc sends carry their content inline instead of a template id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<EmailBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_email: Option<String>,
}

impl QueueItem {
    /// Creates a pending task with default bookkeeping fields, due at
    /// `run_at` (epoch milliseconds).
    pub fn new(kind: TaskKind, run_at: i64) -> Self {
        Self {
            queue_placement: QUEUED_PLACEMENT.to_string(),
            run_at_modified: run_at_modified(run_at),
            kind,
            run_at,
            attempts: 0,
            failed: false,
            completed: false,
            failure_reason: None,
            last_attempt: None,
            subscriber_id: String::new(),
            subscriber: None,
            template_id: None,
            params: None,
            tag_on_open: None,
            tag_on_click: None,
            autoresponder_id: None,
            autoresponder_step: None,
            tag_reason: None,
            start_date: None,
            broadcast_run_at_id: None,
            subject: None,
            body: None,
            source_email: None,
        }
    }

    pub fn key(&self) -> QueueKey {
        QueueKey {
            queue_placement: self.queue_placement.clone(),
            run_at_modified: self.run_at_modified.clone(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.queue_placement == QUEUED_PLACEMENT
    }
}

/// Builds the unique sort key for a due time: the epoch-millisecond value
/// followed by a random fractional suffix. Lexicographic order on these keys
/// matches numeric order on the due times.
pub fn run_at_modified(run_at: i64) -> String {
    format!("{run_at}.{:09}", rand::random_range(0..1_000_000_000u32))
}
