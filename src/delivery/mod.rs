pub mod console;

use async_trait::async_trait;

use crate::models::queue_item::EmailBody;

/// Failure reported by a delivery provider call as a whole (as opposed to a
/// per-destination rejection).
#[derive(Debug)]
pub struct DeliveryError {
    pub message: String,
}

impl std::fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<String> for DeliveryError {
    fn from(s: String) -> Self {
        DeliveryError { message: s }
    }
}

impl From<&str> for DeliveryError {
    fn from(s: &str) -> Self {
        DeliveryError {
            message: s.to_string(),
        }
    }
}

/// Correlation tag attached to an outgoing message, surfaced back by the
/// provider on opens/clicks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTag {
    pub name: String,
    pub value: String,
}

impl MessageTag {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One recipient of a bulk templated send.
#[derive(Debug, Clone)]
pub struct BulkDestination {
    pub email: String,
    /// Per-destination replacement values for provider-side template
    /// rendering.
    pub replacement_data: serde_json::Value,
    pub tags: Vec<MessageTag>,
}

/// Per-destination result of a send, in destination order.
#[derive(Debug, Clone)]
pub enum SendOutcome {
    Accepted { message_id: String },
    Rejected { reason: String },
}

/// Bulk email delivery provider consumed by the send-email handler.
///
/// Template storage and placeholder substitution live on the provider side;
/// the engine only hands over per-destination replacement data.
#[async_trait]
pub trait DeliveryProvider: Send + Sync {
    /// Sends one template to many destinations, returning one outcome per
    /// destination in the same order.
    async fn send_bulk_templated(
        &self,
        template_id: &str,
        source: &str,
        default_tags: &[MessageTag],
        destinations: &[BulkDestination],
    ) -> Result<Vec<SendOutcome>, DeliveryError>;

    /// Sends a single literal message (ad-hoc sends carry their own subject
    /// and body instead of a template).
    async fn send_single(
        &self,
        source: &str,
        destination: &str,
        subject: &str,
        body: &EmailBody,
    ) -> Result<SendOutcome, DeliveryError>;
}
