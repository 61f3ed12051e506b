//! Console delivery adapter: logs what it would send and accepts everything.
//! Used in local development where no real provider is wired up.

use async_trait::async_trait;
use uuid::Uuid;

use crate::delivery::{
    BulkDestination, DeliveryError, DeliveryProvider, MessageTag, SendOutcome,
};
use crate::models::queue_item::EmailBody;

pub struct ConsoleDelivery;

impl ConsoleDelivery {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ConsoleDelivery {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeliveryProvider for ConsoleDelivery {
    async fn send_bulk_templated(
        &self,
        template_id: &str,
        source: &str,
        default_tags: &[MessageTag],
        destinations: &[BulkDestination],
    ) -> Result<Vec<SendOutcome>, DeliveryError> {
        let recipients = destinations
            .iter()
            .map(|dest| dest.email.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        tracing::info!("Sending \"{template_id}\" template from {source} to: {recipients}");
        for tag in default_tags {
            tracing::debug!("Default tag {}={}", tag.name, tag.value);
        }
        Ok(destinations
            .iter()
            .map(|_| SendOutcome::Accepted {
                message_id: Uuid::now_v7().to_string(),
            })
            .collect())
    }

    async fn send_single(
        &self,
        source: &str,
        destination: &str,
        subject: &str,
        body: &EmailBody,
    ) -> Result<SendOutcome, DeliveryError> {
        let parts = match (&body.html, &body.text) {
            (Some(_), Some(_)) => "html+text",
            (Some(_), None) => "html",
            (None, Some(_)) => "text",
            (None, None) => "empty",
        };
        tracing::info!("Sending \"{subject}\" ({parts}) from {source} to {destination}");
        Ok(SendOutcome::Accepted {
            message_id: Uuid::now_v7().to_string(),
        })
    }
}
