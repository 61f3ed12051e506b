use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use campaigner::config::Config;
use campaigner::delivery::{
    BulkDestination, DeliveryError, DeliveryProvider, MessageTag, SendOutcome,
};
use campaigner::models::queue_item::{EmailBody, QueueItem, TaskKind};
use campaigner::models::subscriber::Subscriber;
use campaigner::queue::processor::Processor;
use campaigner::state::SharedState;
use campaigner::store::memory::MemoryStore;

/// A queue engine wired to the in-memory store and a recording delivery
/// provider.
pub struct TestApp {
    pub state: SharedState,
    pub store: Arc<MemoryStore>,
    pub delivery: Arc<MockDelivery>,
    pub processor: Processor,
}

impl TestApp {
    /// A date stamp for today, the processing-day archive partition.
    pub fn today(&self) -> String {
        Utc::now().format("%Y-%m-%d").to_string()
    }
}

pub fn test_config() -> Config {
    Config {
        source_email: "default@example.com".to_string(),
        fallback_source_email: "fallback@example.com".to_string(),
        unsubscribe_link: "https://example.com/unsubscribe?id={{subscriberId}}&email={{email}}"
            .to_string(),
        poll_interval_ms: 1000,
        log_level: "warn".to_string(),
    }
}

pub async fn spawn_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let delivery = Arc::new(MockDelivery::new());
    let state = campaigner::build_state(
        Arc::clone(&store) as Arc<dyn campaigner::store::QueueStore>,
        Arc::clone(&delivery) as Arc<dyn DeliveryProvider>,
        test_config(),
    );
    let processor = Processor::new(Arc::clone(&state));
    TestApp {
        state,
        store,
        delivery,
        processor,
    }
}

/// A due time comfortably in the past so the item is picked up immediately.
pub fn due_now() -> i64 {
    Utc::now().timestamp_millis() - 1000
}

pub fn subscriber(id: &str, email: &str, tags: &[&str]) -> Subscriber {
    Subscriber {
        subscriber_id: id.to_string(),
        email: email.to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        ..Subscriber::default()
    }
}

/// A templated send-email task carrying its subscriber snapshot, as enqueued
/// by a campaign send.
pub fn email_item(subscriber: &Subscriber, template_id: &str) -> QueueItem {
    let mut item = QueueItem::new(TaskKind::SendEmail, due_now());
    item.subscriber_id = subscriber.subscriber_id.clone();
    item.subscriber = Some(subscriber.clone());
    item.template_id = Some(template_id.to_string());
    item
}

/// An ad-hoc send-email task with a literal subject and body.
pub fn adhoc_item(subscriber: &Subscriber, subject: &str, body: EmailBody) -> QueueItem {
    let mut item = QueueItem::new(TaskKind::SendEmail, due_now());
    item.subscriber_id = subscriber.subscriber_id.clone();
    item.subscriber = Some(subscriber.clone());
    item.subject = Some(subject.to_string());
    item.body = Some(body);
    item
}

#[derive(Debug, Clone)]
pub struct BulkCall {
    pub template_id: String,
    pub source: String,
    pub default_tags: Vec<MessageTag>,
    pub destinations: Vec<BulkDestination>,
}

#[derive(Debug, Clone)]
pub struct SingleCall {
    pub source: String,
    pub destination: String,
    pub subject: String,
    pub body: EmailBody,
}

/// Recording delivery provider. Accepts everything unless an address has
/// been marked rejected or the next bulk call has been scripted to fail.
pub struct MockDelivery {
    bulk_calls: Mutex<Vec<BulkCall>>,
    single_calls: Mutex<Vec<SingleCall>>,
    rejected_addresses: Mutex<Vec<String>>,
    fail_next_bulk: Mutex<Option<String>>,
}

impl MockDelivery {
    pub fn new() -> Self {
        Self {
            bulk_calls: Mutex::new(Vec::new()),
            single_calls: Mutex::new(Vec::new()),
            rejected_addresses: Mutex::new(Vec::new()),
            fail_next_bulk: Mutex::new(None),
        }
    }

    /// Marks an address so sends to it come back rejected.
    pub fn reject_address(&self, email: &str) {
        self.rejected_addresses
            .lock()
            .unwrap()
            .push(email.to_string());
    }

    /// Scripts the next bulk call to fail as a whole.
    pub fn fail_next_bulk(&self, reason: &str) {
        *self.fail_next_bulk.lock().unwrap() = Some(reason.to_string());
    }

    pub fn bulk_calls(&self) -> Vec<BulkCall> {
        self.bulk_calls.lock().unwrap().clone()
    }

    pub fn single_calls(&self) -> Vec<SingleCall> {
        self.single_calls.lock().unwrap().clone()
    }

    fn outcome_for(&self, email: &str) -> SendOutcome {
        if self
            .rejected_addresses
            .lock()
            .unwrap()
            .iter()
            .any(|r| r == email)
        {
            SendOutcome::Rejected {
                reason: "Address rejected".to_string(),
            }
        } else {
            SendOutcome::Accepted {
                message_id: uuid::Uuid::now_v7().to_string(),
            }
        }
    }
}

#[async_trait]
impl DeliveryProvider for MockDelivery {
    async fn send_bulk_templated(
        &self,
        template_id: &str,
        source: &str,
        default_tags: &[MessageTag],
        destinations: &[BulkDestination],
    ) -> Result<Vec<SendOutcome>, DeliveryError> {
        if let Some(reason) = self.fail_next_bulk.lock().unwrap().take() {
            return Err(DeliveryError::from(reason));
        }
        self.bulk_calls.lock().unwrap().push(BulkCall {
            template_id: template_id.to_string(),
            source: source.to_string(),
            default_tags: default_tags.to_vec(),
            destinations: destinations.to_vec(),
        });
        Ok(destinations
            .iter()
            .map(|dest| self.outcome_for(&dest.email))
            .collect())
    }

    async fn send_single(
        &self,
        source: &str,
        destination: &str,
        subject: &str,
        body: &EmailBody,
    ) -> Result<SendOutcome, DeliveryError> {
        self.single_calls.lock().unwrap().push(SingleCall {
            source: source.to_string(),
            destination: destination.to_string(),
            subject: subject.to_string(),
            body: body.clone(),
        });
        Ok(self.outcome_for(destination))
    }
}
