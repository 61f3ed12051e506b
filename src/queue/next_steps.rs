//! Autoresponder follow-up resolution.
//!
//! After a batch completes, each successful task that belongs to a workflow
//! may queue the workflow's next step. Resolution is tolerant by design: a
//! removed definition, a renamed step or an undefined branch target all mean
//! the subscriber leaves the sequence, not that processing failed.

use chrono::Utc;
use futures_util::future::join_all;

use crate::models::autoresponder::Step;
use crate::models::queue_item::{QueueItem, TaskKind};
use crate::queue::batcher::{self, RetryPolicy};
use crate::settings;
use crate::state::AppState;
use crate::store::WriteRequest;

/// Resolves and enqueues follow-up tasks for the given successfully
/// completed items. All resolutions run concurrently; the resulting items go
/// to the store in a single batched write.
pub async fn queue_next_steps(state: &AppState, items: Vec<QueueItem>) {
    // Not every task belongs to a workflow.
    let candidates: Vec<QueueItem> = items
        .into_iter()
        .filter(|item| item.autoresponder_id.is_some() && item.autoresponder_step.is_some())
        .collect();
    if candidates.is_empty() {
        return;
    }

    let put_requests: Vec<WriteRequest> = join_all(
        candidates
            .iter()
            .map(|item| resolve_next_step(state, item)),
    )
    .await
    .into_iter()
    .flatten()
    .collect();

    if put_requests.is_empty() {
        return;
    }
    let queued = batcher::write_all(&*state.store, put_requests, &RetryPolicy::cleanup()).await;
    tracing::debug!("Queued {queued} follow-up tasks");
}

async fn resolve_next_step(state: &AppState, item: &QueueItem) -> Option<WriteRequest> {
    let autoresponder_id = item.autoresponder_id.as_deref()?;
    let step_name = item.autoresponder_step.as_deref()?;

    let definition =
        settings::autoresponder(&state.autoresponders, &*state.store, autoresponder_id).await;
    let steps = &definition.value().steps;
    let Some(current) = steps.get(step_name) else {
        // The workflow was edited or removed since this task was queued.
        tracing::debug!("Autoresponder step {step_name} not found in {autoresponder_id}");
        return None;
    };

    let next_name = next_step_name(current, item)?;
    // An action naming no existing step is a valid "leave the sequence"
    // signal, e.g. an undefined no_action.
    let next_step = steps.get(&next_name)?;

    let run_at = Utc::now().timestamp_millis() + current.run_next_in.unwrap_or(0);
    let next_item = follow_up_item(next_step, &next_name, item, run_at);
    match serde_json::to_value(&next_item) {
        Ok(value) => Some(WriteRequest::Put(value)),
        Err(e) => {
            tracing::error!("Failed to serialize follow-up task: {e}");
            None
        }
    }
}

/// The name of the step to queue next: an explicit `next_action` wins;
/// tag-choice steps branch on whether the subscriber carries the checked
/// tag.
fn next_step_name(current: &Step, item: &QueueItem) -> Option<String> {
    if current.next_action.is_some() {
        return current.next_action.clone();
    }
    if current.kind == TaskKind::TagChoice {
        let has_tag = match (&current.tag_to_check, &item.subscriber) {
            (Some(tag), Some(subscriber)) => subscriber.has_tag(tag),
            _ => false,
        };
        return if has_tag {
            current.yes_action.clone()
        } else {
            current.no_action.clone()
        };
    }
    None
}

/// Builds the queue item for a follow-up step: the step's payload fields
/// plus the workflow linkage carried over from the completed task.
fn follow_up_item(step: &Step, step_name: &str, source: &QueueItem, run_at: i64) -> QueueItem {
    let mut item = QueueItem::new(step.kind, run_at);
    item.subscriber = source.subscriber.clone();
    item.subscriber_id = source.subscriber_id.clone();
    item.autoresponder_id = source.autoresponder_id.clone();
    item.autoresponder_step = Some(step_name.to_string());
    item.template_id = step.template_id.clone();
    item.params = step.params.clone();
    item.tag_on_open = step.tag_on_open.clone();
    item.tag_on_click = step.tag_on_click.clone();
    item.tag_reason = step.tag_reason.clone();
    item.subject = step.subject.clone();
    item.body = step.body.clone();
    item.source_email = step.source_email.clone();
    item
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::subscriber::Subscriber;

    fn subscriber_with_tags(tags: &[&str]) -> Subscriber {
        Subscriber {
            subscriber_id: "s1".into(),
            email: "s1@example.com".into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            ..Subscriber::default()
        }
    }

    fn workflow_item(subscriber: Subscriber) -> QueueItem {
        let mut item = QueueItem::new(TaskKind::TagChoice, 100);
        item.subscriber_id = subscriber.subscriber_id.clone();
        item.subscriber = Some(subscriber);
        item.autoresponder_id = Some("welcome".into());
        item.autoresponder_step = Some("check-vip".into());
        item
    }

    #[test]
    fn explicit_next_action_wins() {
        let step = Step {
            kind: TaskKind::SendEmail,
            next_action: Some("followup".into()),
            ..Step::default()
        };
        let item = workflow_item(subscriber_with_tags(&[]));
        assert_eq!(next_step_name(&step, &item).as_deref(), Some("followup"));
    }

    #[test]
    fn tag_choice_branches_on_subscriber_tags() {
        let step = Step {
            kind: TaskKind::TagChoice,
            tag_to_check: Some("vip".into()),
            yes_action: Some("vip-offer".into()),
            no_action: Some("standard-offer".into()),
            ..Step::default()
        };

        let vip = workflow_item(subscriber_with_tags(&["vip"]));
        assert_eq!(next_step_name(&step, &vip).as_deref(), Some("vip-offer"));

        let regular = workflow_item(subscriber_with_tags(&[]));
        assert_eq!(
            next_step_name(&step, &regular).as_deref(),
            Some("standard-offer")
        );
    }

    #[test]
    fn non_choice_step_without_next_action_ends_the_workflow() {
        let step = Step {
            kind: TaskKind::SendEmail,
            ..Step::default()
        };
        let item = workflow_item(subscriber_with_tags(&[]));
        assert!(next_step_name(&step, &item).is_none());
    }

    #[test]
    fn follow_up_carries_workflow_linkage_and_step_payload() {
        let step = Step {
            kind: TaskKind::SendEmail,
            template_id: Some("Offer".into()),
            tag_on_open: Some("opened-offer".into()),
            ..Step::default()
        };
        let source = workflow_item(subscriber_with_tags(&["vip"]));

        let item = follow_up_item(&step, "vip-offer", &source, 12345);
        assert_eq!(item.kind, TaskKind::SendEmail);
        assert_eq!(item.run_at, 12345);
        assert_eq!(item.autoresponder_id.as_deref(), Some("welcome"));
        assert_eq!(item.autoresponder_step.as_deref(), Some("vip-offer"));
        assert_eq!(item.template_id.as_deref(), Some("Offer"));
        assert_eq!(item.subscriber_id, "s1");
        assert_eq!(item.attempts, 0);
        assert!(item.is_pending());
    }
}
