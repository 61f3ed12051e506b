use std::collections::HashMap;

use futures_util::future::join_all;
use serde_json::json;

use crate::delivery::{BulkDestination, MessageTag, SendOutcome};
use crate::history;
use crate::models::queue_item::QueueItem;
use crate::models::task_result::TaskResult;
use crate::settings;
use crate::state::AppState;

/// Sends the email batch. Items carrying a template id are grouped and sent
/// through one bulk call per template; items without one are ad-hoc sends
/// delivered one by one with their literal subject and body.
pub async fn run(state: &AppState, batch: Vec<QueueItem>, date_stamp: &str) -> Vec<TaskResult> {
    let (templated, adhoc): (Vec<_>, Vec<_>) =
        batch.into_iter().partition(|item| item.template_id.is_some());

    let mut groups: HashMap<String, Vec<QueueItem>> = HashMap::new();
    for item in templated {
        if let Some(template_id) = item.template_id.clone() {
            groups.entry(template_id).or_default().push(item);
        }
    }

    // Record each template's first send of the day before dispatching it.
    // History upkeep is best-effort and never blocks delivery.
    for template_id in groups.keys() {
        if state.history.mark_first_send(template_id, date_stamp).await {
            tracing::debug!("Adding {date_stamp} {template_id} to broadcast history");
            history::update_broadcast_history(&*state.store, template_id, date_stamp).await;
        }
    }

    let bulk_sends = groups
        .into_iter()
        .map(|(template_id, items)| send_template_group(state, template_id, items, date_stamp));
    let individual_sends = adhoc.into_iter().map(|item| send_individual(state, item));

    let (group_results, individual_results) = futures_util::join!(
        join_all(bulk_sends),
        join_all(individual_sends)
    );

    let mut results: Vec<TaskResult> = group_results.into_iter().flatten().collect();
    results.extend(individual_results);
    tracing::info!("Processed {} emails", results.len());
    results
}

/// One bulk templated call for a group of same-template items. The source
/// address resolves template setting → list setting → configured default.
async fn send_template_group(
    state: &AppState,
    template_id: String,
    items: Vec<QueueItem>,
    date_stamp: &str,
) -> Vec<TaskResult> {
    let template = settings::template_settings(&state.templates, &*state.store, &template_id).await;
    let unsubscribe_link = template
        .value()
        .unsubscribe_link
        .clone()
        .unwrap_or_else(|| state.config.unsubscribe_link.clone());
    let source = match template.value().source_email.clone() {
        Some(source) => source,
        None => {
            let tags = items
                .first()
                .and_then(|item| item.tag_reason.clone())
                .unwrap_or_default();
            list_source(state, &tags).await
        }
    };

    // Items missing their subscriber snapshot cannot be addressed; fail them
    // up front so destinations stay aligned with provider statuses.
    let mut results: Vec<TaskResult> = Vec::new();
    let mut sendable = Vec::new();
    for item in items {
        match item.subscriber.clone() {
            Some(subscriber) => sendable.push((item, subscriber)),
            None => results.push(TaskResult::failed(item, "Missing subscriber snapshot")),
        }
    }
    if sendable.is_empty() {
        return results;
    }

    let destinations: Vec<BulkDestination> = sendable
        .iter()
        .map(|(item, subscriber)| {
            let link = unsubscribe_link
                .replace("{{subscriberId}}", &url_encode(&subscriber.subscriber_id))
                .replace("{{email}}", &url_encode(&subscriber.email));

            let mut tags = vec![MessageTag::new(
                "RunAtModified",
                item.run_at_modified.replace('.', "_"),
            )];
            if let Some(tag) = &item.tag_on_click {
                tags.push(MessageTag::new("Interaction-Click", format!("add-tag_{tag}")));
            }
            if let Some(tag) = &item.tag_on_open {
                tags.push(MessageTag::new("Interaction-Open", format!("add-tag_{tag}")));
            }

            BulkDestination {
                email: subscriber.email.clone(),
                replacement_data: json!({
                    "subscriber": subscriber,
                    "unsubscribe_link": link,
                    "params": item.params,
                }),
                tags,
            }
        })
        .collect();

    let default_tags = [
        MessageTag::new("TemplateId", template_id.clone()),
        MessageTag::new("DateStamp", date_stamp),
    ];

    match state
        .delivery
        .send_bulk_templated(&template_id, &source, &default_tags, &destinations)
        .await
    {
        Ok(outcomes) => {
            let mut outcomes = outcomes.into_iter();
            for (item, _) in sendable {
                let result = match outcomes.next() {
                    Some(SendOutcome::Accepted { .. }) => TaskResult::success(item),
                    Some(SendOutcome::Rejected { reason }) => TaskResult::failed(item, reason),
                    None => TaskResult::failed(item, "No delivery status returned"),
                };
                results.push(result);
            }
            results
        }
        Err(e) => {
            tracing::warn!("Error sending bulk email for {template_id}: {e}");
            results.extend(
                sendable
                    .into_iter()
                    .map(|(item, _)| TaskResult::failed(item, e.message.clone())),
            );
            results
        }
    }
}

/// One ad-hoc send. The source address resolves item override → list setting
/// → configured default.
async fn send_individual(state: &AppState, item: QueueItem) -> TaskResult {
    let Some(subscriber) = item.subscriber.clone() else {
        return TaskResult::failed(item, "Missing subscriber snapshot");
    };
    let Some(subject) = item.subject.clone() else {
        return TaskResult::failed(item, "Missing subject");
    };
    let Some(body) = item.body.clone() else {
        return TaskResult::failed(item, "Missing body");
    };

    let source = match item.source_email.clone() {
        Some(source) => source,
        None => {
            let tags = item.tag_reason.clone().unwrap_or_default();
            list_source(state, &tags).await
        }
    };

    match state
        .delivery
        .send_single(&source, &subscriber.email, &subject, &body)
        .await
    {
        Ok(SendOutcome::Accepted { .. }) => TaskResult::success(item),
        Ok(SendOutcome::Rejected { reason }) => TaskResult::failed(item, reason),
        Err(e) => TaskResult::failed(item, e.message),
    }
}

/// Source email from the list referenced by the given tags, else the
/// configured default.
async fn list_source(state: &AppState, tags: &[String]) -> String {
    let list = settings::list_settings(
        &state.lists,
        &*state.store,
        &state.config.fallback_source_email,
        tags,
    )
    .await;
    list.and_then(|setting| setting.value().source_email.clone())
        .unwrap_or_else(|| state.config.source_email.clone())
}

fn url_encode(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_encode_escapes_reserved_characters() {
        assert_eq!(url_encode("me@example.com"), "me%40example.com");
        assert_eq!(url_encode("plain"), "plain");
    }
}
