//! Broadcast history bookkeeping.
//!
//! A broadcast is a (template id, day) pair. Two layers keep the record: a
//! process-local memo that suppresses redundant persisted writes within the
//! same day, and a persisted map of coalesced `{from, to}` day ranges per
//! template that answers "has this template ever been sent on date D".

use std::collections::HashMap;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::store::QueueStore;

pub const BROADCAST_HISTORY_SETTING: &str = "broadcast_history";

/// A contiguous run of days during which a template was sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: String,
    pub to: String,
}

/// Process-local first-send-of-the-day memo.
///
/// Keys are `"{date} {template}"`. When the day changes the whole map is
/// invalidated at once rather than expiring entries one by one.
pub struct HistoryTracker {
    memo: Mutex<HashMap<String, String>>,
}

impl HistoryTracker {
    pub fn new() -> Self {
        Self {
            memo: Mutex::new(HashMap::new()),
        }
    }

    /// Returns true when this is the first send of `template_id` on
    /// `date_stamp` seen by this process, recording it as seen.
    pub async fn mark_first_send(&self, template_id: &str, date_stamp: &str) -> bool {
        let mut memo = self.memo.lock().await;
        if memo.values().next().is_some_and(|day| day != date_stamp) {
            memo.clear();
        }
        let key = format!("{date_stamp} {template_id}");
        if memo.contains_key(&key) {
            return false;
        }
        memo.insert(key, date_stamp.to_string());
        true
    }
}

impl Default for HistoryTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Records that `template_id` was broadcast on `date_stamp` in the persisted
/// history, coalescing adjacent days into one range.
///
/// Rules against the template's last range: already ends today ⇒ no write;
/// ends yesterday ⇒ extend to today; otherwise append a new singleton range.
/// Failures are logged and swallowed, history upkeep never blocks sending.
pub async fn update_broadcast_history(
    store: &dyn QueueStore,
    template_id: &str,
    date_stamp: &str,
) {
    let mut history: HashMap<String, Vec<DateRange>> =
        match store.get_setting(BROADCAST_HISTORY_SETTING).await {
            Ok(Some(value)) => serde_json::from_value(value).unwrap_or_else(|e| {
                tracing::warn!("Malformed broadcast history record: {e}");
                HashMap::new()
            }),
            Ok(None) => HashMap::new(),
            Err(e) => {
                tracing::warn!("Failed to fetch broadcast history: {e}");
                return;
            }
        };

    let ranges = history.entry(template_id.to_string()).or_default();
    match ranges.last().map(|range| range.to.clone()) {
        None => {
            tracing::debug!("Initialising broadcast history for {template_id}");
            ranges.push(DateRange {
                from: date_stamp.to_string(),
                to: date_stamp.to_string(),
            });
        }
        Some(to) if to == date_stamp => {
            tracing::debug!("Broadcast already recorded for {template_id} on {date_stamp}");
            return;
        }
        Some(to) if day_before(date_stamp).as_deref() == Some(to.as_str()) => {
            tracing::debug!("Extending broadcast range for {template_id} to {date_stamp}");
            if let Some(last) = ranges.last_mut() {
                last.to = date_stamp.to_string();
            }
        }
        Some(_) => {
            tracing::debug!("Starting new broadcast range for {template_id} on {date_stamp}");
            ranges.push(DateRange {
                from: date_stamp.to_string(),
                to: date_stamp.to_string(),
            });
        }
    }

    let value = match serde_json::to_value(&history) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("Failed to serialize broadcast history: {e}");
            return;
        }
    };
    if let Err(e) = store.put_setting(BROADCAST_HISTORY_SETTING, value).await {
        tracing::warn!("Failed to save broadcast history: {e}");
    }
}

fn day_before(date_stamp: &str) -> Option<String> {
    let date = NaiveDate::parse_from_str(date_stamp, "%Y-%m-%d").ok()?;
    let previous = date.checked_sub_days(Days::new(1))?;
    Some(previous.format("%Y-%m-%d").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    async fn stored_history(store: &MemoryStore) -> HashMap<String, Vec<DateRange>> {
        let value = store.setting(BROADCAST_HISTORY_SETTING).await.unwrap();
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn first_broadcast_creates_a_singleton_range() {
        let store = MemoryStore::new();
        update_broadcast_history(&store, "Welcome", "2019-01-01").await;

        let history = stored_history(&store).await;
        assert_eq!(
            history["Welcome"],
            vec![DateRange {
                from: "2019-01-01".into(),
                to: "2019-01-01".into()
            }]
        );
    }

    #[tokio::test]
    async fn next_day_broadcast_extends_the_last_range() {
        let store = MemoryStore::new();
        update_broadcast_history(&store, "Welcome", "2019-01-01").await;
        update_broadcast_history(&store, "Welcome", "2019-01-02").await;

        let history = stored_history(&store).await;
        assert_eq!(
            history["Welcome"],
            vec![DateRange {
                from: "2019-01-01".into(),
                to: "2019-01-02".into()
            }]
        );
    }

    #[tokio::test]
    async fn same_day_broadcast_writes_nothing() {
        let store = MemoryStore::new();
        update_broadcast_history(&store, "Welcome", "2019-01-02").await;
        let writes_after_first = store.put_setting_calls();

        update_broadcast_history(&store, "Welcome", "2019-01-02").await;
        assert_eq!(store.put_setting_calls(), writes_after_first);
    }

    #[tokio::test]
    async fn gap_in_send_days_starts_a_new_range() {
        let store = MemoryStore::new();
        update_broadcast_history(&store, "Welcome", "2019-01-01").await;
        update_broadcast_history(&store, "Welcome", "2019-01-02").await;
        update_broadcast_history(&store, "Welcome", "2019-01-04").await;

        let history = stored_history(&store).await;
        assert_eq!(
            history["Welcome"],
            vec![
                DateRange {
                    from: "2019-01-01".into(),
                    to: "2019-01-02".into()
                },
                DateRange {
                    from: "2019-01-04".into(),
                    to: "2019-01-04".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn templates_track_independent_histories() {
        let store = MemoryStore::new();
        update_broadcast_history(&store, "Welcome", "2019-01-01").await;
        update_broadcast_history(&store, "Digest", "2019-01-01").await;

        let history = stored_history(&store).await;
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn memo_reports_first_send_once_per_day() {
        let tracker = HistoryTracker::new();
        assert!(tracker.mark_first_send("Welcome", "2019-01-01").await);
        assert!(!tracker.mark_first_send("Welcome", "2019-01-01").await);
        assert!(tracker.mark_first_send("Digest", "2019-01-01").await);
    }

    #[tokio::test]
    async fn memo_resets_when_the_day_rolls_over() {
        let tracker = HistoryTracker::new();
        assert!(tracker.mark_first_send("Welcome", "2019-01-01").await);
        // New day: every template is "first send" again.
        assert!(tracker.mark_first_send("Welcome", "2019-01-02").await);
        assert!(!tracker.mark_first_send("Welcome", "2019-01-02").await);
    }
}
