//! Memoized settings lookups.
//!
//! Template, list and autoresponder definitions are read on every batch, so
//! they are cached with a jittered TTL. A failed or empty lookup caches a
//! fallback value for the same TTL instead of re-fetching on every task.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::models::autoresponder::Autoresponder;
use crate::store::QueueStore;

const CACHE_TTL: Duration = Duration::from_secs(600);
const CACHE_TTL_JITTER: Duration = Duration::from_secs(15);

/// A cached setting, tagged with whether it came from the store or is a
/// stand-in cached after a failed or empty lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Setting<T> {
    Confirmed(T),
    Fallback(T),
}

impl<T> Setting<T> {
    pub fn value(&self) -> &T {
        match self {
            Setting::Confirmed(v) | Setting::Fallback(v) => v,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Setting::Fallback(_))
    }
}

struct CacheEntry<T> {
    setting: Setting<T>,
    expires_at: Instant,
}

/// TTL cache for one family of settings records. Expiry is jittered so many
/// keys cached in the same batch do not all refresh on the same tick.
pub struct SettingCache<T> {
    entries: DashMap<String, CacheEntry<T>>,
    ttl: Duration,
    max_jitter: Duration,
}

impl<T: Clone> SettingCache<T> {
    pub fn new() -> Self {
        Self::with_ttl(CACHE_TTL, CACHE_TTL_JITTER)
    }

    pub fn with_ttl(ttl: Duration, max_jitter: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_jitter,
        }
    }

    pub fn get(&self, key: &str) -> Option<Setting<T>> {
        let entry = self.entries.get(key)?;
        if Instant::now() < entry.expires_at {
            Some(entry.setting.clone())
        } else {
            None
        }
    }

    pub fn insert(&self, key: impl Into<String>, setting: Setting<T>) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                setting,
                expires_at: self.expiry(),
            },
        );
    }

    fn expiry(&self) -> Instant {
        Instant::now() + self.ttl + self.max_jitter.mul_f64(rand::random::<f64>())
    }
}

impl<T: Clone> Default for SettingCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateSettings {
    #[serde(default)]
    pub source_email: Option<String>,
    #[serde(default)]
    pub unsubscribe_link: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListSettings {
    pub id: String,
    #[serde(default)]
    pub source_email: Option<String>,
}

/// Settings for one template, cached under its id.
pub async fn template_settings(
    cache: &SettingCache<TemplateSettings>,
    store: &dyn QueueStore,
    template_id: &str,
) -> Setting<TemplateSettings> {
    if let Some(cached) = cache.get(template_id) {
        return cached;
    }

    let setting = match store.get_setting(&format!("template-{template_id}")).await {
        Ok(Some(value)) => match serde_json::from_value(value) {
            Ok(settings) => Setting::Confirmed(settings),
            Err(e) => {
                tracing::warn!("Malformed settings for template {template_id}: {e}");
                Setting::Fallback(TemplateSettings::default())
            }
        },
        Ok(None) => Setting::Fallback(TemplateSettings::default()),
        Err(e) => {
            tracing::warn!("Failed to fetch settings for template {template_id}: {e}");
            Setting::Fallback(TemplateSettings::default())
        }
    };
    cache.insert(template_id, setting.clone());
    setting
}

/// Settings for the list referenced by the given tags, if any.
///
/// The list id is the first tag carrying the `list-` prefix; all lists live
/// in a single settings record, so one fetch caches every list at once. A
/// missing list caches a fallback carrying the configured fallback source
/// email.
pub async fn list_settings(
    cache: &SettingCache<ListSettings>,
    store: &dyn QueueStore,
    fallback_source_email: &str,
    tags: &[String],
) -> Option<Setting<ListSettings>> {
    let list_id = tags.iter().find(|tag| tag.starts_with("list-"))?.clone();

    if let Some(cached) = cache.get(&list_id) {
        return Some(cached);
    }

    let fallback = || ListSettings {
        id: list_id.clone(),
        source_email: Some(fallback_source_email.to_string()),
    };

    let lists: Vec<ListSettings> = match store.get_setting("lists").await {
        Ok(Some(value)) => serde_json::from_value(value).unwrap_or_else(|e| {
            tracing::warn!("Malformed lists settings record: {e}");
            Vec::new()
        }),
        Ok(None) => Vec::new(),
        Err(e) => {
            tracing::warn!("Failed to fetch lists settings: {e}");
            Vec::new()
        }
    };

    for list in &lists {
        cache.insert(list.id.clone(), Setting::Confirmed(list.clone()));
    }

    let setting = match lists.into_iter().find(|list| list.id == list_id) {
        Some(list) => Setting::Confirmed(list),
        None => {
            let setting = Setting::Fallback(fallback());
            cache.insert(list_id, setting.clone());
            setting
        }
    };
    Some(setting)
}

/// An autoresponder definition, cached under its id. A missing definition
/// caches an empty workflow, which downstream resolution treats as "exit the
/// sequence".
pub async fn autoresponder(
    cache: &SettingCache<Autoresponder>,
    store: &dyn QueueStore,
    autoresponder_id: &str,
) -> Setting<Autoresponder> {
    if let Some(cached) = cache.get(autoresponder_id) {
        return cached;
    }

    let setting = match store
        .get_setting(&format!("autoresponder-{autoresponder_id}"))
        .await
    {
        Ok(Some(value)) => match serde_json::from_value(value) {
            Ok(definition) => Setting::Confirmed(definition),
            Err(e) => {
                tracing::warn!("Malformed autoresponder {autoresponder_id}: {e}");
                Setting::Fallback(Autoresponder::default())
            }
        },
        Ok(None) => Setting::Fallback(Autoresponder::default()),
        Err(e) => {
            tracing::warn!("Failed to fetch autoresponder {autoresponder_id}: {e}");
            Setting::Fallback(Autoresponder::default())
        }
    };
    cache.insert(autoresponder_id, setting.clone());
    setting
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    #[tokio::test]
    async fn template_settings_are_cached_between_calls() {
        let store = MemoryStore::new();
        store
            .seed_setting(
                "template-Welcome",
                serde_json::json!({ "source_email": "news@example.com" }),
            )
            .await;
        let cache = SettingCache::new();

        let first = template_settings(&cache, &store, "Welcome").await;
        assert!(!first.is_fallback());
        assert_eq!(
            first.value().source_email.as_deref(),
            Some("news@example.com")
        );

        // Second read is served from cache: mutating the store has no effect.
        store
            .seed_setting("template-Welcome", serde_json::json!({}))
            .await;
        let second = template_settings(&cache, &store, "Welcome").await;
        assert_eq!(
            second.value().source_email.as_deref(),
            Some("news@example.com")
        );
    }

    #[tokio::test]
    async fn missing_template_caches_a_fallback() {
        let store = MemoryStore::new();
        let cache = SettingCache::new();

        let setting = template_settings(&cache, &store, "Ghost").await;
        assert!(setting.is_fallback());
        assert!(setting.value().source_email.is_none());

        // The fallback itself is cached, so the miss is not re-fetched.
        assert!(cache.get("Ghost").is_some());
    }

    #[tokio::test]
    async fn expired_entries_are_refetched() {
        let store = MemoryStore::new();
        store
            .seed_setting(
                "template-Welcome",
                serde_json::json!({ "source_email": "a@example.com" }),
            )
            .await;
        let cache = SettingCache::with_ttl(Duration::from_millis(10), Duration::ZERO);

        template_settings(&cache, &store, "Welcome").await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.get("Welcome").is_none());

        store
            .seed_setting(
                "template-Welcome",
                serde_json::json!({ "source_email": "b@example.com" }),
            )
            .await;
        let refreshed = template_settings(&cache, &store, "Welcome").await;
        assert_eq!(
            refreshed.value().source_email.as_deref(),
            Some("b@example.com")
        );
    }

    #[tokio::test]
    async fn list_settings_resolve_by_list_tag() {
        let store = MemoryStore::new();
        store
            .seed_setting(
                "lists",
                serde_json::json!([
                    { "id": "list-news", "source_email": "news@example.com" },
                    { "id": "list-offers", "source_email": "offers@example.com" },
                ]),
            )
            .await;
        let cache = SettingCache::new();

        let tags = vec!["vip".to_string(), "list-offers".to_string()];
        let setting = list_settings(&cache, &store, "fallback@example.com", &tags)
            .await
            .unwrap();
        assert!(!setting.is_fallback());
        assert_eq!(
            setting.value().source_email.as_deref(),
            Some("offers@example.com")
        );

        // The single fetch cached every list.
        assert!(cache.get("list-news").is_some());
    }

    #[tokio::test]
    async fn list_settings_without_list_tag_resolve_to_none() {
        let store = MemoryStore::new();
        let cache = SettingCache::new();
        let tags = vec!["vip".to_string()];
        assert!(
            list_settings(&cache, &store, "fallback@example.com", &tags)
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn unknown_list_falls_back_to_configured_source() {
        let store = MemoryStore::new();
        let cache = SettingCache::new();
        let tags = vec!["list-ghost".to_string()];
        let setting = list_settings(&cache, &store, "fallback@example.com", &tags)
            .await
            .unwrap();
        assert!(setting.is_fallback());
        assert_eq!(
            setting.value().source_email.as_deref(),
            Some("fallback@example.com")
        );
    }
}
