use serde::{Deserialize, Serialize};

/// Denormalized subscriber snapshot attached to queue items before sending.
/// Extra profile fields are kept as-is so provider-side template rendering
/// can reference them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Subscriber {
    pub subscriber_id: String,
    pub email: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub unsubscribed: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Subscriber {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}
