#[derive(Debug, Clone)]
pub struct Config {
    /// Default source address when neither the template nor a list supplies
    /// one.
    pub source_email: String,
    /// Source used for a list whose settings record is missing.
    pub fallback_source_email: String,
    /// Unsubscribe link template with `{{subscriberId}}` and `{{email}}`
    /// placeholders; templates may override it per send.
    pub unsubscribe_link: String,
    pub poll_interval_ms: u64,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let source_email = env_required("CAMPAIGNER_SOURCE_EMAIL")?;
        let fallback_source_email = env_or("CAMPAIGNER_FALLBACK_SOURCE_EMAIL", &source_email);
        let unsubscribe_link = env_required("CAMPAIGNER_UNSUBSCRIBE_LINK")?;

        let poll_interval_ms: u64 = env_or("CAMPAIGNER_POLL_INTERVAL_MS", "1000")
            .parse()
            .map_err(|e| format!("Invalid CAMPAIGNER_POLL_INTERVAL_MS: {e}"))?;

        let log_level = env_or("CAMPAIGNER_LOG_LEVEL", "info");

        Ok(Config {
            source_email,
            fallback_source_email,
            unsubscribe_link,
            poll_interval_ms,
            log_level,
        })
    }
}

fn env_required(key: &str) -> Result<String, String> {
    std::env::var(key).map_err(|_| format!("Missing required environment variable: {key}"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
