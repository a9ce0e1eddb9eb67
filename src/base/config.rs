//! Load configuration via `config` crate with env-override support.

use std::{ops::Deref, path::Path, sync::Arc, time::Duration};

use serde::Deserialize;

use super::types::Res;

/// Default reaction shown while a turn is in flight.
fn default_processing_reaction() -> String {
    "eyes".to_string()
}

/// Default database endpoint (in-memory).
fn default_db_endpoint() -> String {
    "mem://".to_string()
}

/// Default database namespace.
fn default_db_namespace() -> String {
    "docs_relay".to_string()
}

/// Default database name.
fn default_db_database() -> String {
    "sessions".to_string()
}

/// Configuration for the relay.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub inner: Arc<ConfigInner>,
}

impl Deref for Config {
    type Target = ConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConfigInner {
    /// Slack app token used for the socket mode connection (`SLACK_APP_TOKEN`).
    pub slack_app_token: String,
    /// Slack bot token used for Web API calls (`SLACK_BOT_TOKEN`).
    pub slack_bot_token: String,
    /// Base URL of the documentation assistant API (`ASSISTANT_API_URL`).
    pub assistant_api_url: String,
    /// Bearer credential for the documentation assistant API (`ASSISTANT_API_KEY`).
    pub assistant_api_key: String,
    /// Optional per-request timeout for assistant calls, in seconds (`ASSISTANT_TIMEOUT_SECS`).
    /// Unset means the relay waits as long as the API takes.
    #[serde(default)]
    pub assistant_timeout_secs: Option<u64>,
    /// Base URL relative citation links are resolved against (`DOCS_BASE_URL`).
    pub docs_base_url: String,
    /// Reaction shown on the triggering message while a turn runs (`PROCESSING_REACTION`).
    #[serde(default = "default_processing_reaction")]
    pub processing_reaction: String,
    /// Database endpoint URL (`DB_ENDPOINT`), e.g. `mem://` or `ws://localhost:8000`.
    #[serde(default = "default_db_endpoint")]
    pub db_endpoint: String,
    /// Database username (`DB_USERNAME`).
    #[serde(default)]
    pub db_username: Option<String>,
    /// Database password (`DB_PASSWORD`).
    #[serde(default)]
    pub db_password: Option<String>,
    /// Database namespace (`DB_NAMESPACE`).
    #[serde(default = "default_db_namespace")]
    pub db_namespace: String,
    /// Database name (`DB_DATABASE`).
    #[serde(default = "default_db_database")]
    pub db_database: String,
}

impl ConfigInner {
    /// The assistant request timeout, if one is configured.
    pub fn assistant_timeout(&self) -> Option<Duration> {
        self.assistant_timeout_secs.map(Duration::from_secs)
    }

    /// Root credentials for the database, when both halves are configured.
    pub fn db_credentials(&self) -> Option<(&str, &str)> {
        match (&self.db_username, &self.db_password) {
            (Some(username), Some(password)) => Some((username.as_str(), password.as_str())),
            _ => None,
        }
    }
}

impl Config {
    pub fn load(explicit_path: Option<&Path>) -> Res<Self> {
        let mut cfg = config::Config::builder().add_source(config::Environment::default().prefix("DOCS_RELAY"));

        if let Some(p) = explicit_path {
            cfg = cfg.add_source(config::File::from(p.to_path_buf()));
        } else if Path::new(".hidden/config.toml").exists() {
            cfg = cfg.add_source(config::File::with_name(".hidden/config.toml"));
        }

        Self::from_inner(cfg.build()?.try_deserialize()?)
    }

    /// Validates and normalizes an already-deserialized configuration.
    pub fn from_inner(mut inner: ConfigInner) -> Res<Self> {
        if inner.slack_app_token.trim().is_empty() || inner.slack_bot_token.trim().is_empty() {
            return Err(anyhow::anyhow!("Slack app and bot tokens must be set."));
        }

        if inner.assistant_api_key.trim().is_empty() {
            return Err(anyhow::anyhow!("Assistant API key must be set."));
        }

        if inner.processing_reaction.trim().is_empty() {
            return Err(anyhow::anyhow!("Processing reaction must not be empty."));
        }

        if inner.assistant_timeout_secs == Some(0) {
            return Err(anyhow::anyhow!("Assistant timeout must be at least one second."));
        }

        inner.assistant_api_url = normalize_base_url("assistant_api_url", &inner.assistant_api_url)?;
        inner.docs_base_url = normalize_base_url("docs_base_url", &inner.docs_base_url)?;
        inner.processing_reaction = inner.processing_reaction.trim().trim_matches(':').to_string();

        Ok(Self { inner: Arc::new(inner) })
    }
}

/// Checks that `value` is an absolute http(s) URL and strips trailing slashes.
fn normalize_base_url(name: &str, value: &str) -> Res<String> {
    let value = value.trim().trim_end_matches('/');
    let url = reqwest::Url::parse(value).map_err(|e| anyhow::anyhow!("`{name}` must be an absolute URL: {e}"))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(anyhow::anyhow!("`{name}` must use http or https."));
    }

    Ok(value.to_string())
}

// Tests.

#[cfg(test)]
mod tests {
    use super::*;

    fn inner() -> ConfigInner {
        ConfigInner {
            slack_app_token: "xapp-test".to_string(),
            slack_bot_token: "xoxb-test".to_string(),
            assistant_api_url: "https://assistant.example.com/v1/".to_string(),
            assistant_api_key: "key".to_string(),
            docs_base_url: "https://docs.example.com/".to_string(),
            processing_reaction: ":eyes:".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn trailing_slashes_and_colons_are_normalized() {
        let config = Config::from_inner(inner()).unwrap();

        assert_eq!(config.assistant_api_url, "https://assistant.example.com/v1");
        assert_eq!(config.docs_base_url, "https://docs.example.com");
        assert_eq!(config.processing_reaction, "eyes");
        assert!(config.assistant_timeout().is_none());
    }

    #[test]
    fn relative_base_urls_are_rejected() {
        let mut bad = inner();
        bad.docs_base_url = "docs/path".to_string();

        assert!(Config::from_inner(bad).is_err());
    }

    #[test]
    fn missing_tokens_are_rejected() {
        let mut bad = inner();
        bad.slack_bot_token = "  ".to_string();

        assert!(Config::from_inner(bad).is_err());

        let mut bad = inner();
        bad.assistant_api_key = String::new();

        assert!(Config::from_inner(bad).is_err());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let mut bad = inner();
        bad.assistant_timeout_secs = Some(0);

        assert!(Config::from_inner(bad).is_err());
    }

    #[test]
    fn db_credentials_need_both_halves() {
        let mut config = inner();
        config.db_username = Some("root".to_string());

        assert!(config.db_credentials().is_none());

        config.db_password = Some("secret".to_string());

        assert_eq!(config.db_credentials(), Some(("root", "secret")));
    }
}
