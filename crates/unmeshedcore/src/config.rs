use crate::error::ConfigError;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variables holding the engine URL, in lookup order
const URL_VARS: [&str; 3] = ["UNMESHED_URL", "UNMESHED_ENGINE_URL", "UNMESHED_SERVER_URL"];

/// Connection and polling settings for an Unmeshed client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientConfig {
    pub base_url: String,
    pub port: Option<u16>,
    pub client_id: String,
    pub auth_token: String,
    pub initial_delay_millis: u64,
    pub step_timeout_millis: u64,
    pub work_request_batch_size: u32,
    pub response_submit_batch_size: usize,
    pub max_threads_count: usize,
    pub poll_interval_millis: u64,
    pub enable_results_submission: bool,
    pub connection_timeout_secs: u64,
    pub submit_retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            port: None,
            client_id: String::new(),
            auth_token: String::new(),
            initial_delay_millis: 50,
            step_timeout_millis: 3_600_000,
            work_request_batch_size: 200,
            response_submit_batch_size: 1000,
            max_threads_count: 10,
            poll_interval_millis: 10,
            enable_results_submission: true,
            connection_timeout_secs: 60,
            submit_retry: RetryPolicy::default(),
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from any key lookup (the environment in production)
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = URL_VARS
            .iter()
            .filter_map(|key| lookup(key))
            .find(|value| !value.trim().is_empty())
        {
            config.base_url = url;
        }

        if let Some(port) = lookup("UNMESHED_PORT") {
            match port.trim().parse::<u16>() {
                Ok(port) => config.port = Some(port),
                Err(_) => tracing::warn!("Ignoring invalid UNMESHED_PORT value: {}", port),
            }
        }

        if let Some(client_id) = lookup("UNMESHED_CLIENT_ID") {
            config.client_id = client_id;
        }
        if let Some(token) = lookup("UNMESHED_AUTH_TOKEN") {
            config.auth_token = token;
        }
        if lookup("DISABLE_SUBMIT_CLIENT")
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false)
        {
            config.enable_results_submission = false;
        }

        config
    }

    /// Load a JSON configuration file; missing keys keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: ClientConfig = serde_json::from_str(&raw)?;
        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn with_auth_token(mut self, auth_token: impl Into<String>) -> Self {
        self.auth_token = auth_token.into();
        self
    }

    pub fn with_initial_delay_millis(mut self, millis: u64) -> Self {
        self.initial_delay_millis = millis;
        self
    }

    pub fn with_step_timeout_millis(mut self, millis: u64) -> Self {
        self.step_timeout_millis = millis;
        self
    }

    pub fn with_work_request_batch_size(mut self, size: u32) -> Self {
        self.work_request_batch_size = size;
        self
    }

    pub fn with_response_submit_batch_size(mut self, size: usize) -> Self {
        self.response_submit_batch_size = size;
        self
    }

    pub fn with_max_threads_count(mut self, count: usize) -> Self {
        self.max_threads_count = count;
        self
    }

    pub fn with_poll_interval_millis(mut self, millis: u64) -> Self {
        self.poll_interval_millis = millis;
        self
    }

    pub fn with_enable_results_submission(mut self, enabled: bool) -> Self {
        self.enable_results_submission = enabled;
        self
    }

    pub fn with_connection_timeout_secs(mut self, secs: u64) -> Self {
        self.connection_timeout_secs = secs;
        self
    }

    pub fn with_submit_retry(mut self, policy: RetryPolicy) -> Self {
        self.submit_retry = policy;
        self
    }

    /// Base URL joined with the configured port
    ///
    /// A scheme-less URL is treated as plain http. The port is only appended
    /// when the URL does not already name one.
    pub fn server_url(&self) -> String {
        let trimmed = self.base_url.trim().trim_end_matches('/');
        let url = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            trimmed.to_string()
        } else {
            format!("http://{}", trimmed)
        };

        match self.port {
            Some(port) if !has_explicit_port(&url) => format!("{}:{}", url, port),
            _ => url,
        }
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_millis)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_millis)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_millis)
    }

    /// Check that the configuration can be used to build a client
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Missing("base_url"));
        }
        if self.client_id.trim().is_empty() {
            return Err(ConfigError::Missing("client_id"));
        }
        if self.auth_token.trim().is_empty() {
            return Err(ConfigError::Missing("auth_token"));
        }
        if self.work_request_batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "work_request_batch_size",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.response_submit_batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "response_submit_batch_size",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.max_threads_count == 0 {
            return Err(ConfigError::Invalid {
                field: "max_threads_count",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.step_timeout_millis == 0 {
            return Err(ConfigError::Invalid {
                field: "step_timeout_millis",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.poll_interval_millis == 0 {
            return Err(ConfigError::Invalid {
                field: "poll_interval_millis",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.submit_retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "submit_retry.max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

fn has_explicit_port(url: &str) -> bool {
    let authority = url
        .split("://")
        .nth(1)
        .unwrap_or(url)
        .split('/')
        .next()
        .unwrap_or("");
    // IPv6 literals carry colons inside the brackets
    let host_end = authority.rfind(']').map(|i| i + 1).unwrap_or(0);
    authority[host_end..].contains(':')
}

/// Retry policy for result submission
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 100,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait before the given retry (1 = first retry)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let millis = self.delay_ms as f64 * self.backoff_multiplier.max(1.0).powi(exponent);
        Duration::from_millis(millis.min(u64::MAX as f64) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn valid() -> ClientConfig {
        ClientConfig::new()
            .with_base_url("http://localhost")
            .with_client_id("client")
            .with_auth_token("token")
    }

    #[test]
    fn server_url_appends_port() {
        let config = valid().with_port(8080);
        assert_eq!(config.server_url(), "http://localhost:8080");
    }

    #[test]
    fn server_url_keeps_explicit_port() {
        let config = valid().with_base_url("https://engine.example.com:9443/").with_port(8080);
        assert_eq!(config.server_url(), "https://engine.example.com:9443");
    }

    #[test]
    fn server_url_adds_scheme() {
        let config = valid().with_base_url("engine.local");
        assert_eq!(config.server_url(), "http://engine.local");
    }

    #[test]
    fn env_lookup_prefers_first_url_variable() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("UNMESHED_ENGINE_URL", "http://engine"),
            ("UNMESHED_SERVER_URL", "http://server"),
            ("UNMESHED_PORT", "9090"),
            ("UNMESHED_CLIENT_ID", "id"),
            ("UNMESHED_AUTH_TOKEN", "secret"),
        ]));

        assert_eq!(config.base_url, "http://engine");
        assert_eq!(config.port, Some(9090));
        assert_eq!(config.client_id, "id");
        assert_eq!(config.auth_token, "secret");
        assert!(config.enable_results_submission);
    }

    #[test]
    fn env_lookup_disables_submission_and_ignores_bad_port() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("UNMESHED_URL", "http://engine"),
            ("UNMESHED_PORT", "not-a-port"),
            ("DISABLE_SUBMIT_CLIENT", "TRUE"),
        ]));

        assert_eq!(config.port, None);
        assert!(!config.enable_results_submission);
    }

    #[test]
    fn validate_reports_missing_fields() {
        assert_eq!(
            ClientConfig::new().validate(),
            Err(ConfigError::Missing("base_url"))
        );
        assert_eq!(
            valid().with_client_id(" ").validate(),
            Err(ConfigError::Missing("client_id"))
        );
        assert!(matches!(
            valid().with_work_request_batch_size(0).validate(),
            Err(ConfigError::Invalid { field: "work_request_batch_size", .. })
        ));
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_poll_interval() {
        assert!(matches!(
            valid().with_poll_interval_millis(0).validate(),
            Err(ConfigError::Invalid { field: "poll_interval_millis", .. })
        ));
        assert!(valid().with_poll_interval_millis(1).validate().is_ok());
    }

    #[test]
    fn file_config_keeps_defaults_for_missing_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(
            &mut file,
            br#"{"baseUrl": "http://engine", "clientId": "c", "authToken": "t", "pollIntervalMillis": 250}"#,
        )
        .unwrap();

        let config = ClientConfig::from_file(file.path()).unwrap();
        assert_eq!(config.poll_interval_millis, 250);
        assert_eq!(config.work_request_batch_size, 200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn retry_delay_grows_exponentially() {
        let policy = RetryPolicy {
            max_attempts: 4,
            delay_ms: 100,
            backoff_multiplier: 2.0,
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
    }
}
