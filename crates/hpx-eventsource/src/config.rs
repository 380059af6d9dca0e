//! Event source configuration.

use std::time::Duration;

/// Default delay before reconnecting, until the server sends `retry`.
pub const DEFAULT_RECONNECTION_TIME: Duration = Duration::from_millis(3000);

/// What an `id` field with an empty value does to the last event id.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EmptyIdPolicy {
    /// `id:` resets the last event id to the empty string, so the next
    /// reconnection carries no `Last-Event-ID` header.
    #[default]
    Clear,
    /// `id:` is treated like an absent field and the last event id is kept.
    Keep,
}

/// Configuration for an [`EventSource`](crate::EventSource).
#[derive(Clone, Debug)]
pub struct EventSourceConfig {
    /// Event stream URL.
    pub url: String,
    /// Whether the transport should include credentials (cookies) in requests.
    pub with_credentials: bool,
    /// Additional HTTP headers to include with every request.
    pub headers: http::HeaderMap,
    /// Initial reconnection delay. A `retry` field replaces it at runtime.
    pub reconnection_time: Duration,
    /// Upper bound for a single attempt to open the stream.
    pub connect_timeout: Duration,
    /// Handling of `id` fields with an empty value.
    pub empty_id_policy: EmptyIdPolicy,
}

impl Default for EventSourceConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            with_credentials: false,
            headers: http::HeaderMap::new(),
            reconnection_time: DEFAULT_RECONNECTION_TIME,
            connect_timeout: Duration::from_secs(10),
            empty_id_policy: EmptyIdPolicy::default(),
        }
    }
}

impl EventSourceConfig {
    /// Create a new configuration with the given URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Include credentials in every request.
    #[must_use]
    pub fn with_credentials(mut self, with_credentials: bool) -> Self {
        self.with_credentials = with_credentials;
        self
    }

    /// Set additional HTTP headers.
    #[must_use]
    pub fn headers(mut self, headers: http::HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Set the initial reconnection delay.
    #[must_use]
    pub fn reconnection_time(mut self, delay: Duration) -> Self {
        self.reconnection_time = delay;
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the empty `id` handling.
    #[must_use]
    pub fn empty_id_policy(mut self, policy: EmptyIdPolicy) -> Self {
        self.empty_id_policy = policy;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error message string if any field has an invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.url.is_empty() {
            return Err("URL cannot be empty".to_string());
        }
        if self.connect_timeout.is_zero() {
            return Err("Connect timeout must be > 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EventSourceConfig::default();
        assert!(config.url.is_empty());
        assert!(!config.with_credentials);
        assert!(config.headers.is_empty());
        assert_eq!(config.reconnection_time, Duration::from_millis(3000));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.empty_id_policy, EmptyIdPolicy::Clear);
    }

    #[test]
    fn test_builder_pattern() {
        let mut headers = http::HeaderMap::new();
        headers.insert("X-Api-Key", "test-key".parse().expect("valid header value"));

        let config = EventSourceConfig::new("https://example.com/events")
            .with_credentials(true)
            .headers(headers)
            .reconnection_time(Duration::from_millis(500))
            .connect_timeout(Duration::from_secs(3))
            .empty_id_policy(EmptyIdPolicy::Keep);

        assert_eq!(config.url, "https://example.com/events");
        assert!(config.with_credentials);
        assert_eq!(
            config
                .headers
                .get("X-Api-Key")
                .map(|v| v.to_str().expect("valid str")),
            Some("test-key")
        );
        assert_eq!(config.reconnection_time, Duration::from_millis(500));
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.empty_id_policy, EmptyIdPolicy::Keep);
    }

    #[test]
    fn test_validation_empty_url() {
        let result = EventSourceConfig::default().validate();
        assert_eq!(result.expect_err("should fail"), "URL cannot be empty");
    }

    #[test]
    fn test_validation_zero_connect_timeout() {
        let result = EventSourceConfig::new("https://example.com")
            .connect_timeout(Duration::ZERO)
            .validate();
        assert_eq!(result.expect_err("should fail"), "Connect timeout must be > 0");
    }

    #[test]
    fn test_validation_zero_reconnection_time_is_allowed() {
        let config = EventSourceConfig::new("https://example.com").reconnection_time(Duration::ZERO);
        assert!(config.validate().is_ok());
    }
}
