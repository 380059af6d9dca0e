//! Error types for event sources and their transports.

use std::time::Duration;

use thiserror::Error;

/// Result type returned when building an event source.
pub type EventSourceResult<T> = Result<T, EventSourceError>;

/// Boxed error a fallible listener may return.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures while opening or reading an event stream.
///
/// These never end an event source. They are reported to `error` listeners
/// and followed by a reconnection attempt.
#[derive(Error, Debug)]
pub enum TransportError {
    /// HTTP client errors (wraps reqwest::Error)
    #[cfg(feature = "http")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with something other than `200 OK`.
    #[error("unexpected response status: {status}")]
    InvalidStatus { status: http::StatusCode },

    /// The server answered with a content type other than `text/event-stream`.
    #[error("unexpected content type: {content_type:?}")]
    InvalidContentType { content_type: String },

    /// Opening the stream took longer than the configured connect timeout.
    #[error("connection attempt timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// The server closed the stream.
    #[error("event stream ended")]
    StreamEnded,

    /// Any other transport failure.
    #[error("transport error: {message}")]
    Other { message: String },
}

impl TransportError {
    /// Create a status error.
    pub fn invalid_status(status: http::StatusCode) -> Self {
        Self::InvalidStatus { status }
    }

    /// Create a content type error.
    pub fn invalid_content_type(content_type: impl Into<String>) -> Self {
        Self::InvalidContentType {
            content_type: content_type.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout { duration }
    }

    /// Create a catch-all error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

/// Errors raised while constructing an event source.
#[derive(Error, Debug)]
pub enum EventSourceError {
    /// The URL could not be parsed.
    #[error("invalid URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The default transport could not be created.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// `connect` was called outside of a tokio runtime.
    #[error("no tokio runtime available to drive the event source")]
    NoRuntime,
}

impl EventSourceError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = TransportError::timeout(Duration::from_secs(5));
        assert!(matches!(err, TransportError::Timeout { .. }));

        let err = TransportError::invalid_status(http::StatusCode::NO_CONTENT);
        assert_eq!(err.to_string(), "unexpected response status: 204 No Content");

        let err = EventSourceError::config("URL cannot be empty");
        assert_eq!(err.to_string(), "Configuration error: URL cannot be empty");
    }

    #[test]
    fn test_invalid_url_display() {
        let source = url::Url::parse("not a url").expect_err("should fail");
        let err = EventSourceError::InvalidUrl {
            url: "not a url".to_string(),
            source,
        };
        assert!(err.to_string().starts_with("invalid URL \"not a url\""));
    }
}
