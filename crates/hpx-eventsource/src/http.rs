//! [`Transport`] over `reqwest`.

use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt};
use http::{StatusCode, header};
use tracing::debug;

use crate::{
    error::TransportError,
    transport::{ByteStream, OpenRequest, Transport},
};

/// Opens event streams with `GET` requests.
///
/// Requests with credentials go through a client with a cookie store, so
/// cookies set by the server are sent back on reconnection. Only `200 OK`
/// responses with a `text/event-stream` content type are accepted.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    credentialed: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport with default clients.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be initialised.
    pub fn new() -> Result<Self, TransportError> {
        Ok(Self {
            client: reqwest::Client::builder().build()?,
            credentialed: reqwest::Client::builder().cookie_store(true).build()?,
        })
    }

    /// Build a transport from preconfigured clients (proxies, TLS roots, ...).
    pub fn from_clients(client: reqwest::Client, credentialed: reqwest::Client) -> Self {
        Self {
            client,
            credentialed,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, request: &OpenRequest) -> Result<ByteStream, TransportError> {
        let client = if request.with_credentials() {
            &self.credentialed
        } else {
            &self.client
        };

        let resp = client
            .get(request.url().clone())
            .headers(request.headers().clone())
            .send()
            .await?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(TransportError::invalid_status(status));
        }

        let content_type = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");
        if !is_event_stream(content_type) {
            return Err(TransportError::invalid_content_type(content_type));
        }

        debug!(url = %request.url(), "Event stream response accepted");
        Ok(resp.bytes_stream().map_err(TransportError::from).boxed())
    }
}

/// `true` for `text/event-stream`, ignoring case and parameters.
fn is_event_stream(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(str::trim)
        .is_some_and(|essence| essence.eq_ignore_ascii_case("text/event-stream"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_event_stream() {
        assert!(is_event_stream("text/event-stream"));
        assert!(is_event_stream("Text/Event-Stream; charset=utf-8"));
        assert!(!is_event_stream("application/json"));
        assert!(!is_event_stream(""));
        assert!(!is_event_stream("text/event-streams"));
    }
}
