//! Transport abstraction: something that can open a byte stream for a URL.
//!
//! The event source never speaks HTTP itself. It builds an [`OpenRequest`]
//! and asks a [`Transport`] for a [`ByteStream`]. Aborting a stream is
//! dropping it.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use http::{HeaderMap, HeaderName, HeaderValue, header};
use tracing::warn;
use url::Url;

use crate::error::TransportError;

/// `Last-Event-ID` request header.
pub const LAST_EVENT_ID: HeaderName = HeaderName::from_static("last-event-id");

/// Body of an opened event stream.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Everything a transport needs to open one connection attempt.
#[derive(Clone, Debug)]
pub struct OpenRequest {
    url: Url,
    headers: HeaderMap,
    last_event_id: Option<String>,
    with_credentials: bool,
}

impl OpenRequest {
    /// Build a request for `url`.
    ///
    /// `extra` headers are applied first; `Accept`, `Cache-Control` and, when
    /// `last_event_id` is non-empty, `Last-Event-ID` are always set on top.
    pub fn new(url: Url, extra: &HeaderMap, last_event_id: &str, with_credentials: bool) -> Self {
        let mut headers = extra.clone();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/event-stream"),
        );
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        let last_event_id = if last_event_id.is_empty() {
            headers.remove(LAST_EVENT_ID);
            None
        } else {
            match HeaderValue::from_bytes(last_event_id.as_bytes()) {
                Ok(value) => {
                    headers.insert(LAST_EVENT_ID, value);
                }
                Err(_) => {
                    headers.remove(LAST_EVENT_ID);
                    warn!(
                        id = %last_event_id,
                        "Last event id is not a valid header value, not sending it"
                    );
                }
            }
            Some(last_event_id.to_owned())
        };

        Self {
            url,
            headers,
            last_event_id,
            with_credentials,
        }
    }

    /// Target URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Headers to send.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Id the server should resume after, if any.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// Whether credentials (cookies) should be included.
    pub fn with_credentials(&self) -> bool {
        self.with_credentials
    }
}

/// Opens event streams.
///
/// `open` resolves once the response headers have been accepted; the stream
/// then yields body chunks until the server closes it or the connection fails.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a stream for `request`.
    async fn open(&self, request: &OpenRequest) -> Result<ByteStream, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn open(&self, request: &OpenRequest) -> Result<ByteStream, TransportError> {
        (**self).open(request).await
    }
}
