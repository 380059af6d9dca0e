//! Event source connection driver.
//!
//! Provides [`EventSource`], [`EventSourceHandle`] and [`EventSourceBuilder`].
//! A background task opens the stream through a [`Transport`], parses it,
//! dispatches events to listeners and reconnects after every interruption
//! until [`close`](EventSourceHandle::close) is called.

use std::{
    ops::Deref,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
    time::Duration,
};

use bytes_utils::Str;
use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
    config::{EmptyIdPolicy, EventSourceConfig},
    dispatch::{Dispatcher, EventListener, deliver},
    error::{EventSourceError, EventSourceResult, TransportError},
    event::{Event, MessageEvent, ReadyState},
    parse::{EventStream, Frame, ParsedEvent},
    reconnect::ReconnectTimer,
    transport::{ByteStream, OpenRequest, Transport},
};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Connection state visible outside the driver task.
#[derive(Debug)]
struct Published {
    last_event_id: Str,
    reconnection_time: Duration,
}

#[derive(Debug)]
struct Shared {
    url: Url,
    origin: Arc<str>,
    with_credentials: bool,
    ready_state: AtomicU8,
    published: Mutex<Published>,
    dispatcher: Mutex<Dispatcher>,
    timer: ReconnectTimer,
}

impl Shared {
    fn new(config: &EventSourceConfig) -> EventSourceResult<Self> {
        config.validate().map_err(EventSourceError::config)?;
        let url = Url::parse(&config.url).map_err(|source| EventSourceError::InvalidUrl {
            url: config.url.clone(),
            source,
        })?;
        let origin = Arc::from(url.origin().ascii_serialization());

        Ok(Self {
            url,
            origin,
            with_credentials: config.with_credentials,
            ready_state: AtomicU8::new(ReadyState::Connecting.as_u8()),
            published: Mutex::new(Published {
                last_event_id: Str::default(),
                reconnection_time: config.reconnection_time,
            }),
            dispatcher: Mutex::new(Dispatcher::new()),
            timer: ReconnectTimer::new(),
        })
    }

    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.ready_state.load(Ordering::Acquire))
    }

    fn is_closed(&self) -> bool {
        self.ready_state().is_closed()
    }

    /// Move to `to` unless already closed. Returns `false` if closed.
    fn transition(&self, to: ReadyState) -> bool {
        self.ready_state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (!ReadyState::from_u8(current).is_closed()).then_some(to.as_u8())
            })
            .is_ok()
    }

    fn close(&self) {
        let previous = self
            .ready_state
            .swap(ReadyState::Closed.as_u8(), Ordering::AcqRel);
        self.timer.cancel();
        if !ReadyState::from_u8(previous).is_closed() {
            // Listeners may hold handles to this source.
            self.dispatcher.lock().clear();
            info!(url = %self.url, "Event source closed");
        }
    }

    fn last_event_id(&self) -> Str {
        self.published.lock().last_event_id.clone()
    }

    fn reconnection_time(&self) -> Duration {
        self.published.lock().reconnection_time
    }

    fn set_reconnection_time(&self, delay: Duration) {
        self.published.lock().reconnection_time = delay;
        debug!(
            url = %self.url,
            delay_ms = delay.as_millis() as u64,
            "Reconnection time updated"
        );
    }

    /// Apply the event's id to the connection and stamp it.
    fn publish(&self, parsed: ParsedEvent, policy: EmptyIdPolicy) -> MessageEvent {
        let mut published = self.published.lock();
        if let Some(id) = parsed.id
            && !(id.is_empty() && policy == EmptyIdPolicy::Keep)
        {
            published.last_event_id = id;
        }
        MessageEvent::new(
            parsed.event_type,
            parsed.data,
            published.last_event_id.clone(),
            Arc::clone(&self.origin),
        )
    }

    /// Deliver `event` to a snapshot of its listeners. No locks are held while
    /// listeners run.
    fn dispatch(&self, event: &Event) {
        if self.is_closed() {
            return;
        }
        let listeners = self.dispatcher.lock().snapshot(event.event_type());
        deliver(&listeners, event);
    }
}

// ---------------------------------------------------------------------------
// Public API: EventSourceBuilder
// ---------------------------------------------------------------------------

/// Registers listeners and picks a transport before the connection starts.
///
/// Listeners added here are in place before the first attempt is made, so no
/// `open` notification can be missed.
pub struct EventSourceBuilder {
    config: EventSourceConfig,
    shared: Arc<Shared>,
    transport: Option<Arc<dyn Transport>>,
}

impl EventSourceBuilder {
    /// Use `transport` instead of the default HTTP transport.
    #[must_use]
    pub fn transport<T: Transport>(mut self, transport: T) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Register a listener for `event_type`.
    #[must_use]
    pub fn add_event_listener(self, event_type: &str, listener: &EventListener) -> Self {
        self.shared
            .dispatcher
            .lock()
            .add_event_listener(event_type, listener);
        self
    }

    /// Set the `open` handler.
    #[must_use]
    pub fn on_open(self, handler: EventListener) -> Self {
        self.handle().set_onopen(Some(handler));
        self
    }

    /// Set the `message` handler.
    #[must_use]
    pub fn on_message(self, handler: EventListener) -> Self {
        self.handle().set_onmessage(Some(handler));
        self
    }

    /// Set the `error` handler.
    #[must_use]
    pub fn on_error(self, handler: EventListener) -> Self {
        self.handle().set_onerror(Some(handler));
        self
    }

    /// A handle to the source being built, e.g. for listeners that close it.
    pub fn handle(&self) -> EventSourceHandle {
        EventSourceHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Start the connection on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if called outside a tokio runtime, or if no transport
    /// was given and the default one cannot be created.
    pub fn connect(self) -> EventSourceResult<EventSource> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| EventSourceError::NoRuntime)?;
        let transport = match self.transport {
            Some(transport) => transport,
            None => default_transport()?,
        };

        let config = Arc::new(self.config);
        let driver = runtime.spawn(event_source_driver(
            Arc::clone(&self.shared),
            transport,
            config,
        ));

        Ok(EventSource {
            handle: EventSourceHandle {
                shared: self.shared,
            },
            driver: Some(driver),
        })
    }
}

#[cfg(feature = "http")]
fn default_transport() -> EventSourceResult<Arc<dyn Transport>> {
    Ok(Arc::new(crate::http::HttpTransport::new()?))
}

#[cfg(not(feature = "http"))]
fn default_transport() -> EventSourceResult<Arc<dyn Transport>> {
    Err(EventSourceError::config(
        "No transport configured and the `http` feature is disabled",
    ))
}

// ---------------------------------------------------------------------------
// Public API: EventSource
// ---------------------------------------------------------------------------

/// A connection to a server-sent event stream.
///
/// Dereferences to its [`EventSourceHandle`]. Dropping the `EventSource`
/// closes it; clone a handle first to keep it running elsewhere.
pub struct EventSource {
    handle: EventSourceHandle,
    driver: Option<JoinHandle<()>>,
}

impl EventSource {
    /// Start configuring an event source.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the URL cannot be
    /// parsed.
    pub fn builder(config: EventSourceConfig) -> EventSourceResult<EventSourceBuilder> {
        let shared = Arc::new(Shared::new(&config)?);
        Ok(EventSourceBuilder {
            config,
            shared,
            transport: None,
        })
    }

    /// Connect with the default HTTP transport and no listeners.
    ///
    /// # Errors
    ///
    /// See [`EventSource::builder`] and [`EventSourceBuilder::connect`].
    pub fn connect(config: EventSourceConfig) -> EventSourceResult<Self> {
        Self::builder(config)?.connect()
    }

    /// Get a clone-able handle.
    pub fn handle(&self) -> EventSourceHandle {
        self.handle.clone()
    }

    /// Wait until the source is closed and its task has finished.
    pub async fn closed(&mut self) {
        if let Some(driver) = self.driver.take()
            && let Err(err) = driver.await
        {
            error!(url = %self.handle.url(), error = %err, "Event source task failed");
        }
    }
}

impl Deref for EventSource {
    type Target = EventSourceHandle;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl Drop for EventSource {
    fn drop(&mut self) {
        self.handle.close();
    }
}

impl std::fmt::Debug for EventSourceBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSourceBuilder")
            .field("url", &self.shared.url.as_str())
            .field("custom_transport", &self.transport.is_some())
            .finish()
    }
}

impl std::fmt::Debug for EventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSource")
            .field("url", &self.handle.url().as_str())
            .field("ready_state", &self.handle.ready_state())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// EventSourceHandle
// ---------------------------------------------------------------------------

/// Clone-able handle for inspecting and controlling an event source.
///
/// Every method may be called from any thread, including from inside a
/// listener.
#[derive(Clone, Debug)]
pub struct EventSourceHandle {
    shared: Arc<Shared>,
}

impl EventSourceHandle {
    /// Current lifecycle phase.
    pub fn ready_state(&self) -> ReadyState {
        self.shared.ready_state()
    }

    /// Event stream URL.
    pub fn url(&self) -> &Url {
        &self.shared.url
    }

    /// Whether requests include credentials.
    pub fn with_credentials(&self) -> bool {
        self.shared.with_credentials
    }

    /// Id sent as `Last-Event-ID` on the next connection attempt. Empty if
    /// none.
    pub fn last_event_id(&self) -> Str {
        self.shared.last_event_id()
    }

    /// Delay before the next connection attempt.
    pub fn reconnection_time(&self) -> Duration {
        self.shared.reconnection_time()
    }

    /// Close the source for good.
    ///
    /// Aborts the current connection attempt or stream and cancels any pending
    /// reconnection. No event is dispatched afterwards, apart from the
    /// remaining listeners of an event already being delivered. Calling it
    /// again does nothing.
    pub fn close(&self) {
        self.shared.close();
    }

    /// Register `listener` for `event_type`.
    ///
    /// Returns `false` if it is already registered for that type, or if the
    /// source is closed.
    pub fn add_event_listener(&self, event_type: &str, listener: &EventListener) -> bool {
        if self.shared.is_closed() {
            return false;
        }
        self.shared
            .dispatcher
            .lock()
            .add_event_listener(event_type, listener)
    }

    /// Unregister `listener` from `event_type`. Returns `false` if it was not
    /// registered.
    pub fn remove_event_listener(&self, event_type: &str, listener: &EventListener) -> bool {
        self.shared
            .dispatcher
            .lock()
            .remove_event_listener(event_type, listener)
    }

    /// Set or clear the `open` handler.
    pub fn set_onopen(&self, handler: Option<EventListener>) {
        self.set_handler("open", handler);
    }

    /// Set or clear the `message` handler.
    pub fn set_onmessage(&self, handler: Option<EventListener>) {
        self.set_handler("message", handler);
    }

    /// Set or clear the `error` handler.
    pub fn set_onerror(&self, handler: Option<EventListener>) {
        self.set_handler("error", handler);
    }

    /// Current `open` handler.
    pub fn onopen(&self) -> Option<EventListener> {
        self.shared.dispatcher.lock().handler("open")
    }

    /// Current `message` handler.
    pub fn onmessage(&self) -> Option<EventListener> {
        self.shared.dispatcher.lock().handler("message")
    }

    /// Current `error` handler.
    pub fn onerror(&self) -> Option<EventListener> {
        self.shared.dispatcher.lock().handler("error")
    }

    fn set_handler(&self, event_type: &str, handler: Option<EventListener>) {
        if handler.is_some() && self.shared.is_closed() {
            return;
        }
        self.shared.dispatcher.lock().set_handler(event_type, handler);
    }
}

// ---------------------------------------------------------------------------
// Internal: background driver
// ---------------------------------------------------------------------------

/// The long-lived task that drives one event source.
///
/// It opens the stream, dispatches what it reads, and after every failure
/// reports an `error`, waits the reconnection time and tries again. Only
/// `close` ends it.
async fn event_source_driver(
    shared: Arc<Shared>,
    transport: Arc<dyn Transport>,
    config: Arc<EventSourceConfig>,
) {
    let mut attempt: u32 = 0;

    loop {
        // --- Open ---
        let last_event_id = shared.last_event_id();
        let request = OpenRequest::new(
            shared.url.clone(),
            &config.headers,
            &last_event_id,
            shared.with_credentials,
        );
        info!(
            url = %shared.url,
            attempt,
            id = %last_event_id,
            "Event source connecting"
        );

        let opened = tokio::select! {
            biased;

            _ = shared.timer.cancelled() => break,

            result = tokio::time::timeout(config.connect_timeout, transport.open(&request)) => {
                result.unwrap_or_else(|_| Err(TransportError::timeout(config.connect_timeout)))
            }
        };

        let err = match opened {
            Ok(stream) => {
                if !shared.transition(ReadyState::Open) {
                    break;
                }
                info!(url = %shared.url, "Event source open");
                attempt = 0;
                shared.dispatch(&Event::Open);

                // --- Event loop ---
                match read_stream(&shared, &config, stream).await {
                    Some(err) => err,
                    None => break,
                }
            }
            Err(err) => err,
        };

        // --- Reconnect ---
        if !shared.transition(ReadyState::Connecting) {
            break;
        }
        attempt = attempt.saturating_add(1);
        let delay = shared.reconnection_time();
        warn!(
            url = %shared.url,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Event source connection lost, reconnecting"
        );
        shared.dispatch(&Event::Error(Arc::new(err)));

        if !shared.timer.wait(delay).await {
            break;
        }
    }

    debug!(url = %shared.url, "Event source task finished");
}

/// Read one opened stream to its end.
///
/// Returns the reason the stream stopped, or `None` if the source was closed.
/// The stream is dropped on return.
async fn read_stream(
    shared: &Shared,
    config: &EventSourceConfig,
    stream: ByteStream,
) -> Option<TransportError> {
    let mut frames = EventStream::new(stream);

    loop {
        if shared.is_closed() {
            return None;
        }

        let item = tokio::select! {
            biased;

            _ = shared.timer.cancelled() => return None,

            item = frames.next() => item,
        };

        match item {
            Some(Ok(Frame::Retry(delay))) => shared.set_reconnection_time(delay),
            Some(Ok(Frame::Event(parsed))) => {
                let event = shared.publish(parsed, config.empty_id_policy);
                debug!(
                    event_type = %event.event_type(),
                    id = %event.last_event_id(),
                    "Event source event received",
                );
                shared.dispatch(&Event::Message(event));
            }
            Some(Err(err)) => {
                debug!(url = %shared.url, error = %err, "Event stream failed");
                return Some(err);
            }
            None => return Some(TransportError::StreamEnded),
        }
    }
}
