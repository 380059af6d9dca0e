//! Values handed to listeners.

use std::{fmt, sync::Arc};

use bytes_utils::Str;

use crate::error::TransportError;

/// Connection lifecycle phase, with the numeric values of the web API.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReadyState {
    /// Opening, or waiting to reopen after an interruption.
    Connecting = 0,
    /// Receiving events.
    Open = 1,
    /// Closed for good.
    Closed = 2,
}

impl ReadyState {
    /// Numeric value (`0`, `1` or `2`).
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            _ => Self::Closed,
        }
    }

    /// Returns `true` in the terminal state.
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Open => write!(f, "OPEN"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

/// An event received from the server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageEvent {
    event_type: Str,
    data: Str,
    last_event_id: Str,
    origin: Arc<str>,
}

impl MessageEvent {
    /// Create a message event.
    pub fn new(event_type: Str, data: Str, last_event_id: Str, origin: Arc<str>) -> Self {
        Self {
            event_type,
            data,
            last_event_id,
            origin,
        }
    }

    /// Event type, `"message"` unless the server named it.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Data payload.
    pub fn data(&self) -> &str {
        &self.data
    }

    /// The source's last event id at the time this event was dispatched.
    pub fn last_event_id(&self) -> &str {
        &self.last_event_id
    }

    /// Origin of the event stream URL, e.g. `https://example.com:8443`.
    pub fn origin(&self) -> &str {
        &self.origin
    }
}

/// Everything a listener can receive.
#[derive(Clone, Debug)]
pub enum Event {
    /// The connection was opened (or reopened).
    Open,
    /// The connection was interrupted or could not be opened. A reconnection
    /// is scheduled unless the source has been closed.
    Error(Arc<TransportError>),
    /// A server-sent event.
    Message(MessageEvent),
}

impl Event {
    /// Event type used to select listeners.
    pub fn event_type(&self) -> &str {
        match self {
            Self::Open => "open",
            Self::Error(_) => "error",
            Self::Message(message) => message.event_type(),
        }
    }

    /// Data payload of server-sent events; `None` for connection notifications.
    pub fn data(&self) -> Option<&str> {
        self.as_message().map(MessageEvent::data)
    }

    /// The server-sent event, if this is one.
    pub fn as_message(&self) -> Option<&MessageEvent> {
        match self {
            Self::Message(message) => Some(message),
            _ => None,
        }
    }

    /// Cause of an `Error` notification.
    pub fn error(&self) -> Option<&TransportError> {
        match self {
            Self::Error(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}
