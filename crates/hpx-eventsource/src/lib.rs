//! # hpx-eventsource
//!
//! An `EventSource` client for `text/event-stream` (Server-Sent Events).
//!
//! A source keeps one stream open through a pluggable [`Transport`], parses
//! it incrementally, and delivers events to listeners registered per event
//! type. Whenever the stream ends or fails it reports an `error`, waits the
//! reconnection time (3 s unless the server sends `retry`) and reconnects with
//! `Last-Event-ID`, until it is closed.
//!
//! ## Features
//!
//! - **Incremental parsing**: chunk boundaries anywhere, mixed `\r`, `\n` and
//!   `\r\n` line endings, BOM and invalid UTF-8 tolerated
//! - **Automatic reconnection**: server-controlled delay, resumption by id
//! - **Ordered listeners**: per type, deduplicated, isolated from each other's
//!   panics and errors
//! - **Pluggable transport**: [`HttpTransport`] over `reqwest` behind the
//!   default `http` feature, or any [`Transport`] implementation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hpx_eventsource::{EventListener, EventSource, EventSourceConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut source = EventSource::builder(EventSourceConfig::new("https://example.com/events"))?
//!         .on_message(EventListener::new(|event| {
//!             println!("{}", event.data().unwrap_or_default());
//!         }))
//!         .connect()?;
//!
//!     source.closed().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod parse;
mod reconnect;
pub mod transport;

#[cfg(feature = "http")]
pub mod http;

// Re-export commonly used types
pub use config::{DEFAULT_RECONNECTION_TIME, EmptyIdPolicy, EventSourceConfig};
pub use connection::{EventSource, EventSourceBuilder, EventSourceHandle};
pub use dispatch::EventListener;
pub use error::{EventSourceError, EventSourceResult, ListenerError, TransportError};
pub use event::{Event, MessageEvent, ReadyState};
#[cfg(feature = "http")]
pub use self::http::HttpTransport;
pub use transport::{ByteStream, LAST_EVENT_ID, OpenRequest, Transport};
