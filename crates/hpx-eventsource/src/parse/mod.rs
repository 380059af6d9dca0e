//! `text/event-stream` parsing.
//!
//! Follows the event stream interpretation rules of the
//! [HTML Living Standard](https://html.spec.whatwg.org/multipage/server-sent-events.html),
//! split in two layers:
//!
//! - [`LineParser`] turns arbitrarily chunked bytes into classified [`Line`]s.
//! - [`EventAccumulator`] folds lines into [`Frame`]s.
//!
//! [`EventStream`] wires both over any `Stream` of byte chunks.

pub(crate) mod constants;
pub mod accumulator;
pub mod event_stream;
pub mod line;

pub use accumulator::{EventAccumulator, Frame, ParsedEvent};
pub use event_stream::EventStream;
pub use line::{FieldName, Line, LineParser, Lines};
