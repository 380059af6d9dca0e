//! Folds classified lines into completed events.

use core::time::Duration;

use bytes::BytesMut;
use bytes_utils::{Str, StrMut};

use super::{
    constants::{EMPTY_STR, MESSAGE_STR},
    line::{FieldName, Line},
};

/// An event closed by a blank line, before it is stamped with connection
/// state (last event id, origin).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEvent {
    /// Event type, `"message"` unless an `event` field said otherwise.
    pub event_type: Str,
    /// `data` lines joined with `"\n"`.
    pub data: Str,
    /// Value of the last accepted `id` field, if the event carried one.
    pub id: Option<Str>,
}

/// Output of the accumulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A valid `retry` field. Takes effect whether or not the surrounding
    /// event is ever dispatched.
    Retry(Duration),
    /// A complete event.
    Event(ParsedEvent),
}

/// Data buffer for the pending event.
///
/// The common case is a single `data:` line per event, so the first value is
/// kept as an immutable [`Str`] and only upgraded to a mutable buffer when a
/// second `data:` line arrives.
#[derive(Debug, Default, Clone)]
enum DataBuffer {
    #[default]
    Uninit,
    Immutable(Str),
    Mutable(StrMut),
}

impl DataBuffer {
    fn freeze(self) -> Str {
        match self {
            Self::Uninit => EMPTY_STR,
            Self::Immutable(s) => s,
            Self::Mutable(s) => s.freeze(),
        }
    }

    fn push_str(&mut self, s: Str) {
        match self {
            Self::Uninit => *self = Self::Immutable(s),
            Self::Immutable(first) => {
                let inner = BytesMut::with_capacity(first.len() + 1 + s.len());
                // Safety: the buffer is empty, there are no bytes to be invalid.
                let mut buf = unsafe { StrMut::from_inner_unchecked(inner) };
                buf.push_str(first);
                buf.push('\n');
                buf.push_str(&s);
                *self = Self::Mutable(buf);
            }
            Self::Mutable(buf) => {
                buf.push('\n');
                buf.push_str(&s);
            }
        }
    }
}

/// Pending-event state machine.
///
/// Feed it [`Line`]s with [`accept`](Self::accept). A blank line closes the
/// pending event if at least one known field (`data`, `event`, `id` or
/// `retry`) was accepted since the last dispatch, and is a no-op otherwise.
#[derive(Debug, Clone)]
pub struct EventAccumulator {
    event_type: Str,
    data: DataBuffer,
    id: Option<Str>,
    has_fields: bool,
}

impl Default for EventAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl EventAccumulator {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self {
            event_type: EMPTY_STR,
            data: DataBuffer::Uninit,
            id: None,
            has_fields: false,
        }
    }

    /// Drop the pending event without dispatching it.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Apply one line.
    pub fn accept(&mut self, line: Line) -> Option<Frame> {
        match line {
            Line::Blank => {
                if !self.has_fields {
                    return None;
                }
                Some(Frame::Event(self.take_event()))
            }
            Line::Comment => None,
            Line::Field { name, value } => self.accept_field(name, value),
        }
    }

    fn accept_field(&mut self, name: FieldName, value: Str) -> Option<Frame> {
        match name {
            FieldName::Data => {
                self.data.push_str(value);
                self.has_fields = true;
                None
            }
            FieldName::Event => {
                self.event_type = value;
                self.has_fields = true;
                None
            }
            FieldName::Id => {
                if memchr::memchr(0, value.as_bytes()).is_none() {
                    self.id = Some(value);
                    self.has_fields = true;
                }
                None
            }
            FieldName::Retry => {
                let millis = parse_retry(&value)?;
                self.has_fields = true;
                Some(Frame::Retry(Duration::from_millis(millis)))
            }
            FieldName::Ignored => None,
        }
    }

    fn take_event(&mut self) -> ParsedEvent {
        let Self {
            event_type,
            data,
            id,
            ..
        } = core::mem::take(self);

        ParsedEvent {
            event_type: if event_type.is_empty() {
                MESSAGE_STR
            } else {
                event_type
            },
            data: data.freeze(),
            id,
        }
    }
}

/// Milliseconds from an all-digit `retry` value; saturates past `u64::MAX`.
fn parse_retry(value: &str) -> Option<u64> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(value.parse().unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(value: &'static str) -> Line {
        Line::Field {
            name: FieldName::Data,
            value: Str::from_static(value),
        }
    }

    fn field(name: FieldName, value: &'static str) -> Line {
        Line::Field {
            name,
            value: Str::from_static(value),
        }
    }

    fn expect_event(frame: Option<Frame>) -> ParsedEvent {
        match frame {
            Some(Frame::Event(event)) => event,
            other => panic!("expected event, got {other:?}"),
        }
    }

    #[test]
    fn test_data_lines_are_joined_without_trailing_newline() {
        let mut acc = EventAccumulator::new();
        assert!(acc.accept(data("a")).is_none());
        assert!(acc.accept(data("b")).is_none());
        let event = expect_event(acc.accept(Line::Blank));
        assert_eq!(event.data, "a\nb");
        assert_eq!(event.event_type, "message");
        assert!(event.id.is_none());
        assert!(!acc.has_fields);
    }

    #[test]
    fn test_blank_line_without_fields_is_noop() {
        let mut acc = EventAccumulator::new();
        assert!(acc.accept(Line::Blank).is_none());
        assert!(acc.accept(Line::Comment).is_none());
        assert!(acc.accept(field(FieldName::Ignored, "")).is_none());
        assert!(acc.accept(Line::Blank).is_none());
    }

    #[test]
    fn test_empty_data_field_dispatches_empty_string() {
        let mut acc = EventAccumulator::new();
        acc.accept(data(""));
        let event = expect_event(acc.accept(Line::Blank));
        assert_eq!(event.data, "");

        acc.accept(data(""));
        acc.accept(data(""));
        let event = expect_event(acc.accept(Line::Blank));
        assert_eq!(event.data, "\n");
    }

    #[test]
    fn test_event_type_last_wins_and_empty_means_message() {
        let mut acc = EventAccumulator::new();
        acc.accept(field(FieldName::Event, "add"));
        acc.accept(field(FieldName::Event, "remove"));
        acc.accept(data("1"));
        assert_eq!(expect_event(acc.accept(Line::Blank)).event_type, "remove");

        acc.accept(field(FieldName::Event, ""));
        acc.accept(data("2"));
        assert_eq!(expect_event(acc.accept(Line::Blank)).event_type, "message");
    }

    #[test]
    fn test_fields_without_data_still_dispatch() {
        let mut acc = EventAccumulator::new();
        acc.accept(field(FieldName::Id, "7"));
        let event = expect_event(acc.accept(Line::Blank));
        assert_eq!(event.data, "");
        assert_eq!(event.id.as_deref(), Some("7"));
    }

    #[test]
    fn test_id_with_null_is_ignored() {
        let mut acc = EventAccumulator::new();
        acc.accept(field(FieldName::Id, "1"));
        acc.accept(field(FieldName::Id, "2\x003"));
        acc.accept(data("x"));
        assert_eq!(expect_event(acc.accept(Line::Blank)).id.as_deref(), Some("1"));

        acc.accept(field(FieldName::Id, "\0"));
        assert!(!acc.has_fields);
        assert!(acc.accept(Line::Blank).is_none());
    }

    #[test]
    fn test_id_does_not_carry_into_next_event() {
        let mut acc = EventAccumulator::new();
        acc.accept(field(FieldName::Id, "1"));
        acc.accept(data("x"));
        expect_event(acc.accept(Line::Blank));

        acc.accept(data("y"));
        assert!(expect_event(acc.accept(Line::Blank)).id.is_none());
    }

    #[test]
    fn test_retry_reported_immediately() {
        let mut acc = EventAccumulator::new();
        assert_eq!(
            acc.accept(field(FieldName::Retry, "800")),
            Some(Frame::Retry(Duration::from_millis(800)))
        );
        assert!(acc.has_fields);
    }

    #[test]
    fn test_invalid_retry_is_ignored() {
        let mut acc = EventAccumulator::new();
        for value in ["", "8s", "-1", " 800", "1.5"] {
            assert!(acc.accept(field(FieldName::Retry, value)).is_none(), "{value:?}");
        }
        assert!(!acc.has_fields);
    }

    #[test]
    fn test_huge_retry_saturates() {
        let mut acc = EventAccumulator::new();
        assert_eq!(
            acc.accept(field(FieldName::Retry, "99999999999999999999999")),
            Some(Frame::Retry(Duration::from_millis(u64::MAX)))
        );
    }

    #[test]
    fn test_reset_discards_pending_event() {
        let mut acc = EventAccumulator::new();
        acc.accept(field(FieldName::Id, "2"));
        acc.accept(data("partial"));
        acc.reset();
        assert!(!acc.has_fields);
        assert!(acc.accept(Line::Blank).is_none());
    }
}
