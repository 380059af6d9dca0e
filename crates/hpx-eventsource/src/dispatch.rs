//! Per-type listener registry.
//!
//! Each event type maps to an ordered list of listeners. Explicitly added
//! listeners and the single-slot `on*` handler live in the same list, so both
//! APIs observe one delivery order.

use std::{
    any::Any,
    collections::HashMap,
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use tracing::warn;

use crate::{error::ListenerError, event::Event};

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

type Callback = dyn Fn(&Event) -> Result<(), ListenerError> + Send + Sync + 'static;

/// A listener handle.
///
/// Identity is per handle: clones compare equal and are de-duplicated when
/// registered twice for the same type, while two handles wrapping identical
/// closures are distinct.
#[derive(Clone)]
pub struct EventListener {
    id: u64,
    callback: Arc<Callback>,
}

impl EventListener {
    /// Wrap an infallible callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        Self::fallible(move |event| {
            callback(event);
            Ok(())
        })
    }

    /// Wrap a callback that may fail. Errors are logged and otherwise ignored.
    pub fn fallible<F>(callback: F) -> Self
    where
        F: Fn(&Event) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        Self {
            id: NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed),
            callback: Arc::new(callback),
        }
    }

    fn call(&self, event: &Event) -> Result<(), ListenerError> {
        (self.callback)(event)
    }
}

impl PartialEq for EventListener {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EventListener {}

impl fmt::Debug for EventListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventListener").field("id", &self.id).finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Slot {
    /// Added with `add_event_listener`.
    Explicit,
    /// The `on*` handler of its type.
    Handler,
}

#[derive(Clone, Debug)]
struct Entry {
    listener: EventListener,
    slot: Slot,
}

/// Ordered multi-listener registry.
#[derive(Debug, Default)]
pub struct Dispatcher {
    listeners: HashMap<String, Vec<Entry>>,
}

impl Dispatcher {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `listener` to the list for `event_type`.
    ///
    /// Returns `false` (and changes nothing) if this handle is already
    /// registered for the type.
    pub fn add_event_listener(&mut self, event_type: &str, listener: &EventListener) -> bool {
        let entries = self.listeners.entry(event_type.to_owned()).or_default();
        if entries
            .iter()
            .any(|entry| entry.slot == Slot::Explicit && entry.listener == *listener)
        {
            return false;
        }
        entries.push(Entry {
            listener: listener.clone(),
            slot: Slot::Explicit,
        });
        true
    }

    /// Remove the first registration of `listener` for `event_type`.
    ///
    /// Returns `false` if it was not registered.
    pub fn remove_event_listener(&mut self, event_type: &str, listener: &EventListener) -> bool {
        let Some(entries) = self.listeners.get_mut(event_type) else {
            return false;
        };
        let Some(pos) = entries
            .iter()
            .position(|entry| entry.slot == Slot::Explicit && entry.listener == *listener)
        else {
            return false;
        };
        entries.remove(pos);
        if entries.is_empty() {
            self.listeners.remove(event_type);
        }
        true
    }

    /// Set or clear the single-slot handler for `event_type`.
    ///
    /// Replacing an existing handler keeps its position in the list; setting
    /// one where none exists appends it; `None` removes it.
    pub fn set_handler(&mut self, event_type: &str, handler: Option<EventListener>) {
        let entries = self.listeners.entry(event_type.to_owned()).or_default();
        let pos = entries.iter().position(|entry| entry.slot == Slot::Handler);

        match (pos, handler) {
            (Some(pos), Some(listener)) => entries[pos].listener = listener,
            (None, Some(listener)) => entries.push(Entry {
                listener,
                slot: Slot::Handler,
            }),
            (Some(pos), None) => {
                entries.remove(pos);
            }
            (None, None) => {}
        }

        if entries.is_empty() {
            self.listeners.remove(event_type);
        }
    }

    /// Current single-slot handler for `event_type`.
    pub fn handler(&self, event_type: &str) -> Option<EventListener> {
        self.listeners.get(event_type).and_then(|entries| {
            entries
                .iter()
                .find(|entry| entry.slot == Slot::Handler)
                .map(|entry| entry.listener.clone())
        })
    }

    /// Drop every listener and handler.
    pub fn clear(&mut self) {
        self.listeners.clear();
    }

    /// Listeners for `event_type`, in delivery order.
    ///
    /// Delivery iterates over this snapshot, so a listener may change the
    /// registry while an event is being dispatched without affecting it.
    pub fn snapshot(&self, event_type: &str) -> Vec<EventListener> {
        self.listeners
            .get(event_type)
            .map(|entries| entries.iter().map(|entry| entry.listener.clone()).collect())
            .unwrap_or_default()
    }
}

/// Invoke `listeners` in order with `event`.
///
/// A listener that panics or returns an error is logged; the remaining
/// listeners still run and nothing propagates to the caller.
pub fn deliver(listeners: &[EventListener], event: &Event) -> usize {
    for listener in listeners {
        match catch_unwind(AssertUnwindSafe(|| listener.call(event))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(
                event_type = %event.event_type(),
                listener = listener.id,
                error = %err,
                "Event listener returned an error"
            ),
            Err(payload) => warn!(
                event_type = %event.event_type(),
                listener = listener.id,
                panic = %panic_message(payload.as_ref()),
                "Event listener panicked"
            ),
        }
    }
    listeners.len()
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic payload>"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use bytes_utils::Str;

    use super::*;
    use crate::event::MessageEvent;

    fn message(event_type: &'static str, data: &'static str) -> Event {
        Event::Message(MessageEvent::new(
            Str::from_static(event_type),
            Str::from_static(data),
            Str::from_static(""),
            Arc::from("http://localhost"),
        ))
    }

    fn dispatch(dispatcher: &Dispatcher, event: &Event) -> usize {
        deliver(&dispatcher.snapshot(event.event_type()), event)
    }

    fn recorder(log: &Arc<Mutex<String>>, tag: &'static str) -> EventListener {
        let log = Arc::clone(log);
        EventListener::new(move |_| log.lock().expect("lock").push_str(tag))
    }

    #[test]
    fn test_delivery_in_registration_order() {
        let log = Arc::new(Mutex::new(String::new()));
        let mut dispatcher = Dispatcher::new();
        dispatcher.add_event_listener("message", &recorder(&log, "1"));
        dispatcher.add_event_listener("message", &recorder(&log, "2"));
        dispatcher.add_event_listener("message", &recorder(&log, "3"));
        dispatcher.add_event_listener("other", &recorder(&log, "x"));

        assert_eq!(dispatch(&dispatcher, &message("message", "a")), 3);
        assert_eq!(*log.lock().expect("lock"), "123");
    }

    #[test]
    fn test_same_handle_registered_once() {
        let log = Arc::new(Mutex::new(String::new()));
        let listener = recorder(&log, "a");
        let mut dispatcher = Dispatcher::new();
        assert!(dispatcher.add_event_listener("message", &listener));
        assert!(!dispatcher.add_event_listener("message", &listener.clone()));
        // A different type is a different registration.
        assert!(dispatcher.add_event_listener("update", &listener));

        dispatch(&dispatcher, &message("message", ""));
        assert_eq!(*log.lock().expect("lock"), "a");
    }

    #[test]
    fn test_remove_event_listener() {
        let log = Arc::new(Mutex::new(String::new()));
        let a = recorder(&log, "a");
        let b = recorder(&log, "b");
        let mut dispatcher = Dispatcher::new();
        dispatcher.add_event_listener("message", &a);
        dispatcher.add_event_listener("message", &b);

        assert!(dispatcher.remove_event_listener("message", &a));
        assert!(!dispatcher.remove_event_listener("message", &a));
        assert!(!dispatcher.remove_event_listener("missing", &a));

        dispatch(&dispatcher, &message("message", ""));
        assert_eq!(*log.lock().expect("lock"), "b");
    }

    #[test]
    fn test_failing_listeners_are_isolated() {
        let log = Arc::new(Mutex::new(String::new()));
        let mut dispatcher = Dispatcher::new();

        let panicking = {
            let log = Arc::clone(&log);
            EventListener::new(move |_| {
                log.lock().expect("lock").push('1');
                panic!("test");
            })
        };
        let failing = {
            let log = Arc::clone(&log);
            EventListener::fallible(move |_| {
                log.lock().expect("lock").push('2');
                Err("listener failed".into())
            })
        };
        dispatcher.add_event_listener("message", &panicking);
        dispatcher.add_event_listener("message", &failing);
        dispatcher.add_event_listener("message", &recorder(&log, "3"));

        assert_eq!(dispatch(&dispatcher, &message("message", "test")), 3);
        assert_eq!(*log.lock().expect("lock"), "123");
    }

    #[test]
    fn test_handler_shares_ordering_with_listeners() {
        let log = Arc::new(Mutex::new(String::new()));
        let mut dispatcher = Dispatcher::new();
        dispatcher.add_event_listener("message", &recorder(&log, "a"));
        dispatcher.set_handler("message", Some(recorder(&log, "h")));
        dispatcher.add_event_listener("message", &recorder(&log, "b"));

        dispatch(&dispatcher, &message("message", ""));
        assert_eq!(*log.lock().expect("lock"), "ahb");

        // Replacing keeps the slot's position.
        log.lock().expect("lock").clear();
        dispatcher.set_handler("message", Some(recorder(&log, "H")));
        dispatch(&dispatcher, &message("message", ""));
        assert_eq!(*log.lock().expect("lock"), "aHb");

        // Clearing then setting again appends.
        log.lock().expect("lock").clear();
        dispatcher.set_handler("message", None);
        assert!(dispatcher.handler("message").is_none());
        dispatcher.set_handler("message", Some(recorder(&log, "h")));
        dispatch(&dispatcher, &message("message", ""));
        assert_eq!(*log.lock().expect("lock"), "abh");
        assert_eq!(dispatcher.snapshot("message").len(), 3);
    }

    #[test]
    fn test_handler_is_not_removed_by_remove_event_listener() {
        let log = Arc::new(Mutex::new(String::new()));
        let handler = recorder(&log, "h");
        let mut dispatcher = Dispatcher::new();
        dispatcher.set_handler("error", Some(handler.clone()));

        assert!(!dispatcher.remove_event_listener("error", &handler));
        assert_eq!(dispatcher.handler("error"), Some(handler));
    }

    #[test]
    fn test_snapshot_is_unaffected_by_later_changes() {
        let log = Arc::new(Mutex::new(String::new()));
        let a = recorder(&log, "a");
        let mut dispatcher = Dispatcher::new();
        dispatcher.add_event_listener("message", &a);

        let snapshot = dispatcher.snapshot("message");
        dispatcher.remove_event_listener("message", &a);
        dispatcher.add_event_listener("message", &recorder(&log, "b"));

        deliver(&snapshot, &message("message", ""));
        assert_eq!(*log.lock().expect("lock"), "a");
    }

    #[test]
    fn test_clear() {
        let log = Arc::new(Mutex::new(String::new()));
        let mut dispatcher = Dispatcher::new();
        dispatcher.add_event_listener("message", &recorder(&log, "a"));
        dispatcher.set_handler("open", Some(recorder(&log, "o")));

        dispatcher.clear();
        assert_eq!(dispatch(&dispatcher, &message("message", "")), 0);
        assert_eq!(dispatch(&dispatcher, &Event::Open), 0);
        assert!(log.lock().expect("lock").is_empty());
    }

    #[test]
    fn test_notifications_route_by_type() {
        let log = Arc::new(Mutex::new(String::new()));
        let mut dispatcher = Dispatcher::new();
        dispatcher.add_event_listener("open", &recorder(&log, "o"));
        dispatcher.add_event_listener("error", &recorder(&log, "e"));

        dispatch(&dispatcher, &Event::Open);
        dispatch(&dispatcher, &Event::Error(Arc::new(
            crate::error::TransportError::StreamEnded,
        )));
        dispatch(&dispatcher, &message("error", "d"));
        assert_eq!(*log.lock().expect("lock"), "oee");
    }
}
