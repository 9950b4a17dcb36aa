// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event notifications
//!
//! Ports, client ports and servers report what they do through [`Signals`].
//! Observers are plain closures, called synchronously on the polling thread
//! in the order they were connected.

use std::{cell::RefCell, rc::Rc};

use crate::StatusCode;

/// Kind of an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Opened,
    Closed,
    Tx,
    Rx,
    Error,
    NewConnection,
    CloseConnection,
}

/// A notification, borrowed from the emitter for the duration of the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event<'a> {
    Opened {
        source: &'a str,
    },
    Closed {
        source: &'a str,
    },
    /// Bytes written to the wire
    Tx {
        source: &'a str,
        bytes: &'a [u8],
    },
    /// Bytes read from the wire
    Rx {
        source: &'a str,
        bytes: &'a [u8],
    },
    Error {
        source: &'a str,
        status: StatusCode,
        text: &'a str,
    },
    NewConnection {
        source: &'a str,
    },
    CloseConnection {
        source: &'a str,
    },
}

impl Event<'_> {
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Opened { .. } => EventKind::Opened,
            Self::Closed { .. } => EventKind::Closed,
            Self::Tx { .. } => EventKind::Tx,
            Self::Rx { .. } => EventKind::Rx,
            Self::Error { .. } => EventKind::Error,
            Self::NewConnection { .. } => EventKind::NewConnection,
            Self::CloseConnection { .. } => EventKind::CloseConnection,
        }
    }

    /// Name of the object that emitted the event.
    #[must_use]
    pub const fn source(&self) -> &str {
        match self {
            Self::Opened { source }
            | Self::Closed { source }
            | Self::Tx { source, .. }
            | Self::Rx { source, .. }
            | Self::Error { source, .. }
            | Self::NewConnection { source }
            | Self::CloseConnection { source } => *source,
        }
    }
}

/// Handle returned by [`Signals::connect`], used to disconnect again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Callback = Rc<dyn Fn(&Event<'_>)>;

struct Observer {
    id: ObserverId,
    kind: Option<EventKind>,
    callback: Callback,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    observers: Vec<Observer>,
}

/// Observer registry.
///
/// Cloning a `Signals` yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct Signals {
    registry: Rc<RefCell<Registry>>,
}

impl Signals {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `callback` for every event of `kind`.
    pub fn connect<F>(&self, kind: EventKind, callback: F) -> ObserverId
    where
        F: Fn(&Event<'_>) + 'static,
    {
        self.add(Some(kind), Rc::new(callback))
    }

    /// Call `callback` for every event.
    pub fn connect_all<F>(&self, callback: F) -> ObserverId
    where
        F: Fn(&Event<'_>) + 'static,
    {
        self.add(None, Rc::new(callback))
    }

    /// Remove an observer. Returns `false` if it was not connected.
    pub fn disconnect(&self, id: ObserverId) -> bool {
        let mut registry = self.registry.borrow_mut();
        let len = registry.observers.len();
        registry.observers.retain(|o| o.id != id);
        registry.observers.len() != len
    }

    /// Deliver `event` to all matching observers in connection order.
    pub fn emit(&self, event: &Event<'_>) {
        // Observers may connect or disconnect while being called.
        let callbacks: Vec<Callback> = self
            .registry
            .borrow()
            .observers
            .iter()
            .filter(|o| o.kind.is_none_or(|kind| kind == event.kind()))
            .map(|o| Rc::clone(&o.callback))
            .collect();
        for callback in callbacks {
            callback(event);
        }
    }

    fn add(&self, kind: Option<EventKind>, callback: Callback) -> ObserverId {
        let mut registry = self.registry.borrow_mut();
        let id = ObserverId(registry.next_id);
        registry.next_id += 1;
        registry.observers.push(Observer { id, kind, callback });
        id
    }
}

impl std::fmt::Debug for Signals {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signals")
            .field("observers", &self.registry.borrow().observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deliver_in_registration_order() {
        let signals = Signals::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for n in 0..3 {
            let log = Rc::clone(&log);
            signals.connect(EventKind::Opened, move |_| log.borrow_mut().push(n));
        }
        signals.emit(&Event::Opened { source: "port" });
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn filter_by_kind() {
        let signals = Signals::new();
        let rx = Rc::new(RefCell::new(Vec::<Vec<u8>>::new()));
        let all = Rc::new(RefCell::new(0));
        {
            let rx = Rc::clone(&rx);
            signals.connect(EventKind::Rx, move |event| {
                if let Event::Rx { bytes, .. } = event {
                    rx.borrow_mut().push(bytes.to_vec());
                }
            });
        }
        {
            let all = Rc::clone(&all);
            signals.connect_all(move |_| *all.borrow_mut() += 1);
        }
        signals.emit(&Event::Tx {
            source: "port",
            bytes: &[1, 2],
        });
        signals.emit(&Event::Rx {
            source: "port",
            bytes: &[3, 4],
        });
        assert_eq!(*rx.borrow(), vec![vec![3, 4]]);
        assert_eq!(*all.borrow(), 2);
    }

    #[test]
    fn clones_share_observers() {
        let signals = Signals::new();
        let count = Rc::new(RefCell::new(0));
        let id = {
            let count = Rc::clone(&count);
            signals.connect(EventKind::Closed, move |_| *count.borrow_mut() += 1)
        };
        let other = signals.clone();
        other.emit(&Event::Closed { source: "x" });
        assert_eq!(*count.borrow(), 1);
        assert!(other.disconnect(id));
        assert!(!signals.disconnect(id));
        signals.emit(&Event::Closed { source: "x" });
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn event_source_and_kind() {
        let event = Event::Error {
            source: "client",
            status: StatusCode::BAD_CRC,
            text: "Wrong CRC",
        };
        assert_eq!(event.source(), "client");
        assert_eq!(event.kind(), EventKind::Error);
    }
}
