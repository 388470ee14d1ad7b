//! Named event subscriptions.
//!
//! An extension declares the events it raises when it builds its [`Handlers`] table, then calls
//! [`Handlers::dispatch`] whenever one of them happens. Anyone holding the table (usually through
//! [`Manager::add_handler`](crate::Manager::add_handler)) can subscribe with [`Handlers::add`],
//! which returns a [`Disposer`] that unsubscribes.
//!
//! Two dispatch modes exist:
//!
//! - **broadcast**: every handler runs in subscription order; the result is `None`.
//! - **early return**: handlers run in order until one returns a value accepted by the event's
//!   predicate; that value is the result.
//!
//! # Example
//!
//! ```rust
//! use quire_core::{EventSpec, Handlers};
//! use serde_json::{Value, json};
//!
//! let handlers = Handlers::new(
//!     "paste",
//!     [EventSpec::early_return("onPaste", |v: &Value| v.as_bool() == Some(true))],
//! );
//! let mut sub = handlers.add("onPaste", |_| Ok(json!(true))).unwrap();
//! assert_eq!(handlers.dispatch("onPaste", &json!("text")).unwrap(), Some(json!(true)));
//! sub.dispose().unwrap();
//! assert_eq!(handlers.dispatch("onPaste", &json!("text")).unwrap(), None);
//! ```

use crate::error::{BoxError, ConfigurationError, HandlerError};
use crate::lifecycle::Disposer;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

/// A subscribed callback.
pub type HandlerCallback = Rc<dyn Fn(&Value) -> Result<Value, BoxError>>;

/// How an event combines its handlers.
#[derive(Clone)]
pub enum DispatchMode {
    /// Run every handler.
    Broadcast,
    /// Stop at the first handler whose result satisfies the predicate.
    EarlyReturn(Rc<dyn Fn(&Value) -> bool>),
}

impl fmt::Debug for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Broadcast => f.write_str("Broadcast"),
            Self::EarlyReturn(_) => f.write_str("EarlyReturn(..)"),
        }
    }
}

/// Declaration of one event.
#[derive(Debug, Clone)]
pub struct EventSpec {
    name: String,
    mode: DispatchMode,
}

impl EventSpec {
    /// An event where every handler runs.
    pub fn broadcast(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: DispatchMode::Broadcast,
        }
    }

    /// An event that stops at the first accepted result.
    pub fn early_return(name: impl Into<String>, accept: impl Fn(&Value) -> bool + 'static) -> Self {
        Self {
            name: name.into(),
            mode: DispatchMode::EarlyReturn(Rc::new(accept)),
        }
    }

    /// Event name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

struct Event {
    mode: DispatchMode,
    subscribers: Vec<(u64, HandlerCallback)>,
}

#[derive(Default)]
struct Table {
    events: BTreeMap<String, Event>,
    next_id: u64,
}

/// The handler table of one extension. Cloning shares the table.
#[derive(Clone)]
pub struct Handlers {
    owner: String,
    inner: Rc<RefCell<Table>>,
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.inner.borrow();
        let mut map = f.debug_map();
        for (name, event) in &table.events {
            map.entry(name, &event.subscribers.len());
        }
        map.finish()
    }
}

impl Handlers {
    /// Create a table with the given events and no subscribers.
    pub fn new(owner: impl Into<String>, events: impl IntoIterator<Item = EventSpec>) -> Self {
        let events = events
            .into_iter()
            .map(|spec| {
                (
                    spec.name,
                    Event {
                        mode: spec.mode,
                        subscribers: Vec::new(),
                    },
                )
            })
            .collect();
        Self {
            owner: owner.into(),
            inner: Rc::new(RefCell::new(Table { events, next_id: 0 })),
        }
    }

    /// Subscribe to `event`. The returned disposer unsubscribes and is safe to call twice.
    pub fn add(
        &self,
        event: &str,
        callback: impl Fn(&Value) -> Result<Value, BoxError> + 'static,
    ) -> Result<Disposer, ConfigurationError> {
        let mut table = self.inner.borrow_mut();
        let id = table.next_id;
        let Some(slot) = table.events.get_mut(event) else {
            return Err(ConfigurationError::UnknownEvent {
                extension: self.owner.clone(),
                event: event.to_string(),
            });
        };
        slot.subscribers.push((id, Rc::new(callback)));
        table.next_id += 1;
        drop(table);

        let weak: Weak<RefCell<Table>> = Rc::downgrade(&self.inner);
        let event = event.to_string();
        Ok(Disposer::new(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let mut table = inner.borrow_mut();
            if let Some(slot) = table.events.get_mut(&event) {
                slot.subscribers.retain(|(sub, _)| *sub != id);
            }
        }))
    }

    /// Raise `event` with `payload`.
    ///
    /// Handlers see a snapshot of the subscriber list, so they may subscribe or unsubscribe while
    /// the event runs. An undeclared event is logged and yields `None`. A failing handler stops
    /// the dispatch and its error is returned.
    pub fn dispatch(&self, event: &str, payload: &Value) -> Result<Option<Value>, HandlerError> {
        let (mode, callbacks) = {
            let table = self.inner.borrow();
            let Some(slot) = table.events.get(event) else {
                tracing::warn!(extension = %self.owner, event, "dispatch of undeclared event");
                return Ok(None);
            };
            let callbacks: Vec<HandlerCallback> =
                slot.subscribers.iter().map(|(_, cb)| Rc::clone(cb)).collect();
            (slot.mode.clone(), callbacks)
        };
        tracing::trace!(extension = %self.owner, event, handlers = callbacks.len(), "dispatch");

        for callback in callbacks {
            let value = callback(payload).map_err(HandlerError)?;
            if let DispatchMode::EarlyReturn(accept) = &mode
                && accept(&value)
            {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    /// Number of subscribers to `event`.
    pub fn count(&self, event: &str) -> usize {
        self.inner
            .borrow()
            .events
            .get(event)
            .map_or(0, |e| e.subscribers.len())
    }

    /// Declared event names.
    pub fn events(&self) -> Vec<String> {
        self.inner.borrow().events.keys().cloned().collect()
    }

    /// Returns `true` if `event` was declared.
    pub fn declares(&self, event: &str) -> bool {
        self.inner.borrow().events.contains_key(event)
    }

    /// Drop every subscriber. Events stay declared.
    pub fn clear(&self) {
        for event in self.inner.borrow_mut().events.values_mut() {
            event.subscribers.clear();
        }
    }
}
