// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fixed-capacity subscription registry.
//!
//! Each slot holds a filter prefix, a handler, a scope and an optional device
//! id. Slots are filled front to back and never removed, so occupied slots
//! always form a contiguous run starting at index 0.
//!
//! Matching is a plain byte prefix test: an event named `temp/room1` reaches
//! the filters `temp/`, `temp/room1` and the empty filter, in slot order.
//! Device ids only take part in duplicate detection at insert time; dispatch
//! does not look at them.

use crate::config::{DEVICE_ID_CAPACITY, FILTER_CAPACITY, MAX_SUBSCRIPTIONS};
use crate::error::{Error, Result};
use std::fmt;
use std::sync::Arc;

/// Plain handler function: `(event_name, data)`.
pub type EventHandlerFn = fn(event_name: &str, data: &str);

/// Registered event callback.
///
/// Two handlers are the same subscriber when they are the same function, or
/// clones of the same shared closure. A closure's captured state plays the
/// role of per-handler user data.
#[derive(Clone)]
pub enum EventHandler {
    /// Free function.
    Fn(EventHandlerFn),
    /// Shared closure carrying its own context.
    Shared(Arc<dyn Fn(&str, &str) + Send + Sync>),
}

impl EventHandler {
    /// Wrap a closure. Clone the result to register the same subscriber twice.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        EventHandler::Shared(Arc::new(f))
    }

    /// Call the handler.
    pub fn invoke(&self, event_name: &str, data: &str) {
        match self {
            EventHandler::Fn(f) => f(event_name, data),
            EventHandler::Shared(f) => f(event_name, data),
        }
    }

    /// Identity comparison (function address or shared allocation).
    pub fn same_as(&self, other: &EventHandler) -> bool {
        match (self, other) {
            (EventHandler::Fn(a), EventHandler::Fn(b)) => *a as usize == *b as usize,
            (EventHandler::Shared(a), EventHandler::Shared(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl PartialEq for EventHandler {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl Eq for EventHandler {}

impl From<EventHandlerFn> for EventHandler {
    fn from(f: EventHandlerFn) -> Self {
        EventHandler::Fn(f)
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventHandler::Fn(func) => write!(f, "EventHandler::Fn({:#x})", *func as usize),
            EventHandler::Shared(arc) => {
                write!(f, "EventHandler::Shared({:p})", Arc::as_ptr(arc).cast::<()>())
            }
        }
    }
}

/// Which peer devices a subscription accepts events from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubscriptionScope {
    /// Devices owned by the same account.
    #[default]
    MyDevices,
    /// Any device on the mesh.
    AllDevices,
}

/// Length of `bytes` up to the first NUL, capped at `cap`.
fn bounded_len(bytes: &[u8], cap: usize) -> usize {
    let limit = bytes.len().min(cap);
    bytes[..limit]
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(limit)
}

/// One occupied subscription slot.
#[derive(Clone)]
pub struct FilterEntry {
    filter: [u8; FILTER_CAPACITY],
    handler: EventHandler,
    scope: SubscriptionScope,
    device_id: [u8; DEVICE_ID_CAPACITY],
}

impl FilterEntry {
    fn new(
        event_name: &str,
        handler: EventHandler,
        scope: SubscriptionScope,
        device_id: Option<&str>,
    ) -> Self {
        let name = event_name.as_bytes();
        let name_len = bounded_len(name, FILTER_CAPACITY);
        let mut filter = [0u8; FILTER_CAPACITY];
        filter[..name_len].copy_from_slice(&name[..name_len]);

        let mut id_buf = [0u8; DEVICE_ID_CAPACITY];
        if let Some(id) = device_id {
            let id = id.as_bytes();
            let id_len = bounded_len(id, DEVICE_ID_CAPACITY - 1);
            id_buf[..id_len].copy_from_slice(&id[..id_len]);
        }

        Self {
            filter,
            handler,
            scope,
            device_id: id_buf,
        }
    }

    /// Stored filter bytes (without padding).
    pub fn filter(&self) -> &[u8] {
        &self.filter[..bounded_len(&self.filter, FILTER_CAPACITY)]
    }

    /// Stored device id bytes; empty means any device.
    pub fn device_id(&self) -> &[u8] {
        &self.device_id[..bounded_len(&self.device_id, DEVICE_ID_CAPACITY - 1)]
    }

    /// Device scope the subscription was registered with.
    pub fn scope(&self) -> SubscriptionScope {
        self.scope
    }

    /// Callback invoked on a match.
    pub fn handler(&self) -> &EventHandler {
        &self.handler
    }

    /// `true` if the stored filter is a byte prefix of `event_name`.
    pub fn matches(&self, event_name: &[u8]) -> bool {
        event_name.starts_with(self.filter())
    }

    fn accepts_device(&self, id: Option<&[u8]>) -> bool {
        match id {
            Some(id) => self.device_id().starts_with(id),
            None => self.device_id().is_empty(),
        }
    }
}

impl fmt::Debug for FilterEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterEntry")
            .field("filter", &String::from_utf8_lossy(self.filter()))
            .field("handler", &self.handler)
            .field("scope", &self.scope)
            .field("device_id", &String::from_utf8_lossy(self.device_id()))
            .finish()
    }
}

/// Fixed-capacity, append-only table of subscriptions.
///
/// There is no remove operation. Insertion always takes the first free slot,
/// so the occupied slots are exactly `0..len()`.
pub struct HandlerTable<const N: usize = MAX_SUBSCRIPTIONS> {
    slots: [Option<FilterEntry>; N],
}

impl<const N: usize> Default for HandlerTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> HandlerTable<N> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }

    /// `true` if an equivalent subscription is already stored.
    ///
    /// Equivalent means same handler, same scope, a stored filter that is a
    /// prefix of `event_name`, and a compatible device id: a supplied id must
    /// prefix the stored one, no id requires the stored one to be empty.
    pub fn exists(
        &self,
        event_name: &str,
        handler: &EventHandler,
        scope: SubscriptionScope,
        device_id: Option<&str>,
    ) -> bool {
        let id = device_id
            .map(|id| {
                let id = id.as_bytes();
                &id[..bounded_len(id, DEVICE_ID_CAPACITY - 1)]
            })
            .filter(|id| !id.is_empty());

        self.entries().any(|entry| {
            entry.handler.same_as(handler)
                && entry.scope == scope
                && entry.matches(event_name.as_bytes())
                && entry.accepts_device(id)
        })
    }

    /// Store a subscription in the first free slot.
    ///
    /// Succeeds without change if an equivalent entry exists. Returns
    /// [`Error::NoMemory`] when every slot is taken; nothing is written then.
    pub fn add(
        &mut self,
        event_name: &str,
        handler: EventHandler,
        scope: SubscriptionScope,
        device_id: Option<&str>,
    ) -> Result<()> {
        if self.exists(event_name, &handler, scope, device_id) {
            log::trace!("[mesh] subscription '{}' already registered", event_name);
            return Ok(());
        }

        let slot = self
            .slots
            .iter_mut()
            .find(|slot| slot.is_none())
            .ok_or(Error::NoMemory)?;
        *slot = Some(FilterEntry::new(event_name, handler, scope, device_id));
        Ok(())
    }

    /// Invoke every handler whose filter prefixes `event_name`, in slot order.
    ///
    /// Returns the number of handlers called.
    pub fn dispatch(&self, event_name: &str, data: &str) -> usize {
        let mut invoked = 0;
        for entry in self.entries() {
            if entry.matches(event_name.as_bytes()) {
                entry.handler.invoke(event_name, data);
                invoked += 1;
            }
        }
        invoked
    }

    /// Occupied slots in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = &FilterEntry> {
        self.slots.iter().flatten()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.entries().count()
    }

    /// `true` when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries().next().is_none()
    }

    /// `true` when every slot is taken; new subscriptions get
    /// [`Error::NoMemory`].
    pub fn is_full(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// Total number of slots.
    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<const N: usize> fmt::Debug for HandlerTable<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries()).finish()
    }
}
