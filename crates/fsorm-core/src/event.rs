//! Synchronous, record-scoped event channel.
//!
//! Every [`ObjectRecord`](crate::ObjectRecord) owns one [`EventChannel`] that
//! its value cells share. Emission runs every subscriber for the event's kind
//! on the caller's stack, in registration order, and returns once they have
//! all run or one of them failed. Subscribers may re-enter the emitting cell:
//! the lazy-value protocol relies on a `ResolveLazyValue` subscriber calling
//! `set` on the very cell that is emitting.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use fsorm_error::Result;
use fsorm_types::{LazyToken, Slot, Value};
use tracing::trace;

use crate::cell::DynValueCell;

/// Discriminant of an [`Event`], used to route it to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A cell with a pending lazy value is being read.
    ResolveLazyValue,
    /// A cell's value changed.
    Changed,
    /// The record's host was reclaimed or explicitly detached.
    Deleted,
}

impl EventKind {
    /// Stable name used in logs and subscriber error messages.
    pub const fn name(self) -> &'static str {
        match self {
            Self::ResolveLazyValue => "resolve-lazy-value",
            Self::Changed => "changed",
            Self::Deleted => "object-deleted",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The new side of a `Changed` event.
///
/// Unlike the stored value, this can carry the lazy token that was just
/// assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observed {
    Undefined,
    Null,
    Value(Value),
    Lazy(LazyToken),
}

impl From<Slot<Value>> for Observed {
    fn from(slot: Slot<Value>) -> Self {
        match slot {
            Slot::Undefined => Self::Undefined,
            Slot::Null => Self::Null,
            Slot::Value(v) => Self::Value(v),
        }
    }
}

/// A notification dispatched through an [`EventChannel`].
pub enum Event<'a> {
    /// `cell` has `token` pending and is being read. A subscriber resolves it
    /// by calling `cell.set(..)` before returning.
    ResolveLazyValue {
        cell: &'a dyn DynValueCell,
        token: &'a LazyToken,
    },
    /// `cell` went from `old` to `new`. Both sides are in application form.
    Changed {
        cell: &'a dyn DynValueCell,
        old: Slot<Value>,
        new: Observed,
        from_storage: bool,
    },
    /// The host object is gone.
    Deleted,
}

impl Event<'_> {
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::ResolveLazyValue { .. } => EventKind::ResolveLazyValue,
            Self::Changed { .. } => EventKind::Changed,
            Self::Deleted => EventKind::Deleted,
        }
    }
}

impl fmt::Debug for Event<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResolveLazyValue { cell, token } => f
                .debug_struct("ResolveLazyValue")
                .field("kind", &cell.kind_name())
                .field("token", token)
                .finish(),
            Self::Changed {
                cell,
                old,
                new,
                from_storage,
            } => f
                .debug_struct("Changed")
                .field("kind", &cell.kind_name())
                .field("old", old)
                .field("new", new)
                .field("from_storage", from_storage)
                .finish(),
            Self::Deleted => f.write_str("Deleted"),
        }
    }
}

/// What a subscriber wants done with itself after it ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOutcome {
    Keep,
    Unhook,
}

/// Handle returned by [`EventChannel::hook`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Type-erased subscriber callback.
pub type Subscriber = Rc<dyn Fn(&Event<'_>) -> Result<HookOutcome>>;

#[derive(Clone)]
struct Subscription {
    id: SubscriptionId,
    kind: EventKind,
    callback: Subscriber,
}

/// Per-record publish/subscribe channel.
#[derive(Default)]
pub struct EventChannel {
    subscribers: RefCell<Vec<Subscription>>,
    saved: RefCell<Option<Vec<Subscription>>>,
    next_id: Cell<u64>,
    owner: RefCell<Option<Weak<dyn Any>>>,
}

impl EventChannel {
    /// Create a channel with no owner; it always dispatches.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a channel that goes quiet once `owner` has been dropped.
    #[must_use]
    pub fn owned_by<T: Any>(owner: &Rc<T>) -> Self {
        let channel = Self::new();
        let weak = Rc::downgrade(owner);
        let weak: Weak<dyn Any> = weak;
        channel.bind_owner(weak);
        channel
    }

    pub(crate) fn bind_owner(&self, owner: Weak<dyn Any>) {
        *self.owner.borrow_mut() = Some(owner);
    }

    /// Whether the owner (if any) is still alive.
    pub fn is_live(&self) -> bool {
        self.owner
            .borrow()
            .as_ref()
            .is_none_or(|owner| owner.strong_count() > 0)
    }

    /// Register `callback` for events of `kind`.
    pub fn hook<F>(&self, kind: EventKind, callback: F) -> SubscriptionId
    where
        F: Fn(&Event<'_>) -> Result<HookOutcome> + 'static,
    {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.subscribers.borrow_mut().push(Subscription {
            id,
            kind,
            callback: Rc::new(callback),
        });
        id
    }

    /// Remove a subscription. Returns false if it was not registered.
    pub fn unhook(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != before
    }

    /// Number of subscribers currently registered for `kind`.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscribers
            .borrow()
            .iter()
            .filter(|s| s.kind == kind)
            .count()
    }

    /// Dispatch `event` to every subscriber of its kind.
    ///
    /// Subscribers run against a snapshot of the list taken before the first
    /// one is called, so they may hook, unhook or emit re-entrantly. The first
    /// error stops dispatch and is returned unchanged.
    pub fn emit(&self, event: &Event<'_>) -> Result<()> {
        let kind = event.kind();
        if !self.is_live() {
            trace!(event = %kind, "owner gone, emission dropped");
            return Ok(());
        }
        let snapshot: Vec<Subscription> = self
            .subscribers
            .borrow()
            .iter()
            .filter(|s| s.kind == kind)
            .cloned()
            .collect();
        trace!(event = %kind, subscribers = snapshot.len(), "emit");
        for subscription in snapshot {
            if (subscription.callback)(event)? == HookOutcome::Unhook {
                self.unhook(subscription.id);
            }
        }
        Ok(())
    }

    /// Remember the current subscriber list for a later [`restore`](Self::restore).
    pub fn save(&self) {
        *self.saved.borrow_mut() = Some(self.subscribers.borrow().clone());
    }

    /// Reinstate the subscriber list captured by the last [`save`](Self::save).
    /// Without a prior save this drops every subscriber.
    pub fn restore(&self) {
        let saved = self.saved.borrow().clone().unwrap_or_default();
        *self.subscribers.borrow_mut() = saved;
    }
}

impl fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventChannel")
            .field("subscribers", &self.subscribers.borrow().len())
            .field("live", &self.is_live())
            .finish_non_exhaustive()
    }
}
