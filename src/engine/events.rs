//! # Component Lifecycle Events
//!
//! Ordered multicast callback lists attached to each component storage.
//!
//! ## Purpose
//! Every storage owned by a world carries three event channels — creation,
//! update, removal — dispatched synchronously around the world-level
//! component operations. Collection sorters keep their grouped prefixes
//! correct by subscribing to these channels; user code can subscribe
//! alongside them.
//!
//! ## Ordering
//! Subscription accepts an optional *anchor* handle; when present, the new
//! subscriber is inserted immediately before the anchor in dispatch order,
//! otherwise at the end. Dispatch walks the list left to right and invokes
//! every subscriber exactly once per operation. The anchor mechanism is
//! what keeps nested collections correct: a more restrictive collection's
//! creation handler must run after a less restrictive one's, and its
//! removal handler before.
//!
//! Handles are opaque monotonic ids, stable for the lifetime of the world.
//!
//! ## Re-entrancy
//! Dispatch detaches the list while it runs. Subscriptions made to the
//! dispatching channel from inside a handler take effect once the dispatch
//! completes; unsubscribing a handler of the dispatching channel is
//! deferred the same way. Anchored subscription requires the anchor to be
//! present in the attached portion of the list.

use crate::engine::types::Entity;
use crate::engine::world::World;

/// Opaque, stable identifier of one event subscription.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct CallbackHandle(u64);

/// Boxed subscriber. Handlers receive the owning world and the entity the
/// operation applies to.
pub(crate) type EventCallback = Box<dyn FnMut(&mut World, Entity) + Send>;

/// One event channel of a storage.
#[derive(Default)]
pub(crate) struct EventList {
    pub(crate) entries: Vec<(CallbackHandle, EventCallback)>,
    pub(crate) pending_removal: Vec<CallbackHandle>,
    pub(crate) dispatching: bool,
}

impl EventList {
    /// Appends a subscriber at the end of the dispatch order.
    pub(crate) fn subscribe(
        &mut self,
        next_handle: &mut u64,
        callback: EventCallback,
    ) -> CallbackHandle {
        let handle = CallbackHandle(*next_handle);
        *next_handle += 1;
        self.entries.push((handle, callback));
        handle
    }

    /// Inserts a subscriber immediately before `anchor`.
    ///
    /// A missing anchor is a precondition violation; the subscriber is then
    /// appended at the end.
    pub(crate) fn subscribe_before(
        &mut self,
        next_handle: &mut u64,
        anchor: CallbackHandle,
        callback: EventCallback,
    ) -> CallbackHandle {
        let handle = CallbackHandle(*next_handle);
        *next_handle += 1;
        match self.position_of(anchor) {
            Some(position) => self.entries.insert(position, (handle, callback)),
            None => {
                debug_assert!(false, "subscription anchor {anchor:?} is not in this list");
                self.entries.push((handle, callback));
            }
        }
        handle
    }

    /// Removes the subscriber identified by `handle`.
    ///
    /// Returns `true` if it was removed, or if removal was deferred because
    /// the channel is mid-dispatch.
    pub(crate) fn unsubscribe(&mut self, handle: CallbackHandle) -> bool {
        if let Some(position) = self.position_of(handle) {
            self.entries.remove(position);
            return true;
        }
        if self.dispatching {
            self.pending_removal.push(handle);
            return true;
        }
        false
    }

    /// Position of `handle` in dispatch order, if attached.
    pub(crate) fn position_of(&self, handle: CallbackHandle) -> Option<usize> {
        self.entries.iter().position(|(h, _)| *h == handle)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Which lifecycle channel of a storage an event belongs to.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum EventChannel {
    /// Fired after a component is created and installed.
    Created,
    /// Fired after a component is replaced in place.
    Updated,
    /// Fired before a component is removed; observers may read the value.
    Removed,
}

/// The three event channels of one storage.
#[derive(Default)]
pub(crate) struct StorageEvents {
    pub(crate) on_create: EventList,
    pub(crate) on_update: EventList,
    pub(crate) on_remove: EventList,
}

impl StorageEvents {
    pub(crate) fn channel_mut(&mut self, channel: EventChannel) -> &mut EventList {
        match channel {
            EventChannel::Created => &mut self.on_create,
            EventChannel::Updated => &mut self.on_update,
            EventChannel::Removed => &mut self.on_remove,
        }
    }

    pub(crate) fn channel(&self, channel: EventChannel) -> &EventList {
        match channel {
            EventChannel::Created => &self.on_create,
            EventChannel::Updated => &self.on_update,
            EventChannel::Removed => &self.on_remove,
        }
    }
}

/// Borrowed handle to one event channel of one storage, used to manage
/// subscriptions.
///
/// Obtained from [`World::on_create`], [`World::on_update`] and
/// [`World::on_remove`].
pub struct EventProxy<'w> {
    pub(crate) list: &'w mut EventList,
    pub(crate) next_handle: &'w mut u64,
}

impl EventProxy<'_> {
    /// Appends a subscriber at the end of the dispatch order.
    pub fn subscribe(
        &mut self,
        callback: impl FnMut(&mut World, Entity) + Send + 'static,
    ) -> CallbackHandle {
        self.list.subscribe(self.next_handle, Box::new(callback))
    }

    /// Inserts a subscriber immediately before `anchor` in dispatch order.
    ///
    /// Subscribing before an anchor that is not attached to this channel is
    /// a precondition violation.
    pub fn subscribe_before(
        &mut self,
        anchor: CallbackHandle,
        callback: impl FnMut(&mut World, Entity) + Send + 'static,
    ) -> CallbackHandle {
        self.list
            .subscribe_before(self.next_handle, anchor, Box::new(callback))
    }

    /// Removes a subscriber. Returns `true` if it was removed (possibly
    /// deferred until an in-flight dispatch of this channel finishes).
    pub fn unsubscribe(&mut self, handle: CallbackHandle) -> bool {
        self.list.unsubscribe(handle)
    }

    /// Number of attached subscribers.
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Returns `true` if no subscribers are attached.
    pub fn is_empty(&self) -> bool {
        self.list.len() == 0
    }
}
