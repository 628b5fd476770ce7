//! # Entity World
//!
//! The world is the container that associates entities with their
//! components. It owns:
//!
//! - The **entity vector**: the authoritative slot per index. A live slot
//!   holds the entity currently occupying it; a released slot keeps its
//!   bumped generation and stores the next free slot in its index field,
//!   forming an intrusive free list.
//! - The **storage table**: one type-erased component storage per
//!   registered component type, addressed by [`TypeKey`], each paired with
//!   its three event channels.
//! - The **collection sorters** that maintain grouped storage prefixes by
//!   listening to those events.
//!
//! ## Events
//! The world-level component operations (`emplace*`, `replace`, `erase*`,
//! `destroy`) are the documented mutation path: they fire `on_create` /
//! `on_update` / `on_remove` around the underlying container edits.
//! `on_create` and `on_update` fire after the value is installed;
//! `on_remove` fires before removal so observers can still read the value.
//! Handlers may read any storage and mutate storages other than the one
//! mid-event; structurally mutating the firing storage from its own handler
//! is a precondition violation, except `replace` on the same entity.
//!
//! ## Concurrency
//! Operations on a world are not thread-safe and must be synchronized
//! externally. Distinct worlds are independent.

use std::any::type_name;

use log::{debug, trace};

use crate::engine::collection::Sorter;
use crate::engine::events::{EventChannel, EventProxy, StorageEvents};
use crate::engine::query::QueryBuilder;
use crate::engine::registry::{TypeKey, TypeRegistry};
use crate::engine::storage::{
    AnyComponentSet, Component, ComponentSet, EmplaceResult, StorageOptions,
};
use crate::engine::types::{next_generation, Entity, GenerationId, IndexId, TOMBSTONE_GENERATION, TOMBSTONE_INDEX};
use crate::engine::view::{Include, TypeList, View};

/// One slot of the world's storage table: the erased component set plus its
/// event channels.
pub(crate) struct StorageEntry {
    pub(crate) set: Box<dyn AnyComponentSet>,
    pub(crate) events: StorageEvents,
}

/// Container associating entities with densely stored components.
pub struct World {
    /// Authoritative per-index entity slots (live entry or free-list link).
    pub(crate) slots: Vec<Entity>,
    /// Head of the free-slot list; tombstone index when empty.
    pub(crate) next_free: IndexId,
    /// Count of live entities.
    pub(crate) alive: usize,
    pub(crate) registry: TypeRegistry,
    /// Storage table indexed by `TypeKey`.
    pub(crate) storages: Vec<Option<StorageEntry>>,
    pub(crate) sorters: Vec<Sorter>,
    /// Monotonic source of callback handles.
    pub(crate) next_callback: u64,
    /// Stack of (storage, channel) pairs currently mid-dispatch.
    pub(crate) dispatch_stack: Vec<(TypeKey, EventChannel)>,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// Creates an empty world with its own type registry.
    pub fn new() -> Self {
        Self::with_registry(TypeRegistry::new())
    }

    /// Creates an empty world using an injected type registry, e.g. one
    /// pre-populated by a reflection layer.
    pub fn with_registry(registry: TypeRegistry) -> Self {
        Self {
            slots: Vec::new(),
            next_free: TOMBSTONE_INDEX,
            alive: 0,
            registry,
            storages: Vec::new(),
            sorters: Vec::new(),
            next_callback: 0,
            dispatch_stack: Vec::new(),
        }
    }

    /// Returns the world's type registry.
    #[inline]
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Returns the key of component type `C`, if a storage was created.
    #[inline]
    pub fn key_of<C: Component>(&self) -> Option<TypeKey> {
        self.registry.key_of::<C>()
    }

    // ─── entity lifecycle ────────────────────────────────────────────────

    /// Creates a live entity, recycling a released slot when one exists.
    ///
    /// A recycled slot keeps the generation it was released with, so stale
    /// copies of its previous occupant stay invalid.
    pub fn generate(&mut self) -> Entity {
        self.generate_with(TOMBSTONE_GENERATION)
    }

    /// Creates a live entity with an explicit generation. Passing the
    /// tombstone generation preserves the slot's current generation (zero
    /// for a brand-new slot).
    pub fn generate_with(&mut self, generation: GenerationId) -> Entity {
        let entity = if self.next_free != TOMBSTONE_INDEX {
            let index = self.next_free;
            let slot = self.slots[index as usize];
            self.next_free = slot.index();
            let generation = if generation == TOMBSTONE_GENERATION {
                slot.generation()
            } else {
                generation
            };
            let entity = Entity::new(generation, index);
            self.slots[index as usize] = entity;
            entity
        } else {
            let index = self.slots.len() as IndexId;
            debug_assert!(index < TOMBSTONE_INDEX, "entity index space exhausted");
            let generation = if generation == TOMBSTONE_GENERATION { 0 } else { generation };
            let entity = Entity::new(generation, index);
            self.slots.push(entity);
            entity
        };
        self.alive += 1;
        entity
    }

    /// Releases `entity`'s slot back to the free list, bumping its
    /// generation. Component storages are not touched; use
    /// [`destroy`](Self::destroy) to drop components as well.
    pub fn release(&mut self, entity: Entity) {
        debug_assert!(self.contains(entity), "release of dead entity {entity}");
        let index = entity.index();
        let bumped = next_generation(entity.generation());
        self.slots[index as usize] = Entity::new(bumped, self.next_free);
        self.next_free = index;
        self.alive -= 1;
    }

    /// Erases every component of `entity` (firing removal events), then
    /// releases its slot.
    pub fn destroy(&mut self, entity: Entity) {
        debug_assert!(self.contains(entity), "destroy of dead entity {entity}");
        let keys: Vec<TypeKey> = self
            .storages
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| {
                entry
                    .as_ref()
                    .is_some_and(|entry| entry.set.contains(entity))
                    .then(|| TypeKey::from_index(index))
            })
            .collect();
        for key in keys {
            self.erase_key(key, entity);
        }
        self.release(entity);
    }

    /// Returns `true` if `entity` is live: its index is in range and its
    /// generation matches the slot's current occupant.
    #[inline]
    pub fn contains(&self, entity: Entity) -> bool {
        let index = entity.index() as usize;
        index < self.slots.len() && self.slots[index] == entity
    }

    /// Number of live entities.
    #[inline]
    pub fn len(&self) -> usize {
        self.alive
    }

    /// Returns `true` if no entities are live.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.alive == 0
    }

    /// Number of entity slots ever allocated, live or free.
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    // ─── storage table ───────────────────────────────────────────────────

    /// Lazily creates the storage for `C` and reserves capacity for at
    /// least `additional` more components. Returns the storage handle.
    pub fn reserve<C: Component>(&mut self, additional: usize) -> &mut ComponentSet<C> {
        let key = self.ensure_storage::<C>();
        let set = self.typed_mut::<C>(key);
        set.reserve(additional);
        set
    }

    /// Lazily creates the storage for `C` with explicit options. Options
    /// only apply on first creation; an existing storage is returned as-is.
    pub fn reserve_with<C: Component>(&mut self, options: StorageOptions) -> &mut ComponentSet<C> {
        let key = self.create_storage::<C>(options);
        self.typed_mut::<C>(key)
    }

    /// Returns the storage for `C`, or `None` if it was never created.
    pub fn storage<C: Component>(&self) -> Option<&ComponentSet<C>> {
        let key = self.registry.key_of::<C>()?;
        let entry = self.storages.get(key.index())?.as_ref()?;
        entry.set.as_any().downcast_ref::<ComponentSet<C>>()
    }

    /// Returns the storage for `C`, creating it lazily.
    ///
    /// Structural changes made directly through the returned set fire no
    /// events and are invisible to collections; prefer the world-level
    /// operations when observers are attached.
    pub fn storage_mut<C: Component>(&mut self) -> &mut ComponentSet<C> {
        let key = self.ensure_storage::<C>();
        self.typed_mut::<C>(key)
    }

    pub(crate) fn ensure_storage<C: Component>(&mut self) -> TypeKey {
        self.create_storage::<C>(StorageOptions::default())
    }

    pub(crate) fn create_storage<C: Component>(&mut self, options: StorageOptions) -> TypeKey {
        let key = self.registry.register::<C>();
        if self.storages.len() <= key.index() {
            self.storages.resize_with(key.index() + 1, || None);
        }
        if self.storages[key.index()].is_none() {
            debug!("creating component storage for {}", type_name::<C>());
            self.storages[key.index()] = Some(StorageEntry {
                set: Box::new(ComponentSet::<C>::with_options(options)),
                events: StorageEvents::default(),
            });
        }
        key
    }

    pub(crate) fn typed_mut<C: Component>(&mut self, key: TypeKey) -> &mut ComponentSet<C> {
        self.storages[key.index()]
            .as_mut()
            .expect("storage entry must exist for a registered key")
            .set
            .as_any_mut()
            .downcast_mut::<ComponentSet<C>>()
            .expect("component type mismatch in storage table")
    }

    pub(crate) fn erased(&self, key: TypeKey) -> Option<&dyn AnyComponentSet> {
        self.storages
            .get(key.index())
            .and_then(|entry| entry.as_ref())
            .map(|entry| entry.set.as_ref())
    }

    pub(crate) fn erased_mut(&mut self, key: TypeKey) -> Option<&mut dyn AnyComponentSet> {
        self.storages
            .get_mut(key.index())
            .and_then(|entry| entry.as_mut())
            .map(|entry| entry.set.as_mut())
    }

    // ─── component operations ────────────────────────────────────────────

    /// Attaches a component to `entity` and fires `on_create`. On fixed
    /// storages a free hole slot is preferred over appending.
    /// Precondition: `entity` is live and has no `C` yet.
    pub fn emplace<C: Component>(&mut self, entity: Entity, value: C) -> &mut C {
        debug_assert!(self.contains(entity), "emplace on dead entity {entity}");
        let key = self.ensure_storage::<C>();
        self.assert_no_dispatch(key);
        self.typed_mut::<C>(key).emplace(entity, value);
        self.fire(key, EventChannel::Created, entity);
        self.typed_mut::<C>(key).get_mut(entity)
    }

    /// Like [`emplace`](Self::emplace) but always appends to the storage
    /// tail, never reusing a hole.
    pub fn emplace_back<C: Component>(&mut self, entity: Entity, value: C) -> &mut C {
        debug_assert!(self.contains(entity), "emplace on dead entity {entity}");
        let key = self.ensure_storage::<C>();
        self.assert_no_dispatch(key);
        self.typed_mut::<C>(key).emplace_back(entity, value);
        self.fire(key, EventChannel::Created, entity);
        self.typed_mut::<C>(key).get_mut(entity)
    }

    /// Replaces the component of `entity` in place and fires `on_update`.
    /// Precondition: the component is present.
    pub fn replace<C: Component>(&mut self, entity: Entity, value: C) -> &mut C {
        let key = self
            .registry
            .key_of::<C>()
            .expect("replace on a component type with no storage");
        self.typed_mut::<C>(key).replace(entity, value);
        self.fire(key, EventChannel::Updated, entity);
        self.typed_mut::<C>(key).get_mut(entity)
    }

    /// Emplaces the component if absent, replaces it otherwise. Exactly one
    /// of `on_create` / `on_update` fires.
    pub fn emplace_or_replace<C: Component>(&mut self, entity: Entity, value: C) -> &mut C {
        let present = self.storage::<C>().is_some_and(|set| set.contains(entity));
        if present {
            self.replace(entity, value)
        } else {
            self.emplace(entity, value)
        }
    }

    /// Tail-appending twin of [`emplace_or_replace`](Self::emplace_or_replace).
    pub fn emplace_back_or_replace<C: Component>(&mut self, entity: Entity, value: C) -> &mut C {
        let present = self.storage::<C>().is_some_and(|set| set.contains(entity));
        if present {
            self.replace(entity, value)
        } else {
            self.emplace_back(entity, value)
        }
    }

    /// Fallible emplace: reports an already-present component instead of
    /// treating it as a precondition violation. Fires `on_create` only when
    /// an insertion happens.
    pub fn try_emplace<C: Component>(&mut self, entity: Entity, value: C) -> EmplaceResult<'_, C> {
        let present = self.storage::<C>().is_some_and(|set| set.contains(entity));
        if present {
            let key = self
                .registry
                .key_of::<C>()
                .expect("storage checked present above");
            EmplaceResult::AlreadyPresent {
                existing: self.typed_mut::<C>(key).get_mut(entity),
                rejected: value,
            }
        } else {
            EmplaceResult::Inserted(self.emplace(entity, value))
        }
    }

    /// Detaches the component of `entity`, firing `on_remove` *before* the
    /// removal so observers may still read the value.
    /// Precondition: the component is present.
    pub fn erase<C: Component>(&mut self, entity: Entity) {
        let key = self
            .registry
            .key_of::<C>()
            .expect("erase on a component type with no storage");
        debug_assert!(
            self.erased(key).is_some_and(|set| set.contains(entity)),
            "erase of absent component on {entity}"
        );
        self.erase_key(key, entity);
    }

    /// Erases the component, then releases the entity if that was its last
    /// component. Returns `true` when the release happened.
    pub fn erase_and_release<C: Component>(&mut self, entity: Entity) -> bool {
        self.erase::<C>(entity);
        if self.has_no_components(entity) {
            self.release(entity);
            true
        } else {
            false
        }
    }

    pub(crate) fn erase_key(&mut self, key: TypeKey, entity: Entity) {
        self.assert_no_dispatch(key);
        self.fire(key, EventChannel::Removed, entity);
        self.erased_mut(key)
            .expect("storage table must not lose entries during removal")
            .erase(entity);
    }

    /// Returns the component of `entity`. Precondition: `entity` is live
    /// and the component is present.
    pub fn get<C: Component>(&self, entity: Entity) -> &C {
        debug_assert!(self.contains(entity), "get on dead entity {entity}");
        self.storage::<C>()
            .expect("get on a component type with no storage")
            .get(entity)
    }

    /// Mutable form of [`get`](Self::get). Fires no events; use
    /// [`replace`](Self::replace) when observers must see the update.
    pub fn get_mut<C: Component>(&mut self, entity: Entity) -> &mut C {
        debug_assert!(self.contains(entity), "get on dead entity {entity}");
        self.storage_mut::<C>().get_mut(entity)
    }

    /// Returns the component of `entity`, or `None` when either the
    /// storage or the component is absent.
    pub fn try_get<C: Component>(&self, entity: Entity) -> Option<&C> {
        self.storage::<C>()?.try_get(entity)
    }

    /// Mutable form of [`try_get`](Self::try_get).
    pub fn try_get_mut<C: Component>(&mut self, entity: Entity) -> Option<&mut C> {
        let key = self.registry.key_of::<C>()?;
        if self.erased(key).is_none() {
            return None;
        }
        self.typed_mut::<C>(key).try_get_mut(entity)
    }

    // ─── bundles ─────────────────────────────────────────────────────────

    /// Generates an entity and emplaces every component of `bundle`.
    pub fn insert<B: ComponentBundle>(&mut self, bundle: B) -> Entity {
        let entity = self.generate();
        bundle.emplace_into(self, entity);
        entity
    }

    /// Generates an entity and tail-appends every component of `bundle`.
    pub fn push_back<B: ComponentBundle>(&mut self, bundle: B) -> Entity {
        let entity = self.generate();
        bundle.emplace_back_into(self, entity);
        entity
    }

    // ─── membership interrogation ────────────────────────────────────────

    /// Returns `true` if `entity` has a component of every type in `L`.
    pub fn contains_all<L: TypeList>(&self, entity: Entity) -> bool {
        L::keys(&self.registry).into_iter().all(|key| {
            key.and_then(|key| self.erased(key))
                .is_some_and(|set| set.contains(entity))
        })
    }

    /// Returns `true` if `entity` has a component of any type in `L`.
    pub fn contains_any<L: TypeList>(&self, entity: Entity) -> bool {
        L::keys(&self.registry).into_iter().any(|key| {
            key.and_then(|key| self.erased(key))
                .is_some_and(|set| set.contains(entity))
        })
    }

    /// Returns `true` if `entity` has no component of any type in `L`.
    pub fn contains_none<L: TypeList>(&self, entity: Entity) -> bool {
        !self.contains_any::<L>(entity)
    }

    /// Number of components currently attached to `entity`.
    pub fn component_count(&self, entity: Entity) -> usize {
        self.storages
            .iter()
            .flatten()
            .filter(|entry| entry.set.contains(entity))
            .count()
    }

    /// Returns `true` if no storage contains `entity`.
    pub fn has_no_components(&self, entity: Entity) -> bool {
        !self
            .storages
            .iter()
            .flatten()
            .any(|entry| entry.set.contains(entity))
    }

    // ─── bulk lifecycle ──────────────────────────────────────────────────

    /// Clears every storage's dense and value arrays while preserving
    /// storage identity, reserved capacity, and event subscriptions.
    /// Collection prefixes reset to empty. Entity slots are untouched.
    pub fn clear_all(&mut self) {
        for entry in self.storages.iter_mut().flatten() {
            entry.set.clear();
        }
        for index in 0..self.sorters.len() {
            self.sorter_rebuild(index);
        }
        trace!("cleared all component storages");
    }

    /// Clears the storages of the types in `L`.
    pub fn clear<L: TypeList>(&mut self) {
        for key in L::keys(&self.registry).into_iter().flatten() {
            self.clear_key(key);
        }
    }

    /// Clears the storage identified by `key`, then rebuilds every
    /// collection that references the type.
    pub fn clear_key(&mut self, key: TypeKey) {
        self.assert_no_dispatch(key);
        match self.erased_mut(key) {
            Some(set) => set.clear(),
            None => return,
        }
        let affected: Vec<usize> = self
            .sorters
            .iter()
            .enumerate()
            .filter(|(_, sorter)| sorter.references(key))
            .map(|(index, _)| index)
            .collect();
        for index in affected {
            self.sorter_rebuild(index);
        }
    }

    /// Drops the storage table and every collection sorter. Entity slots
    /// and the type registry survive; sparse pages are reclaimed.
    pub fn purge(&mut self) {
        debug_assert!(
            self.dispatch_stack.is_empty(),
            "purge during event dispatch"
        );
        self.storages.clear();
        self.sorters.clear();
        debug!("purged storage table and collection sorters");
    }

    // ─── events ──────────────────────────────────────────────────────────

    /// Subscription handle for the creation events of `C`'s storage,
    /// creating the storage lazily.
    pub fn on_create<C: Component>(&mut self) -> EventProxy<'_> {
        self.event_proxy::<C>(EventChannel::Created)
    }

    /// Subscription handle for the update events of `C`'s storage.
    pub fn on_update<C: Component>(&mut self) -> EventProxy<'_> {
        self.event_proxy::<C>(EventChannel::Updated)
    }

    /// Subscription handle for the removal events of `C`'s storage.
    pub fn on_remove<C: Component>(&mut self) -> EventProxy<'_> {
        self.event_proxy::<C>(EventChannel::Removed)
    }

    fn event_proxy<C: Component>(&mut self, channel: EventChannel) -> EventProxy<'_> {
        let key = self.ensure_storage::<C>();
        let entry = self.storages[key.index()]
            .as_mut()
            .expect("storage just ensured");
        EventProxy {
            list: entry.events.channel_mut(channel),
            next_handle: &mut self.next_callback,
        }
    }

    /// Dispatches one channel of one storage. The list is detached while it
    /// runs so handlers get full access to the world; subscriptions made to
    /// the dispatching channel during dispatch take effect afterwards.
    pub(crate) fn fire(&mut self, key: TypeKey, channel: EventChannel, entity: Entity) {
        let Some(entry) = self.storages.get_mut(key.index()).and_then(|e| e.as_mut()) else {
            return;
        };
        let list = entry.events.channel_mut(channel);
        if list.entries.is_empty() {
            return;
        }
        let mut taken = std::mem::take(&mut list.entries);
        list.dispatching = true;
        self.dispatch_stack.push((key, channel));
        for (_, callback) in taken.iter_mut() {
            callback(self, entity);
        }
        self.dispatch_stack.pop();
        let entry = self
            .storages
            .get_mut(key.index())
            .and_then(|e| e.as_mut())
            .expect("storage table must not be dropped during event dispatch");
        let list = entry.events.channel_mut(channel);
        list.dispatching = false;
        let added_during_dispatch = std::mem::replace(&mut list.entries, taken);
        list.entries.extend(added_during_dispatch);
        if !list.pending_removal.is_empty() {
            let pending = std::mem::take(&mut list.pending_removal);
            list.entries.retain(|(handle, _)| !pending.contains(handle));
        }
    }

    #[inline]
    pub(crate) fn assert_no_dispatch(&self, key: TypeKey) {
        debug_assert!(
            !self.dispatch_stack.iter().any(|(k, _)| *k == key),
            "structural change to a storage during its own event dispatch"
        );
    }

    // ─── queries ─────────────────────────────────────────────────────────

    /// Starts a query over this world.
    pub fn query(&mut self) -> QueryBuilder<'_> {
        QueryBuilder::new(self)
    }

    /// Shorthand for a view including the component tuple `I`, creating
    /// missing storages lazily.
    pub fn view<I>(&mut self) -> View<'_, I, ()>
    where
        I: for<'a> Include<'a>,
    {
        self.query().include::<I>().view()
    }
}

/// Tuple of components emplaced together by [`World::insert`] and
/// [`World::push_back`].
pub trait ComponentBundle {
    /// Emplaces every component of the bundle onto `entity`.
    fn emplace_into(self, world: &mut World, entity: Entity);
    /// Tail-appending twin of [`emplace_into`](Self::emplace_into).
    fn emplace_back_into(self, world: &mut World, entity: Entity);
}

macro_rules! impl_component_bundle {
    ($(($T:ident, $idx:tt)),+) => {
        impl<$($T: Component),+> ComponentBundle for ($($T,)+) {
            fn emplace_into(self, world: &mut World, entity: Entity) {
                $(world.emplace::<$T>(entity, self.$idx);)+
            }

            fn emplace_back_into(self, world: &mut World, entity: Entity) {
                $(world.emplace_back::<$T>(entity, self.$idx);)+
            }
        }
    };
}

impl_component_bundle!((A, 0));
impl_component_bundle!((A, 0), (B, 1));
impl_component_bundle!((A, 0), (B, 1), (C, 2));
impl_component_bundle!((A, 0), (B, 1), (C, 2), (D, 3));
impl_component_bundle!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4));
impl_component_bundle!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4), (F, 5));
