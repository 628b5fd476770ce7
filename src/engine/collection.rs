//! # Collections and Sorters
//!
//! A collection physically groups a set of component storages so that the
//! entities matching a fixed predicate occupy the first `N` dense slots of
//! every *collected* storage, at identical positions. Iterating the group
//! is then a straight walk over `N` contiguous entries of each storage with
//! no membership tests.
//!
//! ## Predicate
//! A collection is defined by three type lists — collected `C`, included
//! `I`, excluded `X` — plus optional types for value lookup. An entity is
//! grouped iff every storage in `C ∪ I` contains it and no storage in `X`
//! does.
//!
//! ## Maintenance
//! A world-owned *sorter* owns the invariant. It subscribes to the event
//! channels of every referenced type: creation and removal of a
//! presence-required type drive the grow/shrink handlers directly, while an
//! excluded type drives them inverted. Removal events fire before the
//! component disappears, so the grow handler exempts the firing excluded
//! type from its absence check.
//!
//! Nested collections (one constraint set containing another over a shared
//! collected type) stay correct through anchored subscription order: a
//! grow handler is inserted before the immediately-more-restrictive
//! sorter's, a shrink handler before the immediately-less-restrictive
//! sorter's, so prefixes always nest.
//!
//! Two collections whose collected types overlap without one constraint
//! set containing the other cannot both hold their orderings; creating the
//! second is refused.
//!
//! The degenerate form with no collected types maintains its own entity
//! set instead of reordering storages.

use log::debug;

use crate::engine::entity::EntitySet;
use crate::engine::error::{CollectionError, CollectionResult};
use crate::engine::events::{CallbackHandle, EventCallback, EventChannel};
use crate::engine::registry::TypeKey;
use crate::engine::storage::StorageDiscipline;
use crate::engine::types::Entity;
use crate::engine::view::{Include, Optional, TypeList};
use crate::engine::world::World;

/// Which sorter reaction a subscription drives.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum HandlerKind {
    /// The entity may now match; grow the prefix.
    Create,
    /// The entity may no longer match; shrink the prefix.
    Remove,
}

/// One event subscription owned by a sorter.
pub(crate) struct SorterHandle {
    key: TypeKey,
    channel: EventChannel,
    handle: CallbackHandle,
}

/// World-owned state maintaining one collection's invariant.
///
/// `positive` is the sorted, deduplicated union of collected and included
/// keys; `negative` the sorted excluded keys. The signed pair is the
/// collection's constraint set, used for conflict and nesting decisions.
#[derive(Default)]
pub(crate) struct Sorter {
    collected: Vec<TypeKey>,
    positive: Vec<TypeKey>,
    negative: Vec<TypeKey>,
    /// Collected prefix length.
    len: usize,
    /// Accepted-entity set of the degenerate (no collected types) form.
    owned: Option<EntitySet>,
    handles: Vec<SorterHandle>,
}

impl Sorter {
    pub(crate) fn references(&self, key: TypeKey) -> bool {
        self.positive.contains(&key) || self.negative.contains(&key)
    }

    fn matches(&self, collected: &[TypeKey], positive: &[TypeKey], negative: &[TypeKey]) -> bool {
        let mut mine = self.collected.clone();
        mine.sort_unstable();
        let mut theirs = collected.to_vec();
        theirs.sort_unstable();
        mine == theirs && self.positive == positive && self.negative == negative
    }
}

/// `a ⊆ b` over sorted key slices.
fn is_subset(a: &[TypeKey], b: &[TypeKey]) -> bool {
    a.iter().all(|key| b.binary_search(key).is_ok())
}

fn overlaps(a: &[TypeKey], b: &[TypeKey]) -> bool {
    a.iter().any(|key| b.contains(key))
}

/// `a`'s signed constraint set is contained in `b`'s (`b` is at least as
/// restrictive).
fn constraint_subset(a: &Sorter, b: &Sorter) -> bool {
    is_subset(&a.positive, &b.positive) && is_subset(&a.negative, &b.negative)
}

impl World {
    /// Returns `true` if any existing collection collects one of the types
    /// in `L`.
    pub fn is_collected<L: TypeList>(&self) -> bool {
        let keys = L::keys(&self.registry);
        self.sorters
            .iter()
            .any(|sorter| keys.iter().flatten().any(|key| sorter.collected.contains(key)))
    }

    /// Finds a sorter with the same signed constraint sets, or creates and
    /// initializes a new one.
    pub(crate) fn get_or_create_sorter(
        &mut self,
        collected: Vec<TypeKey>,
        included: Vec<TypeKey>,
        excluded: Vec<TypeKey>,
    ) -> CollectionResult<usize> {
        let mut positive: Vec<TypeKey> =
            collected.iter().chain(included.iter()).copied().collect();
        positive.sort_unstable();
        positive.dedup();
        let mut negative = excluded;
        negative.sort_unstable();
        negative.dedup();
        debug_assert!(
            !positive.is_empty(),
            "a collection needs at least one collected or included type"
        );
        debug_assert!(
            positive.iter().all(|key| !negative.contains(key)),
            "a type cannot be both required and excluded by one collection"
        );

        if let Some(index) = self
            .sorters
            .iter()
            .position(|sorter| sorter.matches(&collected, &positive, &negative))
        {
            return Ok(index);
        }

        for &key in &collected {
            if self
                .erased(key)
                .is_some_and(|set| set.discipline() == StorageDiscipline::Fixed)
            {
                return Err(CollectionError::FixedStorage {
                    type_name: self.type_name_of(key),
                });
            }
        }

        for sorter in &self.sorters {
            if !overlaps(&sorter.collected, &collected) {
                continue;
            }
            let candidate = Sorter {
                collected: collected.clone(),
                positive: positive.clone(),
                negative: negative.clone(),
                ..Sorter::default()
            };
            if !constraint_subset(&candidate, sorter) && !constraint_subset(sorter, &candidate) {
                let shared = collected
                    .iter()
                    .find(|key| sorter.collected.contains(key))
                    .copied()
                    .expect("overlap implies a shared collected key");
                return Err(CollectionError::Conflict {
                    type_name: self.type_name_of(shared),
                });
            }
        }

        let index = self.sorters.len();
        self.sorters.push(Sorter {
            collected,
            positive,
            negative,
            len: 0,
            owned: None,
            handles: Vec::new(),
        });
        self.wire_sorter(index);
        self.sorter_rebuild(index);
        debug!(
            "created collection sorter #{index} with {} grouped entities",
            self.sorters[index].len
        );
        Ok(index)
    }

    fn type_name_of(&self, key: TypeKey) -> &'static str {
        self.registry
            .describe(key)
            .map(|desc| desc.name)
            .unwrap_or("<unregistered type>")
    }

    /// Subscribes the maintenance handlers of a freshly pushed sorter.
    fn wire_sorter(&mut self, index: usize) {
        let positive = self.sorters[index].positive.clone();
        let negative = self.sorters[index].negative.clone();
        for key in positive {
            self.subscribe_sorter_handler(index, key, EventChannel::Created, HandlerKind::Create);
            self.subscribe_sorter_handler(index, key, EventChannel::Removed, HandlerKind::Remove);
        }
        for key in negative {
            self.subscribe_sorter_handler(index, key, EventChannel::Created, HandlerKind::Remove);
            self.subscribe_sorter_handler(index, key, EventChannel::Removed, HandlerKind::Create);
        }
    }

    fn subscribe_sorter_handler(
        &mut self,
        index: usize,
        key: TypeKey,
        channel: EventChannel,
        kind: HandlerKind,
    ) {
        let anchor = self.find_sorter_anchor(index, key, channel, kind);
        let exempt = (kind == HandlerKind::Create
            && self.sorters[index].negative.contains(&key))
        .then_some(key);
        let callback: EventCallback = match kind {
            HandlerKind::Create => {
                Box::new(move |world: &mut World, entity| world.sorter_created(index, entity, exempt))
            }
            HandlerKind::Remove => {
                Box::new(move |world: &mut World, entity| world.sorter_removed(index, entity))
            }
        };
        let entry = self.storages[key.index()]
            .as_mut()
            .expect("collection types must have storages");
        let list = entry.events.channel_mut(channel);
        let handle = match anchor {
            Some(anchor) => list.subscribe_before(&mut self.next_callback, anchor, callback),
            None => list.subscribe(&mut self.next_callback, callback),
        };
        self.sorters[index].handles.push(SorterHandle { key, channel, handle });
    }

    /// Locates the handler the new subscription must precede so nested
    /// collections update in restrictiveness order: grow handlers run
    /// least-restrictive first, shrink handlers most-restrictive first.
    fn find_sorter_anchor(
        &self,
        index: usize,
        key: TypeKey,
        channel: EventChannel,
        kind: HandlerKind,
    ) -> Option<CallbackHandle> {
        let new = &self.sorters[index];
        let list = self
            .storages
            .get(key.index())
            .and_then(|entry| entry.as_ref())
            .map(|entry| entry.events.channel(channel))?;
        let mut best: Option<(usize, CallbackHandle)> = None;
        for (other_index, other) in self.sorters.iter().enumerate() {
            if other_index == index || !overlaps(&other.collected, &new.collected) {
                continue;
            }
            let qualifies = match kind {
                HandlerKind::Create => constraint_subset(new, other),
                HandlerKind::Remove => constraint_subset(other, new),
            };
            if !qualifies {
                continue;
            }
            for handle in &other.handles {
                if handle.key != key || handle.channel != channel {
                    continue;
                }
                if let Some(position) = list.position_of(handle.handle) {
                    if best.map_or(true, |(earliest, _)| position < earliest) {
                        best = Some((position, handle.handle));
                    }
                }
            }
        }
        best.map(|(_, handle)| handle)
    }

    fn sorter_predicate(&self, sorter: &Sorter, entity: Entity, exempt: Option<TypeKey>) -> bool {
        sorter.positive.iter().all(|&key| {
            self.erased(key)
                .is_some_and(|set| set.contains(entity))
        }) && !sorter.negative.iter().any(|&key| {
            Some(key) != exempt
                && self
                    .erased(key)
                    .is_some_and(|set| set.contains(entity))
        })
    }

    /// Grow handler: if `entity` now matches and sits outside the prefix,
    /// swap it to the boundary of every collected storage and extend the
    /// prefix. `exempt` names an excluded type whose removal is mid-flight
    /// and must not count as presence.
    pub(crate) fn sorter_created(&mut self, index: usize, entity: Entity, exempt: Option<TypeKey>) {
        let mut sorter = std::mem::take(&mut self.sorters[index]);
        if self.sorter_predicate(&sorter, entity, exempt) {
            if sorter.collected.is_empty() {
                let owned = sorter.owned.get_or_insert_with(EntitySet::new);
                if !owned.contains(entity) {
                    owned.insert(entity);
                }
            } else {
                let first = self
                    .erased(sorter.collected[0])
                    .expect("collected storage must exist");
                if first.offset(entity) >= sorter.len {
                    let boundary = sorter.len;
                    for &key in &sorter.collected {
                        let set = self.erased_mut(key).expect("collected storage must exist");
                        let from = set.offset(entity);
                        set.swap_positions(from, boundary);
                    }
                    sorter.len += 1;
                }
            }
        }
        self.sorters[index] = sorter;
    }

    /// Shrink handler: if `entity` is inside the prefix, swap it to the new
    /// boundary of every collected storage and shorten the prefix.
    pub(crate) fn sorter_removed(&mut self, index: usize, entity: Entity) {
        let mut sorter = std::mem::take(&mut self.sorters[index]);
        if sorter.collected.is_empty() {
            if let Some(owned) = sorter.owned.as_mut() {
                if owned.contains(entity) {
                    owned.erase(entity);
                }
            }
        } else if self
            .erased(sorter.collected[0])
            .is_some_and(|set| set.contains(entity))
        {
            let position = self
                .erased(sorter.collected[0])
                .expect("collected storage must exist")
                .offset(entity);
            if position < sorter.len {
                sorter.len -= 1;
                let boundary = sorter.len;
                for &key in &sorter.collected {
                    let set = self.erased_mut(key).expect("collected storage must exist");
                    let from = set.offset(entity);
                    set.swap_positions(from, boundary);
                }
            }
        }
        self.sorters[index] = sorter;
    }

    /// Rebuilds a sorter from scratch by scanning its seed storage. Used at
    /// creation and after bulk storage clears.
    pub(crate) fn sorter_rebuild(&mut self, index: usize) {
        let mut sorter = std::mem::take(&mut self.sorters[index]);
        sorter.len = 0;
        if sorter.collected.is_empty() {
            let mut owned = sorter.owned.take().unwrap_or_default();
            owned.clear();
            if let Some(&seed) = sorter.positive.first() {
                let slots = self.erased(seed).map_or(0, |set| set.entity_set().len());
                for position in 0..slots {
                    let entity = match self.erased(seed) {
                        Some(set) => set.entity_set().at(position),
                        None => break,
                    };
                    if entity.is_tombstone() {
                        continue;
                    }
                    if self.sorter_predicate(&sorter, entity, None) {
                        owned.insert(entity);
                    }
                }
            }
            sorter.owned = Some(owned);
        } else {
            let seed = sorter.collected[0];
            let slots = self.erased(seed).map_or(0, |set| set.entity_set().len());
            for position in 0..slots {
                let entity = match self.erased(seed) {
                    Some(set) => set.entity_set().at(position),
                    None => break,
                };
                if entity.is_tombstone() {
                    continue;
                }
                if self.sorter_predicate(&sorter, entity, None) {
                    let boundary = sorter.len;
                    for &key in &sorter.collected {
                        let set = self.erased_mut(key).expect("collected storage must exist");
                        let from = set.offset(entity);
                        set.swap_positions(from, boundary);
                    }
                    sorter.len += 1;
                }
            }
        }
        self.sorters[index] = sorter;
    }

    pub(crate) fn sorter_len(&self, index: usize) -> usize {
        self.sorters[index].len
    }

    pub(crate) fn sorter_owned(&self, index: usize) -> &EntitySet {
        self.sorters[index]
            .owned
            .as_ref()
            .expect("an entity collection sorter owns its accepted set")
    }
}

/// Read handle over a collection's grouped prefix.
///
/// `C` is the tuple of collected component types (their references are
/// yielded during iteration), `O` an optional-lookup tuple. The handle
/// borrows the world immutably, so the prefix cannot move while it exists.
pub struct Collection<'w, C: Include<'w>, O: Optional<'w> = ()> {
    first: &'w EntitySet,
    len: usize,
    collected: C::Fetch,
    optional: O::Fetch,
}

impl<'w, C: Include<'w>, O: Optional<'w>> Collection<'w, C, O> {
    pub(crate) fn new(world: &'w World, index: usize) -> Self {
        let collected = C::fetch(world);
        Self {
            first: C::first(collected),
            len: world.sorter_len(index),
            collected,
            optional: O::fetch(world),
        }
    }

    /// Number of grouped entities.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no entity matches the collection predicate.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns `true` if `entity` is inside the grouped prefix.
    pub fn contains(&self, entity: Entity) -> bool {
        self.first.contains(entity) && self.first.offset(entity) < self.len
    }

    /// The grouped entities, in prefix order.
    pub fn entities(&self) -> &'w [Entity] {
        &self.first.entities()[..self.len]
    }

    /// Iterates the grouped entities in prefix order.
    pub fn iter(&self) -> impl Iterator<Item = Entity> + 'w {
        self.entities().iter().copied()
    }

    /// Collected component references for `entity`. Precondition: grouped.
    pub fn get(&self, entity: Entity) -> C::Item {
        debug_assert!(self.contains(entity), "collection get of ungrouped {entity}");
        C::get(self.collected, entity)
    }

    /// Collected component references, or `None` if `entity` is not
    /// grouped.
    pub fn try_get(&self, entity: Entity) -> Option<C::Item> {
        if self.contains(entity) {
            Some(C::get(self.collected, entity))
        } else {
            None
        }
    }

    /// Optional component references for `entity`.
    pub fn get_optional(&self, entity: Entity) -> O::Item {
        O::get(self.optional, entity)
    }

    /// Applies `f` to every grouped entity with its collected and optional
    /// component references.
    pub fn for_each(&self, mut f: impl FnMut(Entity, C::Item, O::Item)) {
        for entity in self.iter() {
            f(
                entity,
                C::get(self.collected, entity),
                O::get(self.optional, entity),
            );
        }
    }

    /// Like [`for_each`](Self::for_each); returning `false` from `f`
    /// terminates the iteration early.
    pub fn for_each_while(&self, mut f: impl FnMut(Entity, C::Item, O::Item) -> bool) {
        for entity in self.iter() {
            if !f(
                entity,
                C::get(self.collected, entity),
                O::get(self.optional, entity),
            ) {
                break;
            }
        }
    }
}

/// Read handle over the degenerate collection form that groups entities
/// without reordering any storage.
pub struct EntityCollection<'w> {
    set: &'w EntitySet,
}

impl<'w> EntityCollection<'w> {
    pub(crate) fn new(world: &'w World, index: usize) -> Self {
        Self {
            set: world.sorter_owned(index),
        }
    }

    /// Number of accepted entities.
    #[inline]
    pub fn len(&self) -> usize {
        self.set.len()
    }

    /// Returns `true` if no entity matches the predicate.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Returns `true` if `entity` is accepted.
    pub fn contains(&self, entity: Entity) -> bool {
        self.set.contains(entity)
    }

    /// The accepted entities.
    pub fn entities(&self) -> &'w [Entity] {
        self.set.entities()
    }

    /// Iterates the accepted entities.
    pub fn iter(&self) -> impl Iterator<Item = Entity> + 'w {
        self.set.iter()
    }
}
