//! # Component Storage
//!
//! Packed per-type component storage: an [`EntitySet`] plus a value vector
//! kept in dense lockstep, so iterating a component type touches contiguous
//! memory.
//!
//! ## Disciplines
//! A storage is created with one of two disciplines:
//!
//! - **Compact** (default) — erase swaps the last entry into the vacated
//!   slot; the dense array never has gaps, and the storage supports
//!   reordering (`sort_*`, `swap_positions`).
//! - **Fixed** — entries never move once placed: erase leaves a *hole*,
//!   emplace prefers reusing holes, and reordering is a precondition
//!   violation. [`ComponentSet::pack`] compacts accumulated holes.
//!
//! A hole keeps its dead value until the slot is reused or packed; observers
//! of a removal therefore see the value for the whole removal event, and the
//! value's `Drop` runs when the slot is recycled rather than at erase time.
//!
//! ## Events
//! Component sets are pure containers. Lifecycle events (`on_create`,
//! `on_update`, `on_remove`) are dispatched by the [`World`] that owns the
//! storage, around the world-level operations; structural edits made
//! directly on a set obtained from the world bypass them.

use std::any::Any;
use std::cmp::Ordering;

use crate::engine::entity::{EntitySet, DEFAULT_PAGE_SIZE};
use crate::engine::types::Entity;

/// Marker for types usable as components. Blanket-implemented for every
/// `Send + Sync + 'static` type; components are concrete value types.
pub trait Component: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Component for T {}

/// Placement discipline of a component storage.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum StorageDiscipline {
    /// Swap-and-pop erase; dense array stays gapless; sorting allowed.
    #[default]
    Compact,
    /// Entries never move: erase leaves holes, emplace reuses them,
    /// sorting and swapping are precondition violations.
    Fixed,
}

/// Options recognized when a storage is created.
#[derive(Clone, Copy, Debug)]
pub struct StorageOptions {
    /// Placement discipline.
    pub discipline: StorageDiscipline,
    /// Initial dense capacity to reserve.
    pub initial_capacity: usize,
    /// Sparse page size; must be a power of two.
    pub sparse_page_size: usize,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            discipline: StorageDiscipline::Compact,
            initial_capacity: 0,
            sparse_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Outcome of a fallible emplace.
pub enum EmplaceResult<'a, T> {
    /// The component was absent and has been inserted.
    Inserted(&'a mut T),
    /// The component was already present; nothing was inserted.
    AlreadyPresent {
        /// The component that is already attached to the entity.
        existing: &'a mut T,
        /// The value that was offered and not consumed.
        rejected: T,
    },
}

/// Packed storage associating entities with values of one component type.
///
/// ## Invariants
/// - `values` parallels the entity set's dense array: the component for the
///   entity at dense position `p` is `values[p]`.
/// - Only fixed-discipline storages ever contain holes, and every hole's
///   position is recorded in `holes`.
pub struct ComponentSet<T> {
    entities: EntitySet,
    values: Vec<T>,
    holes: Vec<u32>,
    discipline: StorageDiscipline,
}

impl<T: Component> Default for ComponentSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Component> ComponentSet<T> {
    /// Creates an empty compact storage.
    pub fn new() -> Self {
        Self::with_options(StorageOptions::default())
    }

    /// Creates an empty storage with explicit options.
    ///
    /// ## Panics
    /// Panics if the sparse page size is not a power of two.
    pub fn with_options(options: StorageOptions) -> Self {
        let mut entities = EntitySet::with_page_size(options.sparse_page_size);
        entities.reserve(options.initial_capacity);
        let mut values = Vec::new();
        values.reserve(options.initial_capacity);
        Self {
            entities,
            values,
            holes: Vec::new(),
            discipline: options.discipline,
        }
    }

    /// Returns the storage discipline.
    #[inline]
    pub fn discipline(&self) -> StorageDiscipline {
        self.discipline
    }

    /// Number of live components (holes excluded).
    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len() - self.holes.len()
    }

    /// Returns `true` if no live components are stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if `entity` has a component here.
    #[inline]
    pub fn contains(&self, entity: Entity) -> bool {
        self.entities.contains(entity)
    }

    /// Dense position of `entity`'s component. Precondition: contained.
    #[inline]
    pub fn offset(&self, entity: Entity) -> usize {
        self.entities.offset(entity)
    }

    /// Returns the underlying entity set.
    #[inline]
    pub fn entities(&self) -> &EntitySet {
        &self.entities
    }

    /// Returns the dense value slice. Positions holding holes (fixed
    /// discipline only) contain dead values.
    #[inline]
    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Reserves capacity for at least `additional` more components.
    pub fn reserve(&mut self, additional: usize) {
        self.entities.reserve(additional);
        self.values.reserve(additional);
    }

    /// Attaches a component to `entity`, reusing a hole slot on fixed
    /// storages. Precondition: `entity` is absent and not a tombstone.
    pub fn emplace(&mut self, entity: Entity, value: T) -> &mut T {
        debug_assert!(!self.contains(entity), "emplace of already-present {entity}");
        if self.discipline == StorageDiscipline::Fixed {
            if let Some(position) = self.holes.pop() {
                let position = position as usize;
                self.entities.install_at(position, entity);
                self.values[position] = value;
                return &mut self.values[position];
            }
        }
        self.entities.insert(entity);
        self.values.push(value);
        let last = self.values.len() - 1;
        &mut self.values[last]
    }

    /// Attaches a component to `entity`, always appending to the tail and
    /// never reusing a hole. Precondition: `entity` is absent.
    pub fn emplace_back(&mut self, entity: Entity, value: T) -> &mut T {
        debug_assert!(!self.contains(entity), "emplace of already-present {entity}");
        self.entities.insert(entity);
        self.values.push(value);
        let last = self.values.len() - 1;
        &mut self.values[last]
    }

    /// Replaces the component of `entity` in place. Precondition: contained.
    pub fn replace(&mut self, entity: Entity, value: T) -> &mut T {
        let position = self.offset(entity);
        self.values[position] = value;
        &mut self.values[position]
    }

    /// Emplaces the component if absent, replaces it otherwise.
    pub fn emplace_or_replace(&mut self, entity: Entity, value: T) -> &mut T {
        if self.contains(entity) {
            self.replace(entity, value)
        } else {
            self.emplace(entity, value)
        }
    }

    /// Fallible emplace: reports whether the entity already had the
    /// component instead of treating it as a precondition violation.
    pub fn try_emplace(&mut self, entity: Entity, value: T) -> EmplaceResult<'_, T> {
        if self.contains(entity) {
            let position = self.offset(entity);
            EmplaceResult::AlreadyPresent {
                existing: &mut self.values[position],
                rejected: value,
            }
        } else {
            EmplaceResult::Inserted(self.emplace(entity, value))
        }
    }

    /// Detaches the component of `entity`. Precondition: contained.
    ///
    /// Compact storages swap the last entry into the vacated slot; fixed
    /// storages leave a hole whose dead value lingers until reuse or
    /// [`pack`](Self::pack).
    pub fn erase(&mut self, entity: Entity) {
        let position = self.offset(entity);
        match self.discipline {
            StorageDiscipline::Compact => {
                self.entities.erase(entity);
                self.values.swap_remove(position);
            }
            StorageDiscipline::Fixed => {
                self.entities.detach(position);
                self.holes.push(position as u32);
            }
        }
    }

    /// Returns the component of `entity`. Precondition: contained.
    #[inline]
    pub fn get(&self, entity: Entity) -> &T {
        &self.values[self.offset(entity)]
    }

    /// Mutable form of [`get`](Self::get). Precondition: contained.
    #[inline]
    pub fn get_mut(&mut self, entity: Entity) -> &mut T {
        let position = self.offset(entity);
        &mut self.values[position]
    }

    /// Returns the component of `entity`, or `None` if absent.
    #[inline]
    pub fn try_get(&self, entity: Entity) -> Option<&T> {
        if self.contains(entity) {
            Some(&self.values[self.entities.offset(entity)])
        } else {
            None
        }
    }

    /// Mutable form of [`try_get`](Self::try_get).
    #[inline]
    pub fn try_get_mut(&mut self, entity: Entity) -> Option<&mut T> {
        if self.contains(entity) {
            let position = self.entities.offset(entity);
            Some(&mut self.values[position])
        } else {
            None
        }
    }

    /// Exchanges two dense positions. Precondition: not a fixed storage.
    pub fn swap_positions(&mut self, a: usize, b: usize) {
        debug_assert!(
            self.discipline != StorageDiscipline::Fixed,
            "fixed storages cannot be reordered"
        );
        self.entities.swap_positions(a, b);
        self.values.swap(a, b);
    }

    /// Reorders the storage so the contained entities of `keys` come first,
    /// in key order, with values moved in lockstep. Precondition: not a
    /// fixed storage.
    pub fn sort_by_keys<I>(&mut self, keys: I)
    where
        I: IntoIterator<Item = Entity>,
    {
        debug_assert!(
            self.discipline != StorageDiscipline::Fixed,
            "fixed storages cannot be sorted"
        );
        let order = self.entities.key_order(keys);
        apply_order_to_values(&mut self.values, &order);
        self.entities.apply_order(&order);
    }

    /// Sorts the storage by a component comparator, entities moved in
    /// lockstep. Precondition: not a fixed storage.
    pub fn sort_unstable_by(&mut self, mut compare: impl FnMut(&T, &T) -> Ordering) {
        debug_assert!(
            self.discipline != StorageDiscipline::Fixed,
            "fixed storages cannot be sorted"
        );
        let order = self
            .entities
            .position_order(|a, b| compare(&self.values[a], &self.values[b]));
        apply_order_to_values(&mut self.values, &order);
        self.entities.apply_order(&order);
    }

    /// Compacts the holes of a fixed storage, preserving the relative order
    /// of live entries. Fires no events.
    pub fn pack(&mut self) {
        if self.holes.is_empty() {
            return;
        }
        let slots = self.entities.len();
        let mut write = 0usize;
        for read in 0..slots {
            if self.entities.at(read).is_tombstone() {
                continue;
            }
            if read != write {
                self.entities.move_dense(read, write);
                self.values.swap(read, write);
            }
            write += 1;
        }
        self.entities.truncate(write);
        self.values.truncate(write);
        self.holes.clear();
    }

    /// Empties the storage. Sparse pages and reserved capacity survive.
    pub fn clear(&mut self) {
        self.entities.clear();
        self.values.clear();
        self.holes.clear();
    }

    /// Iterates `(entity, &component)` pairs in dense order, skipping holes.
    pub fn iter(&self) -> impl Iterator<Item = (Entity, &T)> {
        self.entities
            .entities()
            .iter()
            .zip(self.values.iter())
            .filter(|(entity, _)| !entity.is_tombstone())
            .map(|(entity, value)| (*entity, value))
    }

    /// Mutable form of [`iter`](Self::iter).
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Entity, &mut T)> {
        self.entities
            .entities()
            .iter()
            .zip(self.values.iter_mut())
            .filter(|(entity, _)| !entity.is_tombstone())
            .map(|(entity, value)| (*entity, value))
    }
}

/// Applies a sort permutation (`order[i]` = old position of the entry that
/// ends up at `i`) to `values` in place by walking its cycles.
fn apply_order_to_values<T>(values: &mut [T], order: &[u32]) {
    debug_assert_eq!(values.len(), order.len());
    let mut visited = vec![false; order.len()];
    for start in 0..order.len() {
        if visited[start] {
            continue;
        }
        let mut current = start;
        loop {
            visited[current] = true;
            let from = order[current] as usize;
            if from == start {
                break;
            }
            values.swap(current, from);
            current = from;
        }
    }
}

/// Type-erased surface of a [`ComponentSet`], used by the world's storage
/// table and the collection sorters.
pub trait AnyComponentSet: Any + Send + Sync {
    /// Live component count.
    fn len(&self) -> usize;
    /// Returns `true` if no live components are stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Membership test.
    fn contains(&self, entity: Entity) -> bool;
    /// Dense position of `entity`. Precondition: contained.
    fn offset(&self, entity: Entity) -> usize;
    /// Underlying entity set.
    fn entity_set(&self) -> &EntitySet;
    /// Storage discipline.
    fn discipline(&self) -> StorageDiscipline;
    /// Exchanges two dense positions. Precondition: not fixed.
    fn swap_positions(&mut self, a: usize, b: usize);
    /// Detaches `entity` without firing events. Precondition: contained.
    fn erase(&mut self, entity: Entity);
    /// Empties the storage, keeping identity and capacity.
    fn clear(&mut self);
    /// Upcast for typed downcasting.
    fn as_any(&self) -> &dyn Any;
    /// Mutable upcast for typed downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Component> AnyComponentSet for ComponentSet<T> {
    fn len(&self) -> usize {
        ComponentSet::len(self)
    }

    fn contains(&self, entity: Entity) -> bool {
        ComponentSet::contains(self, entity)
    }

    fn offset(&self, entity: Entity) -> usize {
        ComponentSet::offset(self, entity)
    }

    fn entity_set(&self) -> &EntitySet {
        self.entities()
    }

    fn discipline(&self) -> StorageDiscipline {
        ComponentSet::discipline(self)
    }

    fn swap_positions(&mut self, a: usize, b: usize) {
        ComponentSet::swap_positions(self, a, b);
    }

    fn erase(&mut self, entity: Entity) {
        ComponentSet::erase(self, entity);
    }

    fn clear(&mut self) {
        ComponentSet::clear(self);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Rebindable reference to one entity's component in some storage.
///
/// A `ComponentPtr` remembers which entity it points at and can be re-aimed
/// at a different storage of the same component type with
/// [`reset`](Self::reset); dereferencing yields `None` whenever the current
/// storage does not contain the entity.
pub struct ComponentPtr<'a, T: Component> {
    entity: Entity,
    set: Option<&'a ComponentSet<T>>,
}

impl<'a, T: Component> ComponentPtr<'a, T> {
    /// Creates a pointer to `entity`'s component in `set`.
    pub fn new(entity: Entity, set: &'a ComponentSet<T>) -> Self {
        Self { entity, set: Some(set) }
    }

    /// Creates a pointer bound to no storage.
    pub fn unbound(entity: Entity) -> Self {
        Self { entity, set: None }
    }

    /// The entity this pointer refers to.
    #[inline]
    pub fn entity(&self) -> Entity {
        self.entity
    }

    /// Returns `true` if the bound storage currently contains the entity.
    pub fn is_valid(&self) -> bool {
        self.set.is_some_and(|set| set.contains(self.entity))
    }

    /// Returns the pointed-at component, if any.
    pub fn get(&self) -> Option<&'a T> {
        self.set.and_then(|set| set.try_get(self.entity))
    }

    /// Rebinds the pointer to another storage, returning the previous one.
    pub fn reset(&mut self, set: &'a ComponentSet<T>) -> Option<&'a ComponentSet<T>> {
        self.set.replace(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::IndexId;

    fn e(index: IndexId) -> Entity {
        Entity::from_index(index)
    }

    #[test]
    fn emplace_erase_swap_and_pop() {
        let mut set = ComponentSet::<i32>::new();
        set.emplace(e(0), 10);
        set.emplace(e(1), 20);
        set.emplace(e(2), 30);

        assert_eq!(set.entities().entities(), &[e(0), e(1), e(2)]);
        assert_eq!(set.values(), &[10, 20, 30]);

        set.erase(e(1));
        assert_eq!(set.entities().entities(), &[e(0), e(2)]);
        assert_eq!(set.values(), &[10, 30]);
        assert_eq!(*set.get(e(0)), 10);
        assert_eq!(*set.get(e(2)), 30);
    }

    #[test]
    fn sort_by_keys_moves_values_in_lockstep() {
        let mut set = ComponentSet::<i32>::new();
        set.emplace(e(0), 10);
        set.emplace(e(1), 20);
        set.emplace(e(2), 30);
        set.erase(e(1));
        set.emplace(e(1), 20);

        // Dense is now [e0, e2, e1] / [10, 30, 20].
        set.sort_by_keys([e(1), e(0)]);
        assert_eq!(set.entities().entities(), &[e(1), e(0), e(2)]);
        assert_eq!(set.values(), &[20, 10, 30]);
        for index in 0..3 {
            assert_eq!(*set.get(e(index)), (index as i32 + 1) * 10);
        }
    }

    #[test]
    fn comparator_sort_moves_entities_in_lockstep() {
        let mut set = ComponentSet::<i32>::new();
        set.emplace(e(0), 3);
        set.emplace(e(1), 1);
        set.emplace(e(2), 2);

        set.sort_unstable_by(|a, b| a.cmp(b));
        assert_eq!(set.values(), &[1, 2, 3]);
        assert_eq!(set.entities().entities(), &[e(1), e(2), e(0)]);
        assert_eq!(*set.get(e(0)), 3);
    }

    #[test]
    fn fixed_discipline_reuses_holes() {
        let mut set = ComponentSet::<i32>::with_options(StorageOptions {
            discipline: StorageDiscipline::Fixed,
            ..StorageOptions::default()
        });
        set.emplace(e(0), 1);
        set.emplace(e(1), 2);
        set.emplace(e(2), 3);

        set.erase(e(1));
        assert_eq!(set.len(), 2);
        assert!(set.entities().at(1).is_tombstone());
        // e0 and e2 keep their dense positions.
        assert_eq!(set.offset(e(0)), 0);
        assert_eq!(set.offset(e(2)), 2);

        // The hole is reused before the tail.
        set.emplace(e(3), 4);
        assert_eq!(set.offset(e(3)), 1);
        assert_eq!(*set.get(e(3)), 4);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn emplace_back_skips_holes() {
        let mut set = ComponentSet::<i32>::with_options(StorageOptions {
            discipline: StorageDiscipline::Fixed,
            ..StorageOptions::default()
        });
        set.emplace(e(0), 1);
        set.emplace(e(1), 2);
        set.erase(e(0));

        set.emplace_back(e(2), 3);
        assert_eq!(set.offset(e(2)), 2);
        assert!(set.entities().at(0).is_tombstone());
    }

    #[test]
    fn pack_compacts_holes_preserving_order() {
        let mut set = ComponentSet::<i32>::with_options(StorageOptions {
            discipline: StorageDiscipline::Fixed,
            ..StorageOptions::default()
        });
        for index in 0..5 {
            set.emplace(e(index), index as i32);
        }
        set.erase(e(1));
        set.erase(e(3));

        set.pack();
        assert_eq!(set.len(), 3);
        assert_eq!(set.entities().entities(), &[e(0), e(2), e(4)]);
        assert_eq!(&set.values()[..3], &[0, 2, 4]);
        for &index in &[0u32, 2, 4] {
            assert_eq!(*set.get(e(index)), index as i32);
        }
    }

    #[test]
    fn try_emplace_reports_duplicates() {
        let mut set = ComponentSet::<i32>::new();
        set.emplace(e(0), 1);

        match set.try_emplace(e(0), 9) {
            EmplaceResult::AlreadyPresent { existing, rejected } => {
                assert_eq!(*existing, 1);
                assert_eq!(rejected, 9);
            }
            EmplaceResult::Inserted(_) => panic!("duplicate emplace must not insert"),
        }
        match set.try_emplace(e(1), 2) {
            EmplaceResult::Inserted(value) => assert_eq!(*value, 2),
            EmplaceResult::AlreadyPresent { .. } => panic!("fresh emplace must insert"),
        }
    }

    #[test]
    fn component_ptr_rebinds() {
        let mut a = ComponentSet::<i32>::new();
        let mut b = ComponentSet::<i32>::new();
        a.emplace(e(0), 1);
        b.emplace(e(0), 10);

        let mut ptr = ComponentPtr::new(e(0), &a);
        assert!(ptr.is_valid());
        assert_eq!(ptr.get(), Some(&1));

        let previous = ptr.reset(&b);
        assert!(previous.is_some());
        assert_eq!(ptr.get(), Some(&10));
    }
}
