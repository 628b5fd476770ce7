//! # Entity Sets
//!
//! Sparse-dense sets of entities, the structural primitive underneath every
//! component storage.
//!
//! ## Layout
//! An [`EntitySet`] is a pair of arrays:
//!
//! - **Dense** — a contiguous vector of entity handles in insertion (or
//!   currently sorted) order.
//! - **Sparse** — a paged mapping from entity *index* to dense position,
//!   with pages allocated lazily the first time an index in their range is
//!   inserted.
//!
//! ## Invariants
//! - For every dense position `p` holding a live entry `e`,
//!   `sparse[e.index()] == p`.
//! - Membership requires generation equality: a stale handle whose
//!   generation differs from the stored one is not contained.
//! - Dense order is meaningful only to consumers that rely on it (view main
//!   sets and collection prefixes); `erase` is free to reorder via
//!   swap-and-pop.
//!
//! Fixed-discipline component storages leave *holes* (tombstone entries) in
//! the dense array instead of swapping; the hole-management entry points
//! ([`EntitySet::install_at`], [`EntitySet::detach`]) exist for that use and
//! are no-ops for the common compact discipline.

use std::cmp::Ordering;

use crate::engine::types::{Entity, IndexId};

/// Sentinel marking an empty sparse slot.
const NO_SLOT: u32 = u32::MAX;

/// Default number of entries per sparse page.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Paged index → dense-position map.
///
/// Pages are allocated on demand and retained across [`clear`](SparseIndex::reset)
/// so a refilled set does not re-pay allocation costs.
struct SparseIndex {
    pages: Vec<Option<Box<[u32]>>>,
    page_size: usize,
    shift: u32,
}

impl SparseIndex {
    fn new(page_size: usize) -> Self {
        assert!(
            page_size.is_power_of_two(),
            "sparse page size must be a power of two, got {page_size}"
        );
        Self {
            pages: Vec::new(),
            page_size,
            shift: page_size.trailing_zeros(),
        }
    }

    #[inline]
    fn split(&self, index: IndexId) -> (usize, usize) {
        let index = index as usize;
        (index >> self.shift, index & (self.page_size - 1))
    }

    #[inline]
    fn get(&self, index: IndexId) -> u32 {
        let (page, offset) = self.split(index);
        match self.pages.get(page) {
            Some(Some(page)) => page[offset],
            _ => NO_SLOT,
        }
    }

    fn set(&mut self, index: IndexId, position: u32) {
        let (page, offset) = self.split(index);
        if page >= self.pages.len() {
            self.pages.resize_with(page + 1, || None);
        }
        let page = self.pages[page]
            .get_or_insert_with(|| vec![NO_SLOT; self.page_size].into_boxed_slice());
        page[offset] = position;
    }

    fn clear_slot(&mut self, index: IndexId) {
        let (page, offset) = self.split(index);
        if let Some(Some(page)) = self.pages.get_mut(page) {
            page[offset] = NO_SLOT;
        }
    }

    /// Empties every allocated page without releasing the allocations.
    fn reset(&mut self) {
        for page in self.pages.iter_mut().flatten() {
            page.fill(NO_SLOT);
        }
    }
}

/// Sparse-dense set of entities with stable O(1) membership and offsets.
pub struct EntitySet {
    dense: Vec<Entity>,
    sparse: SparseIndex,
}

impl Default for EntitySet {
    fn default() -> Self {
        Self::new()
    }
}

impl EntitySet {
    /// Creates an empty set with the default sparse page size.
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Creates an empty set with the given sparse page size.
    ///
    /// ## Panics
    /// Panics if `page_size` is not a power of two.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            dense: Vec::new(),
            sparse: SparseIndex::new(page_size),
        }
    }

    /// Returns `true` if the set contains `entity`.
    ///
    /// Membership requires generation equality: a recycled handle with a
    /// stale generation is reported as absent.
    #[inline]
    pub fn contains(&self, entity: Entity) -> bool {
        let position = self.sparse.get(entity.index());
        position != NO_SLOT && self.dense[position as usize] == entity
    }

    /// Returns the dense position of `entity`.
    ///
    /// Calling this for an entity that is not contained is a precondition
    /// violation.
    #[inline]
    pub fn offset(&self, entity: Entity) -> usize {
        debug_assert!(self.contains(entity), "offset of absent entity {entity}");
        self.sparse.get(entity.index()) as usize
    }

    /// Appends `entity` to the dense array.
    ///
    /// Inserting a tombstone or an already-contained entity is a
    /// precondition violation.
    pub fn insert(&mut self, entity: Entity) {
        debug_assert!(!entity.is_tombstone(), "cannot insert the tombstone entity");
        debug_assert!(!self.contains(entity), "duplicate insert of {entity}");
        self.sparse.set(entity.index(), self.dense.len() as u32);
        self.dense.push(entity);
    }

    /// Removes `entity` by swapping the last dense entry into its slot.
    ///
    /// Erasing an absent entity is a precondition violation.
    pub fn erase(&mut self, entity: Entity) {
        debug_assert!(self.contains(entity), "erase of absent entity {entity}");
        let position = self.sparse.get(entity.index()) as usize;
        self.dense.swap_remove(position);
        if position < self.dense.len() {
            let moved = self.dense[position];
            if !moved.is_tombstone() {
                self.sparse.set(moved.index(), position as u32);
            }
        }
        self.sparse.clear_slot(entity.index());
    }

    /// Exchanges two dense positions, keeping the sparse map consistent.
    pub fn swap_positions(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.dense.swap(a, b);
        let ea = self.dense[a];
        if !ea.is_tombstone() {
            self.sparse.set(ea.index(), a as u32);
        }
        let eb = self.dense[b];
        if !eb.is_tombstone() {
            self.sparse.set(eb.index(), b as u32);
        }
    }

    /// Returns the entity at dense position `position`.
    ///
    /// For sets used by fixed-discipline storages this may be a tombstone
    /// hole.
    #[inline]
    pub fn at(&self, position: usize) -> Entity {
        self.dense[position]
    }

    /// Returns the raw dense slice, including any tombstone holes.
    #[inline]
    pub fn entities(&self) -> &[Entity] {
        &self.dense
    }

    /// Iterates over live entities in dense order, skipping holes.
    pub fn iter(&self) -> impl Iterator<Item = Entity> + '_ {
        self.dense.iter().copied().filter(|e| !e.is_tombstone())
    }

    /// Number of dense slots, counting any holes.
    #[inline]
    pub fn len(&self) -> usize {
        self.dense.len()
    }

    /// Returns `true` if the set holds no slots at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    /// Reserves capacity for at least `additional` more dense entries.
    pub fn reserve(&mut self, additional: usize) {
        self.dense.reserve(additional);
    }

    /// Empties the set. Sparse pages stay allocated for reuse.
    pub fn clear(&mut self) {
        self.dense.clear();
        self.sparse.reset();
    }

    /// Reorders the dense array so the contained entities of `keys` come
    /// first, in key order. Entities outside the key sequence keep their
    /// relative order after them. O(n) plus sparse updates.
    pub fn sort_by_keys<I>(&mut self, keys: I)
    where
        I: IntoIterator<Item = Entity>,
    {
        let order = self.key_order(keys);
        self.apply_order(&order);
    }

    /// Sorts the dense array by the given entity comparator.
    pub fn sort_unstable_by(&mut self, mut compare: impl FnMut(Entity, Entity) -> Ordering) {
        let order = self.position_order(|a, b| compare(self.dense[a], self.dense[b]));
        self.apply_order(&order);
    }

    // ── hole management (fixed-discipline storages) ──────────────────────

    /// Fills the hole at `position` with `entity`.
    pub(crate) fn install_at(&mut self, position: usize, entity: Entity) {
        debug_assert!(self.dense[position].is_tombstone(), "slot {position} is not a hole");
        debug_assert!(!self.contains(entity), "duplicate insert of {entity}");
        self.dense[position] = entity;
        self.sparse.set(entity.index(), position as u32);
    }

    /// Turns the slot at `position` into a hole, detaching its entity.
    pub(crate) fn detach(&mut self, position: usize) {
        let entity = self.dense[position];
        debug_assert!(!entity.is_tombstone(), "slot {position} is already a hole");
        self.sparse.clear_slot(entity.index());
        self.dense[position] = Entity::tombstone();
    }

    /// Moves the dense entry at `from` to `to`, leaving a hole behind.
    pub(crate) fn move_dense(&mut self, from: usize, to: usize) {
        let entity = self.dense[from];
        debug_assert!(!entity.is_tombstone());
        self.dense[to] = entity;
        self.sparse.set(entity.index(), to as u32);
        self.dense[from] = Entity::tombstone();
    }

    /// Drops dense slots past `len`.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.dense.truncate(len);
    }

    // ── ordering helpers shared with component sets ──────────────────────

    /// Computes the permutation realizing [`sort_by_keys`](Self::sort_by_keys):
    /// `order[i]` is the current position of the entry that ends up at `i`.
    pub(crate) fn key_order<I>(&self, keys: I) -> Vec<u32>
    where
        I: IntoIterator<Item = Entity>,
    {
        let len = self.dense.len();
        let mut picked = vec![false; len];
        let mut order = Vec::with_capacity(len);
        for key in keys {
            if !self.contains(key) {
                continue;
            }
            let position = self.sparse.get(key.index()) as usize;
            if !picked[position] {
                picked[position] = true;
                order.push(position as u32);
            }
        }
        for position in 0..len {
            if !picked[position] {
                order.push(position as u32);
            }
        }
        order
    }

    /// Computes a sort permutation from a dense-position comparator.
    pub(crate) fn position_order(
        &self,
        mut compare: impl FnMut(usize, usize) -> Ordering,
    ) -> Vec<u32> {
        let mut order: Vec<u32> = (0..self.dense.len() as u32).collect();
        order.sort_by(|&a, &b| compare(a as usize, b as usize));
        order
    }

    /// Rearranges the dense array to `order` and rebuilds the sparse map.
    pub(crate) fn apply_order(&mut self, order: &[u32]) {
        debug_assert_eq!(order.len(), self.dense.len());
        let mut rearranged = Vec::with_capacity(order.len());
        for &position in order {
            rearranged.push(self.dense[position as usize]);
        }
        self.dense = rearranged;
        for (position, entity) in self.dense.iter().enumerate() {
            if !entity.is_tombstone() {
                self.sparse.set(entity.index(), position as u32);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::next_generation;

    fn e(index: IndexId) -> Entity {
        Entity::from_index(index)
    }

    #[test]
    fn insert_contains_offset() {
        let mut set = EntitySet::new();
        set.insert(e(0));
        set.insert(e(5));
        set.insert(e(4097)); // second sparse page

        assert_eq!(set.len(), 3);
        assert!(set.contains(e(0)));
        assert!(set.contains(e(4097)));
        assert!(!set.contains(e(1)));
        assert_eq!(set.offset(e(0)), 0);
        assert_eq!(set.offset(e(4097)), 2);
    }

    #[test]
    fn stale_generation_is_absent() {
        let mut set = EntitySet::new();
        let live = Entity::new(next_generation(0), 3);
        set.insert(live);

        assert!(set.contains(live));
        assert!(!set.contains(e(3)));
    }

    #[test]
    fn erase_swaps_last_into_slot() {
        let mut set = EntitySet::new();
        set.insert(e(0));
        set.insert(e(1));
        set.insert(e(2));

        set.erase(e(1));
        assert_eq!(set.len(), 2);
        assert_eq!(set.entities(), &[e(0), e(2)]);
        assert_eq!(set.offset(e(2)), 1);
        assert!(!set.contains(e(1)));
    }

    #[test]
    fn erase_then_insert_restores_state() {
        let mut set = EntitySet::new();
        set.insert(e(0));
        set.insert(e(1));

        set.insert(e(2));
        set.erase(e(2));

        assert_eq!(set.entities(), &[e(0), e(1)]);
        assert_eq!(set.offset(e(0)), 0);
        assert_eq!(set.offset(e(1)), 1);
    }

    #[test]
    fn sort_by_keys_puts_keys_first() {
        let mut set = EntitySet::new();
        for index in 0..5 {
            set.insert(e(index));
        }

        set.sort_by_keys([e(3), e(1)]);
        assert_eq!(set.entities(), &[e(3), e(1), e(0), e(2), e(4)]);
        for index in 0..5 {
            assert_eq!(set.at(set.offset(e(index))), e(index));
        }
    }

    #[test]
    fn sort_by_keys_ignores_absent_and_duplicate_keys() {
        let mut set = EntitySet::new();
        set.insert(e(0));
        set.insert(e(1));

        set.sort_by_keys([e(9), e(1), e(1)]);
        assert_eq!(set.entities(), &[e(1), e(0)]);
    }

    #[test]
    fn comparator_sort() {
        let mut set = EntitySet::new();
        set.insert(e(2));
        set.insert(e(0));
        set.insert(e(1));

        set.sort_unstable_by(|a, b| a.index().cmp(&b.index()));
        assert_eq!(set.entities(), &[e(0), e(1), e(2)]);
        assert_eq!(set.offset(e(2)), 2);
    }

    #[test]
    fn clear_keeps_pages_usable() {
        let mut set = EntitySet::new();
        set.insert(e(10_000));
        set.clear();
        assert!(set.is_empty());
        assert!(!set.contains(e(10_000)));

        set.insert(e(10_000));
        assert!(set.contains(e(10_000)));
    }

    #[test]
    fn swap_positions_updates_sparse() {
        let mut set = EntitySet::new();
        set.insert(e(0));
        set.insert(e(1));
        set.insert(e(2));

        set.swap_positions(0, 2);
        assert_eq!(set.entities(), &[e(2), e(1), e(0)]);
        assert_eq!(set.offset(e(0)), 2);
        assert_eq!(set.offset(e(2)), 0);
    }

    #[test]
    #[should_panic]
    fn bad_page_size_is_rejected() {
        let _ = EntitySet::with_page_size(1000);
    }
}
