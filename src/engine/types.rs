//! Core ECS Types, Identifiers, and Bit-Level Layouts
//!
//! This module defines the **fundamental identifier type and bit layout**
//! shared by every other subsystem: the packed [`Entity`] handle.
//!
//! ## Entity Representation
//!
//! Entities are encoded as a packed 32-bit integer with the following layout:
//!
//! ```text
//! | generation | index |
//! ```
//!
//! - **Index** identifies the slot in the world's entity vector and is the
//!   value used to address sparse arrays.
//! - **Generation** is bumped every time a slot is released, so stale copies
//!   of a recycled handle compare unequal to the slot's current occupant.
//!
//! The exact bit widths are controlled by compile-time constants and
//! validated with static assertions.
//!
//! ## Tombstones
//!
//! Both fields reserve their all-ones value as a *tombstone*. An entity is
//! tombstone-valued iff **both** fields are all-ones; that value doubles as
//! the "no entity" sentinel and as the end marker of the world's intrusive
//! free list, where a free slot's index field stores the next free slot.
//!
//! Equality is bitwise: two handles are the same entity only when both the
//! index and the generation match.

use std::fmt;

/// Raw bit representation of an [`Entity`].
pub type EntityBits = u32;
/// Index component of an entity (slot in the world's entity vector).
pub type IndexId = u32;
/// Generation counter used to detect stale entities.
pub type GenerationId = u16;

/// Total number of bits in an entity handle.
pub const ENTITY_BITS: u32 = EntityBits::BITS;
/// Number of bits reserved for the entity index.
pub const INDEX_BITS: u32 = 20;
/// Number of bits reserved for the generation counter.
pub const GENERATION_BITS: u32 = ENTITY_BITS - INDEX_BITS;

const _: [(); 1] = [(); (INDEX_BITS > 0 && INDEX_BITS < ENTITY_BITS) as usize];
const _: [(); 1] = [(); (INDEX_BITS + GENERATION_BITS == ENTITY_BITS) as usize];
const _: [(); 1] = [(); (GENERATION_BITS <= (GenerationId::BITS)) as usize];

const fn mask(bits: u32) -> EntityBits {
    if bits == 0 { 0 } else { ((1 as EntityBits) << bits) - 1 }
}

/// Mask selecting the index portion of an entity.
pub const INDEX_MASK: EntityBits = mask(INDEX_BITS);
/// Mask selecting the (shifted-down) generation portion of an entity.
pub const GENERATION_MASK: EntityBits = mask(GENERATION_BITS);

/// All-ones index value reserved as the index tombstone.
pub const TOMBSTONE_INDEX: IndexId = INDEX_MASK as IndexId;
/// All-ones generation value reserved as the generation tombstone.
pub const TOMBSTONE_GENERATION: GenerationId = GENERATION_MASK as GenerationId;

/// Opaque, generation-counted identifier for an ECS entity.
///
/// ## Representation
/// Internally an `Entity` packs two values into a single 32-bit integer:
///
/// - **Index** — slot within the world's entity vector
/// - **Generation** — incremented on release to invalidate stale handles
///
/// ## Invariants
/// - Two entities with the same index but different generations are
///   distinct; at most one of them is live at any point in time.
/// - The tombstone value (both fields all-ones) never refers to a live
///   entity.
///
/// `Entity` values are cheap to copy and compare and are safe to pass
/// across threads.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Entity(EntityBits);

impl Entity {
    /// Builds an entity from a generation and an index.
    #[inline]
    pub const fn new(generation: GenerationId, index: IndexId) -> Self {
        Self((((generation as EntityBits) & GENERATION_MASK) << INDEX_BITS)
            | ((index as EntityBits) & INDEX_MASK))
    }

    /// Builds a generation-zero entity from an index.
    #[inline]
    pub const fn from_index(index: IndexId) -> Self {
        Self::new(0, index)
    }

    /// Returns the tombstone entity (both fields all-ones).
    #[inline]
    pub const fn tombstone() -> Self {
        Self::new(TOMBSTONE_GENERATION, TOMBSTONE_INDEX)
    }

    /// Returns the index component of this entity.
    #[inline]
    pub const fn index(self) -> IndexId {
        self.0 & INDEX_MASK
    }

    /// Returns the generation component of this entity.
    #[inline]
    pub const fn generation(self) -> GenerationId {
        ((self.0 >> INDEX_BITS) & GENERATION_MASK) as GenerationId
    }

    /// Returns `true` if both fields hold their tombstone value.
    #[inline]
    pub const fn is_tombstone(self) -> bool {
        self.0 == Self::tombstone().0
    }

    /// Returns the raw bit representation.
    #[inline]
    pub const fn to_bits(self) -> EntityBits {
        self.0
    }

    /// Rebuilds an entity from its raw bit representation.
    #[inline]
    pub const fn from_bits(bits: EntityBits) -> Self {
        Self(bits)
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_tombstone() {
            write!(f, "Entity(tombstone)")
        } else {
            write!(f, "Entity({}v{})", self.index(), self.generation())
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Returns the generation following `generation`, wrapping around the
/// tombstone value so a recycled slot never reports the sentinel.
#[inline]
pub const fn next_generation(generation: GenerationId) -> GenerationId {
    let next = generation.wrapping_add(1);
    if next >= TOMBSTONE_GENERATION { 0 } else { next }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_round_trip() {
        let e = Entity::new(7, 1234);
        assert_eq!(e.index(), 1234);
        assert_eq!(e.generation(), 7);
        assert_eq!(Entity::from_bits(e.to_bits()), e);
    }

    #[test]
    fn tombstone_is_both_fields() {
        let t = Entity::tombstone();
        assert!(t.is_tombstone());
        assert_eq!(t.index(), TOMBSTONE_INDEX);
        assert_eq!(t.generation(), TOMBSTONE_GENERATION);

        // A tombstone generation alone does not make a tombstone entity.
        let half = Entity::new(TOMBSTONE_GENERATION, 0);
        assert!(!half.is_tombstone());
        assert_ne!(half, t);
    }

    #[test]
    fn generation_wraps_past_tombstone() {
        assert_eq!(next_generation(0), 1);
        assert_eq!(next_generation(TOMBSTONE_GENERATION - 2), TOMBSTONE_GENERATION - 1);
        assert_eq!(next_generation(TOMBSTONE_GENERATION - 1), 0);
    }
}
