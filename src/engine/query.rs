//! Typed query construction for the ECS.
//!
//! This module provides a *builder-style* API for assembling component
//! queries and materializing them as views or collections.
//!
//! ## Design goals
//! * **Static intent:** Captured component types are tuple type parameters,
//!   so the hot iteration path is monomorphized.
//! * **Runtime composition:** Membership-only constraints (required and
//!   excluded types) are plain key lists resolved against the world.
//! * **Convenience, not capability:** Everything the builder produces can
//!   also be constructed directly from storages ([`View::from_parts`]) or
//!   the world's collection entry points.
//!
//! ## Example
//! ```ignore
//! let view = world
//!     .query()
//!     .include::<(Position, Velocity)>()
//!     .exclude::<(Frozen,)>()
//!     .optional::<(Mass,)>()
//!     .view();
//! ```

use std::marker::PhantomData;

use crate::engine::collection::{Collection, EntityCollection};
use crate::engine::entity::EntitySet;
use crate::engine::error::CollectionResult;
use crate::engine::registry::TypeKey;
use crate::engine::view::{Include, Optional, TypeList, View};
use crate::engine::world::World;

/// Accumulates include / require / exclude / optional type lists and
/// materializes a [`View`] or a [`Collection`].
///
/// `C` is the captured tuple: the included types of a view, or the
/// collected types of a collection. The builder is consumed by
/// materialization, so a query definition cannot be reused half-built.
pub struct QueryBuilder<'w, C = (), O = ()> {
    world: &'w mut World,
    required: Vec<TypeKey>,
    excluded: Vec<TypeKey>,
    marker: PhantomData<fn() -> (C, O)>,
}

impl<'w> QueryBuilder<'w> {
    pub(crate) fn new(world: &'w mut World) -> Self {
        Self {
            world,
            required: Vec::new(),
            excluded: Vec::new(),
            marker: PhantomData,
        }
    }
}

impl<'w, C, O> QueryBuilder<'w, C, O> {
    /// Sets the captured component tuple: the included types of a view, or
    /// the collected types of a collection.
    pub fn include<C2>(self) -> QueryBuilder<'w, C2, O> {
        QueryBuilder {
            world: self.world,
            required: self.required,
            excluded: self.excluded,
            marker: PhantomData,
        }
    }

    /// Sets the optional-lookup component tuple.
    pub fn optional<O2>(self) -> QueryBuilder<'w, C, O2> {
        QueryBuilder {
            world: self.world,
            required: self.required,
            excluded: self.excluded,
            marker: PhantomData,
        }
    }

    /// Adds membership-only requirements: visited entities must have these
    /// components, but their values are not captured.
    pub fn require<L: TypeList>(mut self) -> Self {
        self.required.extend(L::ensure_keys(self.world));
        self
    }

    /// Adds exclusions: entities with any of these components are skipped.
    pub fn exclude<L: TypeList>(mut self) -> Self {
        self.excluded.extend(L::ensure_keys(self.world));
        self
    }

    /// Materializes a non-owning view, creating missing captured storages
    /// lazily.
    pub fn view(self) -> View<'w, C, O>
    where
        C: Include<'w>,
        O: Optional<'w>,
    {
        let QueryBuilder {
            world,
            required,
            excluded,
            ..
        } = self;
        C::ensure_keys(world);
        let world: &'w World = world;
        let required = resolve_sets(world, &required);
        let excluded = resolve_sets(world, &excluded);
        View::from_parts(C::fetch(world), required, excluded, O::fetch(world))
    }

    /// Materializes a collection over the captured tuple, creating (or
    /// reusing) its sorter.
    ///
    /// Returns an error when the collection conflicts with an existing one
    /// or would collect a fixed storage.
    pub fn try_collect(self) -> CollectionResult<Collection<'w, C, O>>
    where
        C: Include<'w>,
        O: Optional<'w>,
    {
        let QueryBuilder {
            world,
            required,
            excluded,
            ..
        } = self;
        let collected = C::ensure_keys(world);
        let index = world.get_or_create_sorter(collected, required, excluded)?;
        let world: &'w World = world;
        Ok(Collection::new(world, index))
    }

    /// Panicking form of [`try_collect`](Self::try_collect); creating a
    /// conflicting collection is a precondition violation.
    pub fn collect(self) -> Collection<'w, C, O>
    where
        C: Include<'w>,
        O: Optional<'w>,
    {
        match self.try_collect() {
            Ok(collection) => collection,
            Err(error) => panic!("{error}"),
        }
    }
}

impl<'w, O> QueryBuilder<'w, (), O> {
    /// Materializes the degenerate collection form: required / excluded
    /// constraints only, tracked in a sorter-owned entity set with no
    /// storage reordering. Precondition: at least one required type.
    pub fn collect_entities(self) -> EntityCollection<'w> {
        let QueryBuilder {
            world,
            required,
            excluded,
            ..
        } = self;
        let index = world
            .get_or_create_sorter(Vec::new(), required, excluded)
            .expect("entity collections have no collected types and cannot conflict");
        let world: &'w World = world;
        EntityCollection::new(world, index)
    }
}

fn resolve_sets<'w>(world: &'w World, keys: &[TypeKey]) -> Vec<&'w EntitySet> {
    keys.iter()
        .filter_map(|&key| world.erased(key))
        .map(|set| set.entity_set())
        .collect()
}
