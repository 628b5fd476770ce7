//! # Component Views
//!
//! Non-owning, composable iteration over set-theoretic combinations of
//! component storages.
//!
//! ## Shape
//! A view is parameterised by three disjoint groups of component types:
//!
//! - **Included** `I` — a non-empty tuple; every visited entity has all of
//!   them, and their references are handed to the iteration closure.
//!   Included types are monomorphized so the hot loop stays branchless.
//! - **Excluded** — a runtime list of storages; entities present in any of
//!   them are skipped.
//! - **Optional** `O` — a tuple whose members are looked up per entity and
//!   exposed as `Option<&C>`, `None` when the storage is absent or the
//!   entity lacks the component.
//!
//! The view iterates the smallest included storage (the *main* set, can be
//! overridden with [`View::rebind`]) in its current dense order and tests
//! membership per visit; nothing is cached, so a view is always consistent
//! with the storages at the moment of the visit.
//!
//! Views borrow their storages immutably. Mutation goes through
//! [`World::get_mut`], [`World::replace`] or `ComponentSet::iter_mut`
//! between iterations.

use std::any::TypeId;

use crate::engine::entity::EntitySet;
use crate::engine::registry::{TypeKey, TypeRegistry};
use crate::engine::storage::{Component, ComponentSet};
use crate::engine::types::Entity;
use crate::engine::world::World;

/// Tuple of component types whose presence a view requires and whose
/// references it yields. Implemented for tuples of up to four components.
pub trait Include<'w>: 'static {
    /// Tuple of storage references.
    type Fetch: Copy;
    /// Tuple of component references yielded per entity.
    type Item;

    /// Resolves the storages from a world.
    ///
    /// A missing included storage is a precondition violation; create
    /// storages up front (e.g. via [`World::reserve`] or the query
    /// builder, which ensures them).
    fn fetch(world: &'w World) -> Self::Fetch;
    /// Registers and creates the storages, returning their keys.
    fn ensure_keys(world: &mut World) -> Vec<TypeKey>;
    /// Returns `true` if every storage contains `entity`.
    fn contains(fetch: Self::Fetch, entity: Entity) -> bool;
    /// Returns the component references for `entity`. Precondition: every
    /// storage contains it.
    fn get(fetch: Self::Fetch, entity: Entity) -> Self::Item;
    /// Entity set of the smallest storage.
    fn main(fetch: Self::Fetch) -> &'w EntitySet;
    /// Entity set of the tuple's first storage.
    fn first(fetch: Self::Fetch) -> &'w EntitySet;
    /// Entity set of component `M`. Precondition: `M` is in the tuple.
    fn main_of<M: Component>(fetch: Self::Fetch) -> &'w EntitySet;
}

/// Tuple of component types a view exposes as nullable lookups.
/// Implemented for `()` and tuples of up to four components.
pub trait Optional<'w>: 'static {
    /// Tuple of optional storage references.
    type Fetch: Copy;
    /// Tuple of `Option<&C>` references yielded per entity.
    type Item;

    /// Resolves the storages; absent storages become `None`.
    fn fetch(world: &'w World) -> Self::Fetch;
    /// Looks up each optional component for `entity`.
    fn get(fetch: Self::Fetch, entity: Entity) -> Self::Item;
}

/// Tuple of component types used as a runtime key list (exclusions,
/// membership interrogation, storage clearing). Implemented for `()` and
/// tuples of up to four components.
pub trait TypeList: 'static {
    /// Keys of the listed types; `None` for types never registered.
    fn keys(registry: &TypeRegistry) -> Vec<Option<TypeKey>>;
    /// Registers and creates the storages, returning their keys.
    fn ensure_keys(world: &mut World) -> Vec<TypeKey>;
}

impl<'w> Optional<'w> for () {
    type Fetch = ();
    type Item = ();

    fn fetch(_world: &'w World) -> Self::Fetch {}

    fn get(_fetch: Self::Fetch, _entity: Entity) -> Self::Item {}
}

impl TypeList for () {
    fn keys(_registry: &TypeRegistry) -> Vec<Option<TypeKey>> {
        Vec::new()
    }

    fn ensure_keys(_world: &mut World) -> Vec<TypeKey> {
        Vec::new()
    }
}

macro_rules! impl_include {
    ($(($T:ident, $idx:tt)),+) => {
        impl<'w, $($T: Component),+> Include<'w> for ($($T,)+) {
            type Fetch = ($(&'w ComponentSet<$T>,)+);
            type Item = ($(&'w $T,)+);

            fn fetch(world: &'w World) -> Self::Fetch {
                ($(world
                    .storage::<$T>()
                    .expect("included component storage has not been created"),)+)
            }

            fn ensure_keys(world: &mut World) -> Vec<TypeKey> {
                vec![$(world.ensure_storage::<$T>(),)+]
            }

            fn contains(fetch: Self::Fetch, entity: Entity) -> bool {
                $(fetch.$idx.contains(entity))&&+
            }

            fn get(fetch: Self::Fetch, entity: Entity) -> Self::Item {
                ($(fetch.$idx.get(entity),)+)
            }

            fn main(fetch: Self::Fetch) -> &'w EntitySet {
                let mut smallest = fetch.0.len();
                let mut main = fetch.0.entities();
                $(
                    if fetch.$idx.len() < smallest {
                        smallest = fetch.$idx.len();
                        main = fetch.$idx.entities();
                    }
                )+
                let _ = smallest;
                main
            }

            fn first(fetch: Self::Fetch) -> &'w EntitySet {
                fetch.0.entities()
            }

            fn main_of<M: Component>(fetch: Self::Fetch) -> &'w EntitySet {
                $(
                    if TypeId::of::<M>() == TypeId::of::<$T>() {
                        return fetch.$idx.entities();
                    }
                )+
                panic!("rebind target must be one of the included component types");
            }
        }
    };
}

impl_include!((A, 0));
impl_include!((A, 0), (B, 1));
impl_include!((A, 0), (B, 1), (C, 2));
impl_include!((A, 0), (B, 1), (C, 2), (D, 3));

macro_rules! impl_optional {
    ($(($T:ident, $idx:tt)),+) => {
        impl<'w, $($T: Component),+> Optional<'w> for ($($T,)+) {
            type Fetch = ($(Option<&'w ComponentSet<$T>>,)+);
            type Item = ($(Option<&'w $T>,)+);

            fn fetch(world: &'w World) -> Self::Fetch {
                ($(world.storage::<$T>(),)+)
            }

            fn get(fetch: Self::Fetch, entity: Entity) -> Self::Item {
                ($(fetch.$idx.and_then(|set| set.try_get(entity)),)+)
            }
        }
    };
}

impl_optional!((A, 0));
impl_optional!((A, 0), (B, 1));
impl_optional!((A, 0), (B, 1), (C, 2));
impl_optional!((A, 0), (B, 1), (C, 2), (D, 3));

macro_rules! impl_type_list {
    ($($T:ident),+) => {
        impl<$($T: Component),+> TypeList for ($($T,)+) {
            fn keys(registry: &TypeRegistry) -> Vec<Option<TypeKey>> {
                vec![$(registry.key_of::<$T>(),)+]
            }

            fn ensure_keys(world: &mut World) -> Vec<TypeKey> {
                vec![$(world.ensure_storage::<$T>(),)+]
            }
        }
    };
}

impl_type_list!(A);
impl_type_list!(A, B);
impl_type_list!(A, B, C);
impl_type_list!(A, B, C, D);

/// Non-owning iteration object over the entities that have every included
/// component, every required membership, and none of the excluded ones.
///
/// Cheap to construct and copy-free to iterate; see the module docs for the
/// iteration contract.
pub struct View<'w, I: Include<'w>, O: Optional<'w> = ()> {
    included: I::Fetch,
    main: &'w EntitySet,
    required: Vec<&'w EntitySet>,
    excluded: Vec<&'w EntitySet>,
    optional: O::Fetch,
}

impl<'w, I: Include<'w>, O: Optional<'w>> View<'w, I, O> {
    /// Assembles a view from resolved parts. The smallest included storage
    /// becomes the main set.
    pub fn from_parts(
        included: I::Fetch,
        required: Vec<&'w EntitySet>,
        excluded: Vec<&'w EntitySet>,
        optional: O::Fetch,
    ) -> Self {
        let main = I::main(included);
        Self {
            included,
            main,
            required,
            excluded,
            optional,
        }
    }

    /// Forces component `C`'s storage to be the main (driving) set.
    /// Precondition: `C` is one of the included types.
    pub fn rebind<C: Component>(mut self) -> Self {
        self.main = I::main_of::<C>(self.included);
        self
    }

    /// Returns `true` if `entity` passes every membership test of the view.
    pub fn contains(&self, entity: Entity) -> bool {
        I::contains(self.included, entity)
            && self.required.iter().all(|set| set.contains(entity))
            && !self.excluded.iter().any(|set| set.contains(entity))
    }

    /// Main-set offset of `entity`, or `None` if the view does not contain
    /// it.
    pub fn find(&self, entity: Entity) -> Option<usize> {
        if self.contains(entity) {
            Some(self.main.offset(entity))
        } else {
            None
        }
    }

    /// Included component references for `entity`. Precondition: the view
    /// contains it.
    pub fn get(&self, entity: Entity) -> I::Item {
        debug_assert!(self.contains(entity), "view get of non-member {entity}");
        I::get(self.included, entity)
    }

    /// Included component references for `entity`, or `None` if the view
    /// does not contain it.
    pub fn try_get(&self, entity: Entity) -> Option<I::Item> {
        if self.contains(entity) {
            Some(I::get(self.included, entity))
        } else {
            None
        }
    }

    /// Optional component references for `entity`; each is `None` when the
    /// storage is absent or the entity lacks the component.
    pub fn get_optional(&self, entity: Entity) -> O::Item {
        O::get(self.optional, entity)
    }

    /// Size of the main set, an upper bound on the number of entities a
    /// full iteration visits.
    pub fn size_hint(&self) -> usize {
        self.main.len()
    }

    /// Returns `true` if iteration would visit no entity.
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Iterates the matching entities in the main set's dense order.
    pub fn iter(&self) -> impl Iterator<Item = Entity> + use<'_, 'w, I, O> {
        self.main.iter().filter(move |&entity| self.contains(entity))
    }

    /// Applies `f` to every matching entity with its included and optional
    /// component references.
    pub fn for_each(&self, mut f: impl FnMut(Entity, I::Item, O::Item)) {
        for entity in self.iter() {
            f(
                entity,
                I::get(self.included, entity),
                O::get(self.optional, entity),
            );
        }
    }

    /// Like [`for_each`](Self::for_each); returning `false` from `f`
    /// terminates the iteration early.
    pub fn for_each_while(&self, mut f: impl FnMut(Entity, I::Item, O::Item) -> bool) {
        for entity in self.iter() {
            if !f(
                entity,
                I::get(self.included, entity),
                O::get(self.optional, entity),
            ) {
                break;
            }
        }
    }
}
