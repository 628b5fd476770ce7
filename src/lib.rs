//! # Kestrel ECS
//!
//! Sparse-set Entity-Component-System core designed as the data backbone of
//! a game engine.
//!
//! ## Design Goals
//! - Densely packed per-component storage for cache-friendly iteration
//! - Generation-counted entity handles for safe slot reuse
//! - Composable views over include / exclude / optional component sets
//! - Event-driven collections that keep matching entities grouped at the
//!   front of their storages for branchless tight loops
//!
//! Worlds are single-threaded containers; multiple worlds may live on
//! different threads without coordination, but one world must be
//! synchronized externally if shared.

#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

pub mod engine;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

// Core ECS types

pub use engine::types::{
    Entity,
    GenerationId,
    IndexId,
};

pub use engine::entity::EntitySet;

pub use engine::storage::{
    AnyComponentSet,
    Component,
    ComponentPtr,
    ComponentSet,
    EmplaceResult,
    StorageDiscipline,
    StorageOptions,
};

pub use engine::events::{CallbackHandle, EventProxy};

pub use engine::registry::{TypeDesc, TypeKey, TypeRegistry};

pub use engine::world::{ComponentBundle, World};

pub use engine::view::{Include, Optional, TypeList, View};

pub use engine::collection::{Collection, EntityCollection};

pub use engine::query::QueryBuilder;

pub use engine::error::{
    CollectionError,
    CollectionResult,
};

// ─────────────────────────────────────────────────────────────────────────────
// Prelude (Optional but recommended)
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used ECS types.
///
/// Import with:
/// ```rust
/// use kestrel_ecs::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Collection,
        ComponentSet,
        Entity,
        EntityCollection,
        EntitySet,
        QueryBuilder,
        StorageDiscipline,
        StorageOptions,
        View,
        World,
    };
}
