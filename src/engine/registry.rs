//! # Type Registry
//!
//! This module provides the registry that assigns stable [`TypeKey`] values
//! to Rust component types and records their metadata.
//!
//! ## Purpose
//! The rest of the engine treats component type identity as an opaque,
//! hashable, totally ordered token. The registry produces those tokens and
//! decouples them from `std::any::TypeId`, which has no useful ordering and
//! no compact index form.
//!
//! ## Design
//! - A registry is a plain value owned by (or injected into) each world —
//!   there is no process-global state, so two worlds may assign different
//!   keys to the same type. Keys must not be carried across registries.
//! - `by_type` maps `TypeId -> TypeKey`; `descs` stores a [`TypeDesc`] per
//!   key. Keys are allocated sequentially, which lets the world use them as
//!   direct indices into its storage table.
//!
//! ## Invariants
//! - Every entry in `by_type` has a matching `descs[key]`.
//! - Keys are unique and stable for the lifetime of the registry.

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::mem::{align_of, size_of};

use crate::engine::storage::Component;

/// Stable, compact identifier of a component type within one registry.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct TypeKey(u32);

impl TypeKey {
    #[inline]
    pub(crate) fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    /// Index form used for table addressing.
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type#{}", self.0)
    }
}

/// Describes a registered component type.
///
/// `TypeDesc` is `Copy` and safe to clone freely for reporting and
/// diagnostics.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeDesc {
    /// Registry key assigned to this type.
    pub key: TypeKey,
    /// Rust type name for diagnostics.
    pub name: &'static str,
    /// Runtime `TypeId` of the component type.
    pub type_id: TypeId,
    /// Size of the component type in bytes.
    pub size: usize,
    /// Alignment of the component type in bytes.
    pub align: usize,
}

impl TypeDesc {
    /// Builds a descriptor for type `T` with the given key.
    #[inline]
    pub fn of<T: Component>(key: TypeKey) -> Self {
        Self {
            key,
            name: type_name::<T>(),
            type_id: TypeId::of::<T>(),
            size: size_of::<T>(),
            align: align_of::<T>(),
        }
    }

    /// Returns `true` if this descriptor refers to type `T`.
    #[inline]
    pub fn matches_type<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TypeDesc {{ key: {}, name: {}, size: {}, align: {} }}",
            self.key, self.name, self.size, self.align
        )
    }
}

/// Mapping between Rust component types and compact [`TypeKey`] values.
#[derive(Default, Clone)]
pub struct TypeRegistry {
    by_type: HashMap<TypeId, TypeKey>,
    descs: Vec<TypeDesc>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers component type `T`, returning its key.
    ///
    /// Registration is idempotent: a type registered twice keeps its first
    /// key.
    pub fn register<T: Component>(&mut self) -> TypeKey {
        let type_id = TypeId::of::<T>();
        if let Some(&existing) = self.by_type.get(&type_id) {
            return existing;
        }
        let key = TypeKey::from_index(self.descs.len());
        self.by_type.insert(type_id, key);
        self.descs.push(TypeDesc::of::<T>(key));
        key
    }

    /// Returns the key of `T`, if registered.
    #[inline]
    pub fn key_of<T: 'static>(&self) -> Option<TypeKey> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    /// Returns the descriptor for `key`, if registered.
    #[inline]
    pub fn describe(&self, key: TypeKey) -> Option<&TypeDesc> {
        self.descs.get(key.index())
    }

    /// Number of registered types.
    #[inline]
    pub fn len(&self) -> usize {
        self.descs.len()
    }

    /// Returns `true` if no types are registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.descs.is_empty()
    }
}
