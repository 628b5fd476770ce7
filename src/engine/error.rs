//! Error types for collection construction.
//!
//! The ECS core partitions failures into precondition violations (stale
//! handles, duplicate emplacement, sorting a fixed storage, …), which are
//! programming errors enforced with debug assertions, and the few
//! operations where a result type is genuinely meaningful. This module
//! declares the latter: small, structured error types implementing
//! [`std::error::Error`], with `Display` phrased for operator logs and
//! derived `Debug` retaining full structure.

use std::fmt;

/// Returned by fallible collection construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionError {
    /// The requested collection collects a type that an existing collection
    /// also collects, and neither constraint set contains the other, so the
    /// two prefix orders cannot coexist.
    Conflict {
        /// Name of an overlapping collected component type.
        type_name: &'static str,
    },
    /// A collected storage uses the fixed discipline, which forbids the
    /// dense swaps prefix maintenance relies on.
    FixedStorage {
        /// Name of the offending component type.
        type_name: &'static str,
    },
}

impl fmt::Display for CollectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conflict { type_name } => {
                write!(f, "collection conflicts with an existing collection over {type_name}")
            }
            Self::FixedStorage { type_name } => {
                write!(f, "cannot collect fixed storage of {type_name}")
            }
        }
    }
}

impl std::error::Error for CollectionError {}

/// Result alias for collection construction.
pub type CollectionResult<T> = Result<T, CollectionError>;
