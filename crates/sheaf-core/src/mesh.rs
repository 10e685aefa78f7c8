//! Device-mesh metadata, reduced to the part sharding propagation needs: the size of each
//! mesh dimension. Device identities, host ownership, and process mapping all live in the
//! runtime that owns the mesh; propagation only ever asks "how many shards does mesh
//! dimension `k` produce?" in order to check divisibility.
//!
//! Mesh dimensions are identified positionally. A tensor axis sharded along mesh dimension
//! `1` of a `[4, 2]` mesh is split into 2 shards.

use std::fmt::{self, Display};

use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error type for mesh construction and queries.
#[derive(Error, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MeshError {
    /// Error returned when a mesh dimension has size `0`.
    #[error("mesh dimension #{dimension} must have size > 0")]
    InvalidDimensionSize { dimension: usize },

    /// Error returned when arithmetic overflows while computing mesh metadata.
    #[error("overflow while {context}")]
    Overflow { context: String },
}

// ---------------------------------------------------------------------------
// Mesh
// ---------------------------------------------------------------------------

/// Logical multi-dimensional grid of devices, described only by its dimension sizes.
///
/// This is the read-only view of a mesh that sharding propagation consumes. The full mesh
/// (devices, processes, topology) is owned by the caller; propagation rules need nothing
/// beyond the shard factor along each mesh dimension, so that is all this type carries.
///
/// A rank-0 mesh is legal and describes a single-device setup; every sharded assignment is
/// then out of range and fails validation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Mesh {
    dimension_sizes: Vec<u64>,
}

impl Mesh {
    /// Creates a mesh from its dimension sizes.
    ///
    /// Validates that every dimension size is positive.
    pub fn new(dimension_sizes: Vec<u64>) -> Result<Self, MeshError> {
        for (dimension, &size) in dimension_sizes.iter().enumerate() {
            if size == 0 {
                return Err(MeshError::InvalidDimensionSize { dimension });
            }
        }
        Ok(Self { dimension_sizes })
    }

    /// Returns the sizes of all mesh dimensions.
    pub fn dimension_sizes(&self) -> &[u64] {
        self.dimension_sizes.as_slice()
    }

    /// Returns the number of mesh dimensions.
    pub fn rank(&self) -> usize {
        self.dimension_sizes.len()
    }

    /// Returns the size of mesh dimension `dimension` (the shard factor along it), if valid.
    pub fn dimension_size(&self, dimension: usize) -> Option<u64> {
        self.dimension_sizes.get(dimension).copied()
    }

    /// Returns the total number of devices implied by the dimension sizes.
    pub fn device_count(&self) -> Result<u64, MeshError> {
        self.dimension_sizes.iter().try_fold(1u64, |count, &size| {
            count.checked_mul(size).ok_or_else(|| MeshError::Overflow {
                context: "computing mesh device count from dimension sizes".to_string(),
            })
        })
    }
}

impl Display for Mesh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mesh[")?;
        for (dimension, size) in self.dimension_sizes.iter().enumerate() {
            if dimension > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{size}")?;
        }
        write!(f, "]")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
