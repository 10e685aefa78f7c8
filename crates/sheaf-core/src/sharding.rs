//! Sharding assignments for tensors distributed across a device mesh.
//!
//! The model follows the one used by SPMD partitioners such as [GSPMD][gspmd] and
//! [Shardy][shardy]: each tensor axis is independently either *replicated* (its full extent
//! present on every device) or *sharded* along exactly one mesh dimension (split into as
//! many equal slices as that mesh dimension has devices). No mesh dimension may shard two
//! axes of the same tensor — the device grid offers each of its dimensions once.
//!
//! [gspmd]: https://arxiv.org/abs/2105.04663
//! [shardy]: https://openxla.org/shardy/overview
//!
//! | Type | Role |
//! |---|---|
//! | [`AxisSharding`] | Assignment of one tensor axis |
//! | [`ShardingSpec`] | Per-axis assignments for a whole tensor |
//! | [`ShardedShape`] | A global [`Shape`] paired with its [`ShardingSpec`] |
//!
//! [`ShardingSpec`] construction is unchecked because validity depends on the mesh; call
//! [`ShardingSpec::validate_for_mesh`] (the propagation entry points do) to enforce range
//! and uniqueness. [`ShardedShape`] construction checks the one mesh-independent invariant:
//! the spec must have one entry per shape axis.

use std::fmt::{self, Display};

use thiserror::Error;

use crate::mesh::Mesh;
use crate::shape::Shape;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error type for sharding-spec validation and descriptor construction.
#[derive(Error, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ShardingError {
    /// Error returned when an axis references a mesh dimension the mesh does not have.
    #[error("tensor axis #{axis} is sharded along mesh dimension {mesh_dim}, but the mesh only has {mesh_rank} dimension(s)")]
    MeshDimensionOutOfRange { axis: usize, mesh_dim: usize, mesh_rank: usize },

    /// Error returned when two axes of one tensor are sharded along the same mesh dimension.
    #[error("tensor axes #{first_axis} and #{second_axis} are both sharded along mesh dimension {mesh_dim}")]
    DuplicateMeshDimension { mesh_dim: usize, first_axis: usize, second_axis: usize },

    /// Error returned when a sharding spec does not have one entry per shape axis.
    #[error("sharding spec rank {spec_rank} does not match shape rank {shape_rank}")]
    RankMismatch { spec_rank: usize, shape_rank: usize },
}

// ---------------------------------------------------------------------------
// Axis sharding
// ---------------------------------------------------------------------------

/// Distribution assignment for one tensor axis.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AxisSharding {
    /// The axis is not distributed: every device holds its full extent.
    Replicated,

    /// The axis is split across the given mesh dimension, one slice per device along it.
    Sharded(usize),
}

impl AxisSharding {
    /// Creates a replicated assignment.
    pub fn replicated() -> Self {
        Self::Replicated
    }

    /// Creates an assignment sharded along mesh dimension `mesh_dim`.
    pub fn sharded(mesh_dim: usize) -> Self {
        Self::Sharded(mesh_dim)
    }

    /// Returns `true` if this axis is sharded.
    pub fn is_sharded(&self) -> bool {
        matches!(self, Self::Sharded(_))
    }

    /// Returns the mesh dimension this axis is sharded along, if it is sharded.
    pub fn mesh_dim(&self) -> Option<usize> {
        match self {
            Self::Sharded(mesh_dim) => Some(*mesh_dim),
            Self::Replicated => None,
        }
    }
}

impl Display for AxisSharding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Replicated => write!(f, "replicated"),
            Self::Sharded(mesh_dim) => write!(f, "mesh{mesh_dim}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Sharding spec
// ---------------------------------------------------------------------------

/// Per-axis distribution assignments for a whole tensor.
///
/// Entry `i` describes tensor axis `i`. Renders as `{axis0 -> mesh0, axis1 -> replicated}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ShardingSpec {
    axes: Vec<AxisSharding>,
}

impl ShardingSpec {
    /// Creates a sharding spec from per-axis assignments.
    pub fn new(axes: Vec<AxisSharding>) -> Self {
        Self { axes }
    }

    /// Creates the fully replicated spec for a tensor of rank `rank`.
    pub fn replicated(rank: usize) -> Self {
        Self { axes: vec![AxisSharding::Replicated; rank] }
    }

    /// Returns the per-axis assignments.
    pub fn axes(&self) -> &[AxisSharding] {
        self.axes.as_slice()
    }

    /// Returns the assignment of tensor axis `axis`, if valid.
    pub fn axis(&self, axis: usize) -> Option<AxisSharding> {
        self.axes.get(axis).copied()
    }

    /// Rank represented by this spec.
    pub fn rank(&self) -> usize {
        self.axes.len()
    }

    /// Returns `true` if no axis is sharded.
    pub fn is_fully_replicated(&self) -> bool {
        self.axes.iter().all(|axis| !axis.is_sharded())
    }

    /// Validates this spec against a mesh: every referenced mesh dimension must exist, and
    /// no mesh dimension may be referenced by two axes.
    pub fn validate_for_mesh(&self, mesh: &Mesh) -> Result<(), ShardingError> {
        for (axis, sharding) in self.axes.iter().enumerate() {
            let Some(mesh_dim) = sharding.mesh_dim() else { continue };
            if mesh_dim >= mesh.rank() {
                return Err(ShardingError::MeshDimensionOutOfRange { axis, mesh_dim, mesh_rank: mesh.rank() });
            }
            if let Some(first_axis) =
                self.axes[..axis].iter().position(|earlier| earlier.mesh_dim() == Some(mesh_dim))
            {
                return Err(ShardingError::DuplicateMeshDimension { mesh_dim, first_axis, second_axis: axis });
            }
        }
        Ok(())
    }
}

impl Display for ShardingSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (axis, sharding) in self.axes.iter().enumerate() {
            if axis > 0 {
                write!(f, ", ")?;
            }
            write!(f, "axis{axis} -> {sharding}")?;
        }
        write!(f, "}}")
    }
}

// ---------------------------------------------------------------------------
// Sharded shape
// ---------------------------------------------------------------------------

/// Distributed tensor descriptor: a global [`Shape`] paired with its [`ShardingSpec`].
///
/// This is the unit the propagation entry points consume and produce. It carries metadata
/// only — no tensor data, no device buffers — and is owned by the graph layer that calls
/// into propagation; the engine never mutates one in place.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ShardedShape {
    shape: Shape,
    sharding: ShardingSpec,
}

impl ShardedShape {
    /// Creates a descriptor, validating that the spec has one entry per shape axis.
    pub fn new(shape: Shape, sharding: ShardingSpec) -> Result<Self, ShardingError> {
        if sharding.rank() != shape.rank() {
            return Err(ShardingError::RankMismatch { spec_rank: sharding.rank(), shape_rank: shape.rank() });
        }
        Ok(Self { shape, sharding })
    }

    /// Creates the fully replicated descriptor for `shape`.
    pub fn replicated(shape: Shape) -> Self {
        let sharding = ShardingSpec::replicated(shape.rank());
        Self { shape, sharding }
    }

    /// Returns the global shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Returns the sharding spec.
    pub fn sharding(&self) -> &ShardingSpec {
        &self.sharding
    }
}

impl Display for ShardedShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.shape, self.sharding)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
