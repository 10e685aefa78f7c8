//! Crate-wide error type aggregating the per-module error enums.

use thiserror::Error;

use crate::mesh::MeshError;
use crate::shape::ShapeError;
use crate::sharding::ShardingError;

/// Any error a reshape inference entry point can return.
///
/// Note that an infeasible sharding is *not* an error: the entry points report it by
/// downgrading the offending axes to replicated in the returned specs. The variants here
/// cover malformed inputs only.
#[derive(Error, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Error {
    /// Error returned when a mesh is malformed.
    #[error("{0}")]
    Mesh(#[from] MeshError),

    /// Error returned when shapes are malformed or inconsistent with one another.
    #[error("{0}")]
    Shape(#[from] ShapeError),

    /// Error returned when a sharding spec is malformed or inconsistent with its mesh or
    /// shape.
    #[error("{0}")]
    Sharding(#[from] ShardingError),
}
