//! The sharding propagation rules shared by every reshape entry point.
//!
//! One side of the reshape is the *driver*: its sharding spec is fixed (the input in
//! forward inference, the output in reverse and gradient inference) and the other side's
//! spec is *derived* from it, one [`AxisGroup`] at a time. Infeasibility is never an
//! error here — in the spirit of [Shardy's propagation][sdy-prop], when a requested
//! sharding cannot survive the reshape the engine downgrades the offending driver axes to
//! replicated in the *requirement* it returns, and the caller decides whether to insert a
//! resharding step.
//!
//! [sdy-prop]: https://openxla.org/shardy/propagation
//!
//! # Rules
//!
//! For each group, with the driver side oriented by [`Direction`]:
//!
//! - Only the outermost (leftmost) driver axis of a group may be sharded. A sharded
//!   non-outermost axis makes the whole group infeasible: every driver axis in the group
//!   is downgraded and the derived side stays replicated. No partial feasibility within a
//!   group.
//! - An outermost driver axis sharded along mesh dimension `k` carries its assignment to
//!   the outermost derived axis of the group, provided the shard factor (the size of mesh
//!   dimension `k`) evenly divides the outermost axis size on every multi-axis side of the
//!   group: the driver side when the group merges axes, the derived side when it splits
//!   them, both for compound groups. An identity group inherits unconditionally.
//! - A sharded axis whose group has no counterpart axes (a trailing size-1 axis) has
//!   nowhere to carry its assignment and is downgraded.
//!
//! Driver specs are validated against the mesh before any rule runs; derived specs are
//! re-validated afterwards, so inconsistent inputs surface as
//! [`ShardingError`](crate::sharding::ShardingError) rather than corrupt results.

use std::ops::Range;

use log::debug;

use crate::correspondence::AxisGroup;
use crate::mesh::Mesh;
use crate::shape::Shape;
use crate::sharding::{AxisSharding, ShardingError, ShardingSpec};

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

/// Orientation of one propagation pass over an axis-group list.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// The input side drives; the output spec is derived.
    Forward,
    /// The output side drives; the input spec is derived.
    Reverse,
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Result of one propagation pass: the (possibly downgraded) driver-side requirement and
/// the derived spec for the opposite side.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PropagationOutcome {
    driver_requirement: ShardingSpec,
    derived: ShardingSpec,
}

impl PropagationOutcome {
    /// Returns the driver-side spec the reshape can actually honor. Axes whose requested
    /// sharding was infeasible without resharding are replicated here.
    pub fn driver_requirement(&self) -> &ShardingSpec {
        &self.driver_requirement
    }

    /// Returns the derived spec for the non-driver side.
    pub fn derived(&self) -> &ShardingSpec {
        &self.derived
    }

    /// Splits this outcome into `(driver_requirement, derived)`.
    pub fn into_parts(self) -> (ShardingSpec, ShardingSpec) {
        (self.driver_requirement, self.derived)
    }
}

// ---------------------------------------------------------------------------
// Propagation
// ---------------------------------------------------------------------------

/// Propagates `driver` across `groups`, deriving the opposite side's spec.
///
/// `groups` must have been built by
/// [`build_axis_groups`](crate::correspondence::build_axis_groups) over exactly
/// `(input_shape, output_shape)`; `driver` describes the input side under
/// [`Direction::Forward`] and the output side under [`Direction::Reverse`].
pub fn propagate_sharding(
    mesh: &Mesh,
    groups: &[AxisGroup],
    input_shape: &Shape,
    output_shape: &Shape,
    driver: &ShardingSpec,
    direction: Direction,
) -> Result<PropagationOutcome, ShardingError> {
    let (driver_shape, derived_shape) = match direction {
        Direction::Forward => (input_shape, output_shape),
        Direction::Reverse => (output_shape, input_shape),
    };
    if driver.rank() != driver_shape.rank() {
        return Err(ShardingError::RankMismatch {
            spec_rank: driver.rank(),
            shape_rank: driver_shape.rank(),
        });
    }
    driver.validate_for_mesh(mesh)?;

    let mut requirement = driver.axes().to_vec();
    let mut derived = vec![AxisSharding::Replicated; derived_shape.rank()];
    for group in groups {
        let (driver_axes, derived_axes): (Range<usize>, Range<usize>) = match direction {
            Direction::Forward => (group.input_axes(), group.output_axes()),
            Direction::Reverse => (group.output_axes(), group.input_axes()),
        };
        if driver_axes.is_empty() {
            // Counterpart-only trivial group; its derived axes stay replicated.
            continue;
        }

        let outermost = driver_axes.start;
        let inner_sharded = driver_axes.clone().skip(1).any(|axis| requirement[axis].is_sharded());
        if inner_sharded {
            for axis in driver_axes.clone() {
                requirement[axis] = AxisSharding::Replicated;
            }
            debug!(
                "reshape {input_shape} -> {output_shape}: non-outermost sharded axis in {group}; \
                 group downgraded to replicated",
            );
            continue;
        }

        let Some(mesh_dim) = requirement[outermost].mesh_dim() else { continue };
        let factor = mesh.dimension_size(mesh_dim).ok_or(ShardingError::MeshDimensionOutOfRange {
            axis: outermost,
            mesh_dim,
            mesh_rank: mesh.rank(),
        })?;

        let feasible = !derived_axes.is_empty()
            && (driver_axes.len() == 1 || driver_shape.dimensions()[outermost] % factor == 0)
            && (derived_axes.len() == 1 || derived_shape.dimensions()[derived_axes.start] % factor == 0);
        if feasible {
            derived[derived_axes.start] = AxisSharding::Sharded(mesh_dim);
        } else {
            requirement[outermost] = AxisSharding::Replicated;
            debug!(
                "reshape {input_shape} -> {output_shape}: mesh dimension {mesh_dim} (factor \
                 {factor}) cannot stay on {group}; axis downgraded to replicated",
            );
        }
    }

    let derived = ShardingSpec::new(derived);
    derived.validate_for_mesh(mesh)?;
    Ok(PropagationOutcome { driver_requirement: ShardingSpec::new(requirement), derived })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correspondence::build_axis_groups;

    fn propagate(
        mesh_dims: &[u64],
        input: &[u64],
        output: &[u64],
        driver: ShardingSpec,
        direction: Direction,
    ) -> Result<PropagationOutcome, ShardingError> {
        let mesh = Mesh::new(mesh_dims.to_vec()).unwrap();
        let input = Shape::from(input);
        let output = Shape::from(output);
        let groups = build_axis_groups(&input, &output).unwrap();
        propagate_sharding(&mesh, &groups, &input, &output, &driver, direction)
    }

    fn spec(axes: &[AxisSharding]) -> ShardingSpec {
        ShardingSpec::new(axes.to_vec())
    }

    use crate::sharding::AxisSharding::{Replicated, Sharded};

    #[test]
    fn test_identity_inherits_unchanged() {
        let outcome = propagate(
            &[4, 2],
            &[8, 4],
            &[8, 4],
            spec(&[Sharded(0), Sharded(1)]),
            Direction::Forward,
        )
        .unwrap();
        assert_eq!(outcome.driver_requirement(), &spec(&[Sharded(0), Sharded(1)]));
        assert_eq!(outcome.derived(), &spec(&[Sharded(0), Sharded(1)]));
    }

    #[test]
    fn test_merge_outermost_sharded_is_feasible() {
        let outcome =
            propagate(&[4], &[8, 4], &[32], spec(&[Sharded(0), Replicated]), Direction::Forward).unwrap();
        assert_eq!(outcome.driver_requirement(), &spec(&[Sharded(0), Replicated]));
        assert_eq!(outcome.derived(), &spec(&[Sharded(0)]));
    }

    #[test]
    fn test_merge_inner_sharded_downgrades_group() {
        let outcome =
            propagate(&[4], &[8, 4], &[32], spec(&[Replicated, Sharded(0)]), Direction::Forward).unwrap();
        assert_eq!(outcome.driver_requirement(), &spec(&[Replicated, Replicated]));
        assert_eq!(outcome.derived(), &spec(&[Replicated]));
    }

    #[test]
    fn test_merge_inner_sharded_downgrades_outermost_too() {
        // Conservative policy: no partial feasibility inside a group.
        let outcome =
            propagate(&[4, 2], &[8, 4], &[32], spec(&[Sharded(0), Sharded(1)]), Direction::Forward).unwrap();
        assert_eq!(outcome.driver_requirement(), &spec(&[Replicated, Replicated]));
        assert_eq!(outcome.derived(), &spec(&[Replicated]));
    }

    #[test]
    fn test_merge_factor_must_divide_outer_axis() {
        // Factor 3 divides the merged total 24 but not the outer axis size 8.
        let outcome =
            propagate(&[3], &[8, 3], &[24], spec(&[Sharded(0), Replicated]), Direction::Forward).unwrap();
        assert_eq!(outcome.driver_requirement(), &spec(&[Replicated, Replicated]));
        assert_eq!(outcome.derived(), &spec(&[Replicated]));
    }

    #[test]
    fn test_split_feasible() {
        let outcome = propagate(&[4], &[32], &[8, 4], spec(&[Sharded(0)]), Direction::Forward).unwrap();
        assert_eq!(outcome.driver_requirement(), &spec(&[Sharded(0)]));
        assert_eq!(outcome.derived(), &spec(&[Sharded(0), Replicated]));
    }

    #[test]
    fn test_split_non_divisible_downgrades() {
        let outcome = propagate(&[5], &[32], &[8, 4], spec(&[Sharded(0)]), Direction::Forward).unwrap();
        assert_eq!(outcome.driver_requirement(), &spec(&[Replicated]));
        assert_eq!(outcome.derived(), &spec(&[Replicated, Replicated]));
    }

    #[test]
    fn test_split_replicated_input_stays_replicated() {
        let outcome = propagate(&[4], &[32], &[8, 4], spec(&[Replicated]), Direction::Forward).unwrap();
        assert_eq!(outcome.driver_requirement(), &spec(&[Replicated]));
        assert_eq!(outcome.derived(), &spec(&[Replicated, Replicated]));
    }

    #[test]
    fn test_compound_checks_both_sides() {
        // [4, 6] -> [6, 4]: factor 2 divides both outermost sizes.
        let outcome =
            propagate(&[2], &[4, 6], &[6, 4], spec(&[Sharded(0), Replicated]), Direction::Forward).unwrap();
        assert_eq!(outcome.driver_requirement(), &spec(&[Sharded(0), Replicated]));
        assert_eq!(outcome.derived(), &spec(&[Sharded(0), Replicated]));

        // Factor 3 divides the derived outermost size 6 but not the driver outermost 4.
        let outcome =
            propagate(&[3], &[4, 6], &[6, 4], spec(&[Sharded(0), Replicated]), Direction::Forward).unwrap();
        assert_eq!(outcome.driver_requirement(), &spec(&[Replicated, Replicated]));
        assert_eq!(outcome.derived(), &spec(&[Replicated, Replicated]));
    }

    #[test]
    fn test_trailing_one_sided_groups() {
        // The trailing size-1 input axis has no counterpart; its sharding cannot survive.
        let outcome =
            propagate(&[4, 1], &[4, 1], &[4], spec(&[Sharded(0), Sharded(1)]), Direction::Forward).unwrap();
        assert_eq!(outcome.driver_requirement(), &spec(&[Sharded(0), Replicated]));
        assert_eq!(outcome.derived(), &spec(&[Sharded(0)]));

        // Trailing output axes simply come out replicated.
        let outcome = propagate(&[4], &[4], &[4, 1, 1], spec(&[Sharded(0)]), Direction::Forward).unwrap();
        assert_eq!(outcome.derived(), &spec(&[Sharded(0), Replicated, Replicated]));
    }

    #[test]
    fn test_reverse_split_mirrors_merge() {
        // Reverse over a split group: the outermost output axis drives the input axis.
        let outcome =
            propagate(&[4], &[32], &[8, 4], spec(&[Sharded(0), Replicated]), Direction::Reverse).unwrap();
        assert_eq!(outcome.driver_requirement(), &spec(&[Sharded(0), Replicated]));
        assert_eq!(outcome.derived(), &spec(&[Sharded(0)]));

        // A sharded inner output axis downgrades the whole group.
        let outcome =
            propagate(&[4], &[32], &[8, 4], spec(&[Replicated, Sharded(0)]), Direction::Reverse).unwrap();
        assert_eq!(outcome.driver_requirement(), &spec(&[Replicated, Replicated]));
        assert_eq!(outcome.derived(), &spec(&[Replicated]));
    }

    #[test]
    fn test_reverse_merge_mirrors_split() {
        // Reverse over a merge group: the output sharding lands on the outermost input
        // axis when the factor divides its size.
        let outcome =
            propagate(&[4], &[8, 4], &[32], spec(&[Sharded(0)]), Direction::Reverse).unwrap();
        assert_eq!(outcome.driver_requirement(), &spec(&[Sharded(0)]));
        assert_eq!(outcome.derived(), &spec(&[Sharded(0), Replicated]));

        let outcome = propagate(&[5], &[8, 4], &[32], spec(&[Sharded(0)]), Direction::Reverse).unwrap();
        assert_eq!(outcome.driver_requirement(), &spec(&[Replicated]));
        assert_eq!(outcome.derived(), &spec(&[Replicated, Replicated]));
    }

    #[test]
    fn test_driver_spec_validation() {
        assert!(matches!(
            propagate(&[4], &[8, 4], &[32], spec(&[Sharded(0), Sharded(0)]), Direction::Forward),
            Err(ShardingError::DuplicateMeshDimension { mesh_dim: 0, .. }),
        ));
        assert!(matches!(
            propagate(&[4], &[8, 4], &[32], spec(&[Sharded(3), Replicated]), Direction::Forward),
            Err(ShardingError::MeshDimensionOutOfRange { mesh_dim: 3, .. }),
        ));
        assert!(matches!(
            propagate(&[4], &[8, 4], &[32], spec(&[Sharded(0)]), Direction::Forward),
            Err(ShardingError::RankMismatch { spec_rank: 1, shape_rank: 2 }),
        ));
    }

    #[test]
    fn test_sharded_by_unit_mesh_dimension_survives() {
        // A mesh dimension of size 1 divides everything; the assignment is kept even
        // though it is physically equivalent to replication.
        let outcome = propagate(&[1], &[32], &[8, 4], spec(&[Sharded(0)]), Direction::Forward).unwrap();
        assert_eq!(outcome.driver_requirement(), &spec(&[Sharded(0)]));
        assert_eq!(outcome.derived(), &spec(&[Sharded(0), Replicated]));
    }
}
