//! Reshape sharding inference entry points.
//!
//! Each entry point assembles the same pipeline — resolve the target shape if necessary,
//! build the [axis correspondence](crate::correspondence), run the
//! [propagation rules](crate::propagation) in the appropriate direction — and packages
//! the result as a [`ShardingPropagation`]. They differ only in which side of the reshape
//! drives the propagation and in how the shapes are obtained:
//!
//! | Entry point | Driver | Target shape |
//! |---|---|---|
//! | [`infer_forward`] | input spec | concrete |
//! | [`infer_reverse`] | output spec | concrete, must equal the output's shape |
//! | [`infer_forward_dynamic`] | input spec | signed convention, resolved first |
//! | [`infer_gradient`] | output-gradient spec | recorded pre-reshape shape, sentinel stripped |
//! | [`infer_gradient_static`] | output-gradient spec | pre-reshape shape, taken verbatim |
//!
//! The returned input descriptors are *requirements*: when a requested sharding cannot
//! survive the reshape, the offending axes come back replicated, and the caller compares
//! against the original spec (see [`ShardingPropagation::requires_resharding`]) to decide
//! whether to insert a resharding step. See the [propagation
//! rules](crate::propagation) for when that happens.
//!
//! # Example
//!
//! ```ignore
//! let mesh = Mesh::new(vec![4])?;
//! let input = ShardedShape::new(
//!     Shape::from([32u64]),
//!     ShardingSpec::new(vec![AxisSharding::Sharded(0)]),
//! )?;
//! let result = infer_forward(&mesh, &input, &Shape::from([8u64, 4]))?;
//! // The split keeps the assignment on the outermost output axis:
//! // result.outputs()[0] is [8, 4] {axis0 -> mesh0, axis1 -> replicated}.
//! ```

use crate::correspondence::build_axis_groups;
use crate::errors::Error;
use crate::mesh::Mesh;
use crate::propagation::{propagate_sharding, Direction};
use crate::shape::{resolve_target_shape, Shape, ShapeError, TargetDim};
use crate::sharding::{ShardedShape, ShardingSpec};

// ---------------------------------------------------------------------------
// Result packaging
// ---------------------------------------------------------------------------

/// Result of one reshape sharding inference: the input descriptors the reshape requires
/// and the output descriptors it produces.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ShardingPropagation {
    inputs: Vec<ShardedShape>,
    outputs: Vec<ShardedShape>,
}

impl ShardingPropagation {
    /// Returns the input-side descriptors, in the entry point's argument order. Axes
    /// whose requested sharding was infeasible without resharding are replicated here.
    pub fn inputs(&self) -> &[ShardedShape] {
        &self.inputs
    }

    /// Returns the output-side descriptors.
    pub fn outputs(&self) -> &[ShardedShape] {
        &self.outputs
    }

    /// Returns `true` if any input requirement differs from the spec the caller
    /// originally held, meaning the reshape needs a resharding step first. `originals`
    /// must be in the same order as [`inputs`](Self::inputs).
    pub fn requires_resharding(&self, originals: &[&ShardingSpec]) -> bool {
        self.inputs
            .iter()
            .zip(originals)
            .any(|(input, original)| input.sharding() != *original)
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Infers the output sharding of reshaping `input` to the concrete `target` shape.
///
/// Returns one input requirement (on `input`'s shape) and one output descriptor (on
/// `target`).
pub fn infer_forward(
    mesh: &Mesh,
    input: &ShardedShape,
    target: &Shape,
) -> Result<ShardingPropagation, Error> {
    let groups = build_axis_groups(input.shape(), target)?;
    let outcome = propagate_sharding(
        mesh,
        &groups,
        input.shape(),
        target,
        input.sharding(),
        Direction::Forward,
    )?;
    let (requirement, derived) = outcome.into_parts();
    Ok(ShardingPropagation {
        inputs: vec![ShardedShape::new(input.shape().clone(), requirement)?],
        outputs: vec![ShardedShape::new(target.clone(), derived)?],
    })
}

/// Infers the input sharding of a reshape whose `output` spec is already fixed, e.g. by a
/// downstream consumer.
///
/// `input`'s own sharding is ignored; the derived input descriptor replaces it. `target`
/// must equal `output`'s shape, otherwise the call fails with
/// [`ShapeError::OutputTargetMismatch`].
pub fn infer_reverse(
    mesh: &Mesh,
    input: &ShardedShape,
    output: &ShardedShape,
    target: &Shape,
) -> Result<ShardingPropagation, Error> {
    if output.shape() != target {
        return Err(ShapeError::OutputTargetMismatch {
            output: output.shape().clone(),
            target: target.clone(),
        }
        .into());
    }
    let groups = build_axis_groups(input.shape(), target)?;
    let outcome = propagate_sharding(
        mesh,
        &groups,
        input.shape(),
        target,
        output.sharding(),
        Direction::Reverse,
    )?;
    let (requirement, derived) = outcome.into_parts();
    Ok(ShardingPropagation {
        inputs: vec![ShardedShape::new(input.shape().clone(), derived)?],
        outputs: vec![ShardedShape::new(target.clone(), requirement)?],
    })
}

/// Infers the output sharding of reshaping `input` to a target given in the signed
/// convention: positive entries are sizes, `0` copies the input dimension at the same
/// position, `-1` is inferred from the element count (see
/// [`resolve_target_shape`]).
pub fn infer_forward_dynamic(
    mesh: &Mesh,
    input: &ShardedShape,
    target: &[TargetDim],
) -> Result<ShardingPropagation, Error> {
    let resolved = resolve_target_shape(input.shape(), target)?;
    infer_forward(mesh, input, &resolved)
}

/// Propagates the output-gradient sharding back to the input gradient of a reshape.
///
/// `recorded` is the shape metadata cached by the forward pass: its dimensions are the
/// pre-reshape shape prefixed with a `0` sentinel, which is stripped here. Fails with
/// [`ShapeError::MalformedRecordedShape`] when the sentinel is missing. The result's
/// inputs are `recorded` passed through unchanged and the requirement on the
/// output-gradient; its single output is the input-gradient descriptor on the pre-reshape
/// shape.
pub fn infer_gradient(
    mesh: &Mesh,
    recorded: &ShardedShape,
    output_gradient: &ShardedShape,
) -> Result<ShardingPropagation, Error> {
    let pre_reshape = match recorded.shape().dimensions().split_first() {
        Some((&0, rest)) => Shape::from(rest),
        _ => {
            return Err(ShapeError::MalformedRecordedShape {
                shape: recorded.shape().clone(),
            }
            .into())
        }
    };
    infer_gradient_common(mesh, recorded, pre_reshape, output_gradient)
}

/// Same as [`infer_gradient`], for contexts where the pre-reshape shape is known at
/// compile time: `recorded`'s dimensions are taken verbatim, with no sentinel.
pub fn infer_gradient_static(
    mesh: &Mesh,
    recorded: &ShardedShape,
    output_gradient: &ShardedShape,
) -> Result<ShardingPropagation, Error> {
    infer_gradient_common(mesh, recorded, recorded.shape().clone(), output_gradient)
}

/// Shared tail of the gradient entry points: a reverse-direction propagation over the
/// correspondence between the pre-reshape shape and the output-gradient's shape.
fn infer_gradient_common(
    mesh: &Mesh,
    recorded: &ShardedShape,
    pre_reshape: Shape,
    output_gradient: &ShardedShape,
) -> Result<ShardingPropagation, Error> {
    let groups = build_axis_groups(&pre_reshape, output_gradient.shape())?;
    let outcome = propagate_sharding(
        mesh,
        &groups,
        &pre_reshape,
        output_gradient.shape(),
        output_gradient.sharding(),
        Direction::Reverse,
    )?;
    let (requirement, derived) = outcome.into_parts();
    Ok(ShardingPropagation {
        inputs: vec![
            recorded.clone(),
            ShardedShape::new(output_gradient.shape().clone(), requirement)?,
        ],
        outputs: vec![ShardedShape::new(pre_reshape, derived)?],
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
