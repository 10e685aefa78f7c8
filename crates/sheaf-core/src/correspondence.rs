//! Axis correspondence between the two sides of a reshape.
//!
//! Reshape never permutes elements, so the input and output shapes can be reconciled
//! left-to-right: contiguous runs of input axes map onto contiguous runs of output axes
//! with equal element-count products. [`build_axis_groups`] computes that partition, and
//! the propagation rules in [`crate::propagation`] reason about one [`AxisGroup`] at a
//! time. The same grouping idea appears as *reassociation indices* on MLIR's
//! [`tensor.collapse_shape`][mlir-collapse] / `tensor.expand_shape` operations, which
//! restrict themselves to the merge/split cases; a general reshape also produces compound
//! groups.
//!
//! [mlir-collapse]: https://mlir.llvm.org/docs/Dialects/TensorOps/#tensorcollapse_shape-tensorcollapseshapeop
//!
//! # Algorithm
//!
//! Two cursors walk the shape vectors, each carrying a running product of the dimensions
//! consumed since the last group boundary. Equal products close a group; otherwise the
//! side with the smaller product consumes its next axis. With equal totals (validated up
//! front) the walk always terminates with both sides consumed, except for trailing size-1
//! axes, which close one-sided trivial groups of their own.
//!
//! ```ignore
//! // [2, 3, 4] -> [6, 4] produces two groups:
//! //   merge    {input axes 0..2, output axis 0}   (2 * 3 == 6)
//! //   identity {input axis 2,    output axis 1}   (4 == 4)
//! let groups = build_axis_groups(&Shape::from([2, 3, 4]), &Shape::from([6, 4]))?;
//! ```

use std::fmt::{self, Display};
use std::ops::Range;

use log::trace;

use crate::shape::{Shape, ShapeError};

// ---------------------------------------------------------------------------
// Axis groups
// ---------------------------------------------------------------------------

/// Classification of an [`AxisGroup`] by how many axes it covers on each side.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AxisGroupKind {
    /// One input axis maps to one output axis of the same size. One-sided trivial groups
    /// (a trailing size-1 axis with no counterpart) also classify as identity.
    Identity,
    /// Several input axes collapse into one output axis.
    Merge,
    /// One input axis expands into several output axes.
    Split,
    /// Several input axes map onto several output axes: a merge and a split meeting inside
    /// one group, as in `[4, 6] -> [6, 4]`.
    Compound,
}

/// A contiguous run of input axes matched to a contiguous run of output axes with equal
/// element-count products.
///
/// Groups are built fresh for every propagation call and never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AxisGroup {
    input_axes: Range<usize>,
    output_axes: Range<usize>,
}

impl AxisGroup {
    /// Creates an axis group from the axis ranges it covers.
    pub fn new(input_axes: Range<usize>, output_axes: Range<usize>) -> Self {
        Self { input_axes, output_axes }
    }

    /// Returns the input axes this group covers.
    pub fn input_axes(&self) -> Range<usize> {
        self.input_axes.clone()
    }

    /// Returns the output axes this group covers.
    pub fn output_axes(&self) -> Range<usize> {
        self.output_axes.clone()
    }

    /// Classifies this group by its axis counts.
    pub fn kind(&self) -> AxisGroupKind {
        match (self.input_axes.len(), self.output_axes.len()) {
            (2.., 2..) => AxisGroupKind::Compound,
            (2.., _) => AxisGroupKind::Merge,
            (_, 2..) => AxisGroupKind::Split,
            _ => AxisGroupKind::Identity,
        }
    }
}

impl Display for AxisGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}({}..{} -> {}..{})",
            self.kind(),
            self.input_axes.start,
            self.input_axes.end,
            self.output_axes.start,
            self.output_axes.end,
        )
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builds the ordered axis-group list for reshaping `input` into `output`.
///
/// The returned groups cover all input axes exactly once and all output axes exactly once,
/// in order. Fails with [`ShapeError::ElementCountMismatch`] when the two shapes disagree
/// on element count and with [`ShapeError::ZeroSizeAxis`] when either side contains a
/// zero-size axis (an empty tensor has no well-defined correspondence).
pub fn build_axis_groups(input: &Shape, output: &Shape) -> Result<Vec<AxisGroup>, ShapeError> {
    if let Some(axis) = input.first_zero_axis() {
        return Err(ShapeError::ZeroSizeAxis { shape: input.clone(), axis });
    }
    if let Some(axis) = output.first_zero_axis() {
        return Err(ShapeError::ZeroSizeAxis { shape: output.clone(), axis });
    }
    if input.element_count()? != output.element_count()? {
        return Err(ShapeError::ElementCountMismatch { input: input.clone(), output: output.clone() });
    }

    let input_dims = input.dimensions();
    let output_dims = output.dimensions();
    let mut groups = Vec::new();
    let mut i = 0;
    let mut j = 0;
    while i < input_dims.len() && j < output_dims.len() {
        let group_start = (i, j);
        let mut input_product = input_dims[i];
        let mut output_product = output_dims[j];
        i += 1;
        j += 1;
        while input_product != output_product {
            if input_product < output_product {
                let dim = input_dims.get(i).copied().ok_or_else(|| ShapeError::ElementCountMismatch {
                    input: input.clone(),
                    output: output.clone(),
                })?;
                input_product = input_product.checked_mul(dim).ok_or_else(|| ShapeError::Overflow {
                    context: "accumulating the input-side running product".to_string(),
                })?;
                i += 1;
            } else {
                let dim = output_dims.get(j).copied().ok_or_else(|| ShapeError::ElementCountMismatch {
                    input: input.clone(),
                    output: output.clone(),
                })?;
                output_product = output_product.checked_mul(dim).ok_or_else(|| ShapeError::Overflow {
                    context: "accumulating the output-side running product".to_string(),
                })?;
                j += 1;
            }
        }
        groups.push(AxisGroup::new(group_start.0..i, group_start.1..j));
    }

    // Whatever remains multiplies to one (the totals matched), so each trailing axis
    // closes a trivial one-sided group.
    while i < input_dims.len() {
        groups.push(AxisGroup::new(i..i + 1, j..j));
        i += 1;
    }
    while j < output_dims.len() {
        groups.push(AxisGroup::new(i..i, j..j + 1));
        j += 1;
    }

    trace!("reshape {input} -> {output}: {} axis group(s)", groups.len());
    Ok(groups)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
