//! Global tensor shapes and reshape-target specifications.
//!
//! A [`Shape`] is the logical (unsharded) extent of a tensor: an ordered sequence of
//! dimension sizes whose product is the total element count. Reshape *targets* are not
//! shapes yet — frameworks let callers write placeholder entries that are only resolved
//! against the input shape at inference time. [`TargetDim`] is the sum type for one such
//! entry, and [`resolve_target_shape`] turns a target specification into a concrete
//! [`Shape`] under the invariant `product(output) == product(input)`.
//!
//! # Signed target convention
//!
//! Graph attributes conventionally encode reshape targets as signed integers, mapped onto
//! [`TargetDim`] via [`TryFrom<i64>`]:
//!
//! | Attribute value | `TargetDim` | Meaning |
//! |---|---|---|
//! | `n > 0` | [`Size(n)`][TargetDim::Size] | Known dimension size |
//! | `0` | [`FromInput`][TargetDim::FromInput] | Copy the input dimension at this position |
//! | `-1` | [`Inferred`][TargetDim::Inferred] | Solve from the total element count |
//! | other | — | Rejected as [`ShapeError::InvalidTargetValue`] |
//!
//! At most one entry per target may be [`Inferred`][TargetDim::Inferred]: one division is
//! the only equation available, so a second unknown makes the target unsolvable. The same
//! variant covers dimensions that are symbolic (not yet known) at inference time — they are
//! placeholders to this resolver either way.

use std::fmt::{self, Display};

use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error type for shape construction, target resolution, and axis matching.
#[derive(Error, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ShapeError {
    /// Error returned when a shape contains a zero-size axis. Reshape over an empty tensor
    /// has no well-defined axis correspondence, so such shapes are rejected outright.
    #[error("shape {shape} has size 0 at axis #{axis}; zero-size axes cannot participate in reshape propagation")]
    ZeroSizeAxis { shape: Shape, axis: usize },

    /// Error returned when a target specification contains an explicit zero size.
    #[error("target shape entry #{index} has size 0; zero-size axes cannot participate in reshape propagation")]
    ZeroSizeTargetEntry { index: usize },

    /// Error returned when the input and output of a reshape disagree on element count.
    #[error("cannot reshape {input} into {output} because their element counts differ")]
    ElementCountMismatch { input: Shape, output: Shape },

    /// Error returned when a target specification contains more than one inferred entry.
    #[error("target shape entries #{first} and #{second} are both marked for inference; at most one dimension can be inferred")]
    MultipleInferredEntries { first: usize, second: usize },

    /// Error returned when the known target dimensions do not divide the input element count.
    #[error("cannot infer a dimension size: input element count {input_elements} is not divisible by the known target element count {known_elements}")]
    IndivisibleInference { input_elements: u64, known_elements: u64 },

    /// Error returned when a copy-from-input entry has no input dimension at its position.
    #[error("target shape entry #{index} copies the input dimension at the same position, but the input only has rank {rank}")]
    CopiedDimensionOutOfRange { index: usize, rank: usize },

    /// Error returned when a signed target value matches no entry of the convention
    /// (positive size, `0` to copy, `-1` to infer).
    #[error("invalid target shape value {value}; expected a positive size, 0 (copy the input dimension), or -1 (infer from the total element count)")]
    InvalidTargetValue { value: i64 },

    /// Error returned when the output descriptor handed to reverse inference does not have
    /// the reshape's target shape.
    #[error("output shape {output} does not match the reshape target {target}")]
    OutputTargetMismatch { output: Shape, target: Shape },

    /// Error returned when a recorded pre-reshape metadata shape lacks its leading sentinel.
    #[error("recorded pre-reshape metadata shape {shape} must start with a 0 sentinel entry")]
    MalformedRecordedShape { shape: Shape },

    /// Error returned when arithmetic overflows while computing element counts.
    #[error("overflow while {context}")]
    Overflow { context: String },
}

// ---------------------------------------------------------------------------
// Shape
// ---------------------------------------------------------------------------

/// Logical (global) shape of a tensor: its dimension sizes before any sharding is applied.
///
/// Dimensions are unsigned and concrete. Placeholder entries never appear here — they live
/// in target specifications ([`TargetDim`]) and are gone once [`resolve_target_shape`]
/// has run. Zero-size dimensions are representable (a recorded metadata shape uses a `0`
/// sentinel entry) but are rejected wherever a reshape correspondence is computed.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Shape {
    dimensions: Vec<u64>,
}

impl Shape {
    /// Creates a shape from its dimension sizes.
    pub fn new(dimensions: Vec<u64>) -> Self {
        Self { dimensions }
    }

    /// Creates the rank-0 (scalar) shape.
    pub fn scalar() -> Self {
        Self { dimensions: Vec::new() }
    }

    /// Returns the dimension sizes.
    pub fn dimensions(&self) -> &[u64] {
        self.dimensions.as_slice()
    }

    /// Returns the number of dimensions.
    pub fn rank(&self) -> usize {
        self.dimensions.len()
    }

    /// Returns the size of dimension `axis`, if valid.
    pub fn dimension(&self, axis: usize) -> Option<u64> {
        self.dimensions.get(axis).copied()
    }

    /// Returns the total number of elements (the product of all dimension sizes).
    ///
    /// The scalar shape has one element.
    pub fn element_count(&self) -> Result<u64, ShapeError> {
        self.dimensions.iter().try_fold(1u64, |count, &size| {
            count.checked_mul(size).ok_or_else(|| ShapeError::Overflow {
                context: format!("computing the element count of shape {self}"),
            })
        })
    }

    /// Returns the index of the first zero-size axis, if any.
    pub(crate) fn first_zero_axis(&self) -> Option<usize> {
        self.dimensions.iter().position(|&size| size == 0)
    }
}

impl From<Vec<u64>> for Shape {
    fn from(dimensions: Vec<u64>) -> Self {
        Self::new(dimensions)
    }
}

impl From<&[u64]> for Shape {
    fn from(dimensions: &[u64]) -> Self {
        Self::new(dimensions.to_vec())
    }
}

impl<const R: usize> From<[u64; R]> for Shape {
    fn from(dimensions: [u64; R]) -> Self {
        Self::new(dimensions.to_vec())
    }
}

impl Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (axis, size) in self.dimensions.iter().enumerate() {
            if axis > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{size}")?;
        }
        write!(f, "]")
    }
}

// ---------------------------------------------------------------------------
// Target specifications
// ---------------------------------------------------------------------------

/// One entry of a reshape target specification.
///
/// Targets may mix concrete sizes with placeholders; see the [module docs](self) for the
/// signed-integer convention this maps onto.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TargetDim {
    /// A concrete dimension size, known at inference time.
    Size(u64),

    /// Copy the size of the input dimension at the same position.
    FromInput,

    /// A placeholder resolved from the total element count: either an explicit "infer me"
    /// entry or a dimension that is still symbolic when inference runs.
    Inferred,
}

impl TryFrom<i64> for TargetDim {
    type Error = ShapeError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Self::Inferred),
            0 => Ok(Self::FromInput),
            size if size > 0 => Ok(Self::Size(size as u64)),
            _ => Err(ShapeError::InvalidTargetValue { value }),
        }
    }
}

impl Display for TargetDim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Size(size) => write!(f, "{size}"),
            Self::FromInput => write!(f, "0"),
            Self::Inferred => write!(f, "-1"),
        }
    }
}

/// Resolves a target specification against an input shape, producing the concrete output
/// shape of the reshape.
///
/// Copy-from-input entries are substituted positionally first; the single inferred entry
/// (if present) is then solved by dividing the input's element count by the product of all
/// known entries. A specification with no inferred entry must already multiply out to the
/// input's element count.
///
/// ```ignore
/// // [8, 4] reshaped with target [-1, 8] resolves to [4, 8].
/// let input = Shape::from([8, 4]);
/// let target = [TargetDim::Inferred, TargetDim::Size(8)];
/// assert_eq!(resolve_target_shape(&input, &target)?, Shape::from([4, 8]));
/// ```
pub fn resolve_target_shape(input: &Shape, target: &[TargetDim]) -> Result<Shape, ShapeError> {
    if let Some(axis) = input.first_zero_axis() {
        return Err(ShapeError::ZeroSizeAxis { shape: input.clone(), axis });
    }
    let input_elements = input.element_count()?;

    let mut resolved = Vec::with_capacity(target.len());
    let mut inferred_index = None;
    let mut known_elements = 1u64;
    for (index, entry) in target.iter().enumerate() {
        let size = match *entry {
            TargetDim::Size(0) => return Err(ShapeError::ZeroSizeTargetEntry { index }),
            TargetDim::Size(size) => size,
            TargetDim::FromInput => input
                .dimension(index)
                .ok_or(ShapeError::CopiedDimensionOutOfRange { index, rank: input.rank() })?,
            TargetDim::Inferred => {
                if let Some(first) = inferred_index {
                    return Err(ShapeError::MultipleInferredEntries { first, second: index });
                }
                inferred_index = Some(index);
                // Placeholder; overwritten below once the known product is complete.
                resolved.push(1);
                continue;
            }
        };
        known_elements = known_elements.checked_mul(size).ok_or_else(|| ShapeError::Overflow {
            context: "computing the known target element count".to_string(),
        })?;
        resolved.push(size);
    }

    match inferred_index {
        Some(index) => {
            if input_elements % known_elements != 0 {
                return Err(ShapeError::IndivisibleInference { input_elements, known_elements });
            }
            resolved[index] = input_elements / known_elements;
        }
        None if known_elements != input_elements => {
            return Err(ShapeError::ElementCountMismatch {
                input: input.clone(),
                output: Shape::new(resolved),
            });
        }
        None => {}
    }

    Ok(Shape::new(resolved))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_accessors() {
        let shape = Shape::from([8, 4]);
        assert_eq!(shape.rank(), 2);
        assert_eq!(shape.dimensions(), &[8, 4]);
        assert_eq!(shape.dimension(0), Some(8));
        assert_eq!(shape.dimension(2), None);
        assert_eq!(shape.element_count().unwrap(), 32);
        assert_eq!(Shape::scalar().rank(), 0);
        assert_eq!(Shape::scalar().element_count().unwrap(), 1);
    }

    #[test]
    fn test_shape_element_count_overflow() {
        let shape = Shape::from([u64::MAX, 2]);
        assert!(matches!(shape.element_count(), Err(ShapeError::Overflow { .. })));
    }

    #[test]
    fn test_shape_display() {
        assert_eq!(Shape::from([8, 4]).to_string(), "[8, 4]");
        assert_eq!(Shape::scalar().to_string(), "[]");
    }

    #[test]
    fn test_target_dim_from_signed() {
        assert_eq!(TargetDim::try_from(8), Ok(TargetDim::Size(8)));
        assert_eq!(TargetDim::try_from(0), Ok(TargetDim::FromInput));
        assert_eq!(TargetDim::try_from(-1), Ok(TargetDim::Inferred));
        assert!(matches!(TargetDim::try_from(-7), Err(ShapeError::InvalidTargetValue { value: -7 })));
    }

    #[test]
    fn test_resolve_concrete_target() {
        let input = Shape::from([8, 4]);
        let target = [TargetDim::Size(4), TargetDim::Size(8)];
        assert_eq!(resolve_target_shape(&input, &target).unwrap(), Shape::from([4, 8]));
    }

    #[test]
    fn test_resolve_inferred_entry() {
        let input = Shape::from([8, 4]);
        let target = [TargetDim::Inferred, TargetDim::Size(8)];
        assert_eq!(resolve_target_shape(&input, &target).unwrap(), Shape::from([4, 8]));

        let target = [TargetDim::Size(2), TargetDim::Inferred, TargetDim::Size(2)];
        assert_eq!(resolve_target_shape(&input, &target).unwrap(), Shape::from([2, 8, 2]));
    }

    #[test]
    fn test_resolve_copy_from_input() {
        let input = Shape::from([8, 4]);
        let target = [TargetDim::FromInput, TargetDim::Inferred];
        assert_eq!(resolve_target_shape(&input, &target).unwrap(), Shape::from([8, 4]));

        let target = [TargetDim::Size(2), TargetDim::FromInput, TargetDim::Inferred];
        assert_eq!(resolve_target_shape(&input, &target).unwrap(), Shape::from([2, 4, 4]));
    }

    #[test]
    fn test_resolve_copy_out_of_range() {
        let input = Shape::from([8, 4]);
        let target = [TargetDim::Size(32), TargetDim::Size(1), TargetDim::FromInput];
        assert!(matches!(
            resolve_target_shape(&input, &target),
            Err(ShapeError::CopiedDimensionOutOfRange { index: 2, rank: 2 }),
        ));
    }

    #[test]
    fn test_resolve_multiple_inferred_entries() {
        let input = Shape::from([8, 4]);
        let target = [TargetDim::Inferred, TargetDim::Inferred];
        assert!(matches!(
            resolve_target_shape(&input, &target),
            Err(ShapeError::MultipleInferredEntries { first: 0, second: 1 }),
        ));
    }

    #[test]
    fn test_resolve_indivisible_inference() {
        let input = Shape::from([8, 4]);
        let target = [TargetDim::Inferred, TargetDim::Size(5)];
        assert!(matches!(
            resolve_target_shape(&input, &target),
            Err(ShapeError::IndivisibleInference { input_elements: 32, known_elements: 5 }),
        ));
    }

    #[test]
    fn test_resolve_element_count_mismatch() {
        let input = Shape::from([8, 4]);
        let target = [TargetDim::Size(8), TargetDim::Size(8)];
        assert!(matches!(
            resolve_target_shape(&input, &target),
            Err(ShapeError::ElementCountMismatch { .. }),
        ));
    }

    #[test]
    fn test_resolve_rejects_zero_sizes() {
        let input = Shape::from([8, 0]);
        assert!(matches!(
            resolve_target_shape(&input, &[TargetDim::Inferred]),
            Err(ShapeError::ZeroSizeAxis { axis: 1, .. }),
        ));

        let input = Shape::from([8, 4]);
        let target = [TargetDim::Size(0), TargetDim::Inferred];
        assert!(matches!(
            resolve_target_shape(&input, &target),
            Err(ShapeError::ZeroSizeTargetEntry { index: 0 }),
        ));
    }

    #[test]
    fn test_resolve_scalar_input() {
        let input = Shape::scalar();
        assert_eq!(resolve_target_shape(&input, &[TargetDim::Inferred]).unwrap(), Shape::from([1]));
        assert_eq!(resolve_target_shape(&input, &[]).unwrap(), Shape::scalar());
    }
}
