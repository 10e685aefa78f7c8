pub use sheaf_core as core;

pub use sheaf_core::correspondence::build_axis_groups;
pub use sheaf_core::correspondence::AxisGroup;
pub use sheaf_core::correspondence::AxisGroupKind;
pub use sheaf_core::errors::Error;
pub use sheaf_core::mesh::Mesh;
pub use sheaf_core::propagation::Direction;
pub use sheaf_core::propagation::PropagationOutcome;
pub use sheaf_core::reshape::infer_forward;
pub use sheaf_core::reshape::infer_forward_dynamic;
pub use sheaf_core::reshape::infer_gradient;
pub use sheaf_core::reshape::infer_gradient_static;
pub use sheaf_core::reshape::infer_reverse;
pub use sheaf_core::reshape::ShardingPropagation;
pub use sheaf_core::shape::resolve_target_shape;
pub use sheaf_core::shape::Shape;
pub use sheaf_core::shape::TargetDim;
pub use sheaf_core::sharding::AxisSharding;
pub use sheaf_core::sharding::ShardedShape;
pub use sheaf_core::sharding::ShardingSpec;
