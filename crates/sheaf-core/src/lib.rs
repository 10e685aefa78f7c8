pub mod correspondence;
pub mod errors;
pub mod mesh;
pub mod propagation;
pub mod reshape;
pub mod shape;
pub mod sharding;
