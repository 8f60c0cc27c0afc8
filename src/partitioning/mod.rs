//! Spatial partitioning tools.

pub use self::bvh::{voxel_primitives, Bvh, BvhBuildError, BvhNode, BvhNodeKind, Nodes};

pub mod bvh;
