//! A bounding volume hierarchy stored as a flat array of nodes.

pub use bvh_build::{voxel_primitives, BvhBuildError};
pub use bvh_traverse::Nodes;
pub use bvh_tree::{Bvh, BvhNode, BvhNodeKind};

mod bvh_build;
mod bvh_queries;
mod bvh_traverse;
mod bvh_tree;
mod bvh_validation;
