/*!
voxel-bvh
=========

**voxel-bvh** is a linear bounding-volume-hierarchy over axis-aligned
bounding boxes, intended for any-hit ray occlusion queries against large
static sets of unit voxels.

*/

#![deny(non_camel_case_types)]
#![deny(unused_parens)]
#![deny(non_upper_case_globals)]
#![deny(unused_results)]
#![warn(missing_docs)]
#![warn(unused_imports)]
#![allow(missing_copy_implementations)]
#![allow(clippy::module_inception)]

#[cfg(feature = "serde-serialize")]
#[macro_use]
extern crate serde;
#[macro_use]
extern crate approx;
extern crate num_traits as num;

pub extern crate nalgebra as na;

pub mod bounding_volume;
pub mod partitioning;
pub mod query;

mod real {
    /// The scalar type used throughout this crate.
    pub use f32 as Real;
}

/// Aliases for the mathematical types used throughout this crate.
pub mod math {
    pub use super::real::*;
    pub use na::{Point3, Vector3};

    /// The dimension of the space.
    pub const DIM: usize = 3;

    /// The point type.
    pub use Point3 as Point;

    /// The vector type.
    pub use Vector3 as Vector;
}
