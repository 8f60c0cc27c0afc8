//! Ray-casting related definitions and implementations.

pub use self::ray::{Ray, RayCast};

mod ray;
mod ray_aabb;
