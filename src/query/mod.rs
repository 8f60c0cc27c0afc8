//! Geometric queries.

pub use self::ray::{Ray, RayCast};

pub mod ray;
