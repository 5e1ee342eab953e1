//! # rwx_math - Math primitives for the RWX interpreter
//!
//! Vectors, column-major matrices, quaternions and a total
//! matrix-to-transform decomposition used when placing scene nodes.

pub mod vector;
pub mod matrix;
pub mod quaternion;
pub mod transform;
pub mod bounds;

pub use vector::*;
pub use matrix::*;
pub use quaternion::*;
pub use transform::*;
pub use bounds::*;

/// Degrees to radians, for `rotate` and `rotatejointtm` angles
#[inline]
pub fn radians(degrees: f32) -> f32 {
    degrees.to_radians()
}
