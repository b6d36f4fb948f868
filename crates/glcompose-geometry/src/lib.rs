#![forbid(unsafe_code)]

//! Projection geometry and viewpoint math.
//!
//! Pure functions only: no GL handles, no allocation of GPU objects. The runtime uploads
//! whatever these functions return.
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_debug_implementations)]

pub mod crop;
pub mod projection;
pub mod viewpoint;

pub use crop::{aligned_size, plane_crops, texture_sizes, PlaneCrop, PlaneScale, TexSize};
pub use projection::{build_geometry, CubemapPadding, Geometry, GeometryError};
pub use viewpoint::{
    orientation_matrix, Mat4, TransformMatrices, Viewpoint, ViewpointError, ViewpointTransform,
    FOV_DEGREES_DEFAULT, FOV_DEGREES_MAX, IDENTITY, SPHERE_RADIUS,
};
