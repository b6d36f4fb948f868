#![forbid(unsafe_code)]

//! glcompose core vocabulary.
//!
//! This crate is **contract-only**: no GL handles, no windowing. It defines what a
//! frame looks like (format, planes, overlay regions), how configuration is loaded,
//! and the error taxonomy shared by the geometry and runtime crates.
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_debug_implementations)]

pub mod config;
pub mod error;
pub mod format;
pub mod logging;
pub mod overlay;
pub mod picture;

pub use config::{CompositorConfig, ViewpointConfig};
pub use error::{CompositorError, ErrorKind};
pub use format::{
    Chroma, ColorSpace, Orientation, PlaneLayout, ProjectionMode, Rational, SourceRect, VideoFormat,
    PLANE_MAX,
};
pub use logging::{init_logging, LoggingConfig};
pub use overlay::{OverlayRegion, Subpicture};
pub use picture::{Picture, PictureData, PicturePool, Plane, SurfaceHandle, PICTURE_POOL_MAX};
