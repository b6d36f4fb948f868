//! glcompose runtime (glow/OpenGL backend)
//
// Texture converters, shader programs, the overlay cache and the compositor that drives
// them. All GL access goes through the `GpuApi` context object; `glow_backend` is the
// only place that talks to a real driver.
//
// Windowing, context creation and decoding stay outside this crate.
#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_debug_implementations)]

pub mod compositor;
pub mod converter;
pub mod generic;
pub mod glow_backend;
pub mod gpu;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod overlay;
pub mod present;
pub mod program;

pub use compositor::{Compositor, OVERLAY_CHROMAS};
pub use converter::{
    gen_textures, ConverterProbe, ConverterRegistry, TextureConverter, TextureLayout, TexturePlane,
};
pub use generic::{yuv_to_rgb_matrix, GenericConverter, GenericProbe};
pub use glow_backend::GlowGpu;
pub use gpu::{
    AttribLocation, BufferId, GpuApi, GpuCaps, ProgramId, ShaderId, TextureId, UniformLocation,
};
pub use overlay::{OverlayBuffers, OverlayCache, OverlayTexture};
pub use present::{FrameCounter, NoopPresent, Present};
pub use program::{compile_program, vertex_shader_source, ShaderProgram};

pub use glcompose_core::CompositorError;
