//! Texture converters: turn one picture format into a fixed set of bound textures.
//!
//! A [`ConverterRegistry`] probes its backends in priority order. Hardware backends are
//! registered ahead of the generic software upload, which accepts every supported chroma
//! and therefore always terminates the search.

use std::fmt;

use glcompose_core::{CompositorError, Picture, PicturePool, VideoFormat, PLANE_MAX};
use glcompose_geometry::{PlaneScale, TexSize};

use crate::generic::GenericProbe;
use crate::gpu::{GpuApi, ProgramId, TextureId};

/// Storage of one texture plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TexturePlane {
    pub scale: PlaneScale,
    pub internal_format: i32,
    pub format: u32,
    pub ty: u32,
}

/// Texture setup a converter asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureLayout {
    pub target: u32,
    pub planes: Vec<TexturePlane>,
    /// The converter creates and configures its own texture objects.
    pub handles_texture_gen: bool,
}

impl TextureLayout {
    pub fn tex_count(&self) -> usize {
        self.planes.len()
    }

    pub fn scales(&self) -> Vec<PlaneScale> {
        self.planes.iter().map(|p| p.scale).collect()
    }
}

/// One selected conversion backend.
///
/// Instances are created by a [`ConverterProbe`] for a single program and released with
/// the program.
pub trait TextureConverter: fmt::Debug {
    fn name(&self) -> &'static str;

    fn layout(&self) -> &TextureLayout;

    /// Format the converter works in; its chroma may differ from the requested one.
    fn format(&self) -> &VideoFormat;

    fn fragment_shader(&self) -> &str;

    /// Allocates storage for freshly generated textures.
    fn allocate_textures(
        &mut self,
        gl: &dyn GpuApi,
        textures: &[TextureId],
        sizes: &[TexSize],
    ) -> Result<(), CompositorError> {
        let layout = self.layout();
        for ((tex, size), plane) in textures.iter().zip(sizes).zip(&layout.planes) {
            gl.bind_texture(layout.target, Some(*tex));
            gl.tex_image_2d(
                layout.target,
                plane.internal_format,
                size.width as i32,
                size.height as i32,
                plane.format,
                plane.ty,
                None,
            );
        }
        Ok(())
    }

    /// Converter-specific picture pool. `None` lets the caller allocate from the format.
    fn pool(
        &mut self,
        _gl: &dyn GpuApi,
        _requested: usize,
    ) -> Option<Result<PicturePool, CompositorError>> {
        None
    }

    /// Uploads or binds `picture` into `textures`.
    ///
    /// With `plane_offsets`, the visible area is read starting at those byte offsets;
    /// otherwise whole planes are read from their origin. Calling it twice with the same
    /// inputs leaves the same GPU state.
    fn update(
        &mut self,
        gl: &dyn GpuApi,
        textures: &[TextureId],
        sizes: &[TexSize],
        picture: &Picture,
        plane_offsets: Option<&[usize]>,
    ) -> Result<(), CompositorError>;

    /// Resolves uniform locations once the program is linked.
    fn fetch_locations(&mut self, gl: &dyn GpuApi, program: ProgramId) -> Result<(), CompositorError>;

    /// Loads the converter's uniforms before each draw.
    fn prepare_shader(&self, gl: &dyn GpuApi, sizes: &[TexSize], alpha: f32);

    fn release(&mut self, _gl: &dyn GpuApi) {}
}

/// Factory for one converter backend.
pub trait ConverterProbe: fmt::Debug {
    fn name(&self) -> &'static str;

    /// Returns a converter for `format`, or `None` to decline.
    fn probe(&self, gl: &dyn GpuApi, format: &VideoFormat) -> Option<Box<dyn TextureConverter>>;
}

/// Ordered list of converter backends.
#[derive(Debug)]
pub struct ConverterRegistry {
    probes: Vec<Box<dyn ConverterProbe>>,
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConverterRegistry {
    /// Registry holding only the generic software backend.
    pub fn new() -> Self {
        Self {
            probes: vec![Box::new(GenericProbe)],
        }
    }

    /// Registers a backend ahead of every generic fallback.
    pub fn register<P: ConverterProbe + 'static>(&mut self, probe: P) {
        let generic_at = self.probes.len().saturating_sub(1);
        self.probes.insert(generic_at, Box::new(probe));
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.probes.iter().map(|p| p.name()).collect()
    }

    /// First converter accepting `format`.
    pub fn select(
        &self,
        gl: &dyn GpuApi,
        format: &VideoFormat,
    ) -> Result<Box<dyn TextureConverter>, CompositorError> {
        for probe in &self.probes {
            if let Some(conv) = probe.probe(gl, format) {
                let tex_count = conv.layout().tex_count();
                if tex_count == 0 || tex_count > PLANE_MAX {
                    tracing::warn!(backend = probe.name(), tex_count, "converter rejected");
                    continue;
                }
                tracing::debug!(
                    backend = probe.name(),
                    chroma = %format.chroma,
                    tex_count,
                    "texture converter selected"
                );
                return Ok(conv);
            }
        }
        Err(CompositorError::NoConverter(format.chroma.to_string()))
    }
}

/// Generates textures for `layout` and allocates their storage.
///
/// On failure every texture created here is deleted again.
pub fn gen_textures(
    gl: &dyn GpuApi,
    converter: &mut dyn TextureConverter,
    sizes: &[TexSize],
) -> Result<Vec<TextureId>, CompositorError> {
    let layout = converter.layout().clone();
    let mut textures = Vec::with_capacity(layout.tex_count());
    if !layout.handles_texture_gen {
        for _ in 0..layout.tex_count() {
            match gl.create_texture() {
                Ok(t) => textures.push(t),
                Err(e) => {
                    delete_textures(gl, &mut textures);
                    return Err(CompositorError::oom(format!("create_texture failed: {e}")));
                }
            }
        }
        for tex in &textures {
            gl.bind_texture(layout.target, Some(*tex));
            gl.tex_parameter_i32(layout.target, glow::TEXTURE_MIN_FILTER, glow::LINEAR as i32);
            gl.tex_parameter_i32(layout.target, glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);
            gl.tex_parameter_i32(layout.target, glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE as i32);
            gl.tex_parameter_i32(layout.target, glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE as i32);
        }
    }

    if let Err(e) = converter.allocate_textures(gl, &textures, sizes) {
        delete_textures(gl, &mut textures);
        return Err(e);
    }
    gl.bind_texture(layout.target, None);
    Ok(textures)
}

pub fn delete_textures(gl: &dyn GpuApi, textures: &mut Vec<TextureId>) {
    for tex in textures.drain(..) {
        gl.delete_texture(tex);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockFailures, MockGpu};
    use glcompose_core::Chroma;

    /// Claims NV12 only, like a zero-copy decoder backend would.
    #[derive(Debug)]
    struct Nv12Only;

    impl ConverterProbe for Nv12Only {
        fn name(&self) -> &'static str {
            "nv12-only"
        }

        fn probe(&self, gl: &dyn GpuApi, format: &VideoFormat) -> Option<Box<dyn TextureConverter>> {
            if format.chroma != Chroma::Nv12 {
                return None;
            }
            GenericProbe.probe(gl, format)
        }
    }

    #[test]
    fn generic_backend_is_always_last() {
        let mut reg = ConverterRegistry::new();
        reg.register(Nv12Only);
        assert_eq!(reg.names(), vec!["nv12-only", "generic"]);
    }

    #[test]
    fn every_chroma_finds_a_converter() {
        let gpu = MockGpu::new();
        let reg = ConverterRegistry::new();
        for chroma in Chroma::ALL {
            let conv = reg.select(&gpu, &VideoFormat::new(chroma, 16, 16)).unwrap();
            assert_eq!(conv.name(), "generic");
            assert!(conv.layout().tex_count() >= 1);
        }
    }

    #[test]
    fn gen_textures_allocates_each_plane() {
        let gpu = MockGpu::new();
        let reg = ConverterRegistry::new();
        let mut conv = reg.select(&gpu, &VideoFormat::new(Chroma::I420, 64, 32)).unwrap();
        let sizes = [TexSize::new(64, 32), TexSize::new(32, 16), TexSize::new(32, 16)];
        let textures = gen_textures(&gpu, conv.as_mut(), &sizes).unwrap();
        assert_eq!(textures.len(), 3);
        let chroma = gpu.texture(textures[1]).unwrap();
        assert_eq!((chroma.width, chroma.height), (32, 16));
    }

    #[test]
    fn gen_textures_cleans_up_on_failure() {
        let gpu = MockGpu::new();
        let reg = ConverterRegistry::new();
        let mut conv = reg.select(&gpu, &VideoFormat::new(Chroma::I420, 64, 32)).unwrap();
        gpu.set_failures(MockFailures {
            texture_budget: Some(2),
            ..Default::default()
        });
        let sizes = [TexSize::new(64, 32), TexSize::new(32, 16), TexSize::new(32, 16)];
        let err = gen_textures(&gpu, conv.as_mut(), &sizes).unwrap_err();
        assert_eq!(err.kind(), glcompose_core::ErrorKind::OutOfMemory);
        assert_eq!(gpu.live_textures(), 0);
    }
}
