//! Backend-neutral GPU context object.
//!
//! Every component receives a `&dyn GpuApi` instead of reaching for process-wide function
//! pointers. Enum arguments (`target`, `pname`, `mode`, ...) are raw GL enums taken from
//! the `glow` constants so both backends agree on their meaning.

use std::collections::BTreeSet;
use std::num::NonZeroU32;

macro_rules! handle {
    ($(#[$m:meta])* $name:ident, $native:ident) => {
        $(#[$m])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub NonZeroU32);

        impl From<glow::$native> for $name {
            fn from(n: glow::$native) -> Self {
                Self(n.0)
            }
        }

        impl From<$name> for glow::$native {
            fn from(h: $name) -> Self {
                glow::$native(h.0)
            }
        }
    };
}

handle!(
    /// Texture object.
    TextureId,
    NativeTexture
);
handle!(
    /// Buffer object.
    BufferId,
    NativeBuffer
);
handle!(
    /// Shader object.
    ShaderId,
    NativeShader
);
handle!(
    /// Linked (or linking) program object.
    ProgramId,
    NativeProgram
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttribLocation(pub u32);

/// What the current context can do, probed once at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuCaps {
    pub major: u32,
    pub minor: u32,
    pub is_es: bool,
    /// Value for the `#version` directive of generated shaders.
    pub glsl_version: &'static str,
    pub supports_npot: bool,
    pub supports_unpack_row_length: bool,
    /// `glBufferStorage` + mapping entry points were all resolved.
    pub supports_persistent_map: bool,
    /// `glFenceSync` family was resolved.
    pub supports_fences: bool,
    pub extensions: BTreeSet<String>,
}

impl GpuCaps {
    /// Derives capabilities from the context version and extension list.
    pub fn detect(major: u32, minor: u32, is_es: bool, extensions: BTreeSet<String>) -> Self {
        let has = |e: &str| extensions.contains(e);
        let supports_npot = is_es
            || has("GL_ARB_texture_non_power_of_two")
            || has("GL_APPLE_texture_2D_limited_npot");
        let supports_unpack_row_length = if is_es {
            major >= 3 || has("GL_EXT_unpack_subimage")
        } else {
            true
        };
        let glsl_version = if is_es { "100" } else { "120" };
        Self {
            major,
            minor,
            is_es,
            glsl_version,
            supports_npot,
            supports_unpack_row_length,
            supports_persistent_map: false,
            supports_fences: false,
            extensions,
        }
    }

    pub fn has_extension(&self, name: &str) -> bool {
        self.extensions.contains(name)
    }

    /// Desktop GL needs 2.0 for GLSL; every GLES 2+ context has it.
    pub fn supports_shaders(&self) -> bool {
        self.is_es || self.major >= 2
    }

    /// Single/dual channel textures are `RED`/`RG` from GL 3.0 / GLES 3.0, `LUMINANCE`
    /// before that.
    pub fn has_red_textures(&self) -> bool {
        self.major >= 3 || self.has_extension("GL_ARB_texture_rg") || self.has_extension("GL_EXT_texture_rg")
    }
}

/// The GL entry points used by the compositor.
///
/// Methods mirror the GL calls one to one. Object creation is fallible and reports the
/// driver message; everything else follows GL's fire-and-forget model.
pub trait GpuApi {
    fn caps(&self) -> &GpuCaps;

    // ---- textures ----
    fn create_texture(&self) -> Result<TextureId, String>;
    fn delete_texture(&self, texture: TextureId);
    fn active_texture(&self, unit: u32);
    fn bind_texture(&self, target: u32, texture: Option<TextureId>);
    fn tex_parameter_i32(&self, target: u32, pname: u32, value: i32);
    #[allow(clippy::too_many_arguments)]
    fn tex_image_2d(
        &self,
        target: u32,
        internal_format: i32,
        width: i32,
        height: i32,
        format: u32,
        ty: u32,
        pixels: Option<&[u8]>,
    );
    #[allow(clippy::too_many_arguments)]
    fn tex_sub_image_2d(
        &self,
        target: u32,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        format: u32,
        ty: u32,
        pixels: &[u8],
    );
    fn pixel_store_i32(&self, pname: u32, value: i32);

    // ---- buffers ----
    fn create_buffer(&self) -> Result<BufferId, String>;
    fn delete_buffer(&self, buffer: BufferId);
    fn bind_buffer(&self, target: u32, buffer: Option<BufferId>);
    fn buffer_data_u8_slice(&self, target: u32, data: &[u8], usage: u32);

    // ---- shaders & programs ----
    fn create_shader(&self, kind: u32) -> Result<ShaderId, String>;
    fn shader_source(&self, shader: ShaderId, source: &str);
    fn compile_shader(&self, shader: ShaderId);
    fn get_shader_compile_status(&self, shader: ShaderId) -> bool;
    fn get_shader_info_log(&self, shader: ShaderId) -> String;
    fn delete_shader(&self, shader: ShaderId);
    fn create_program(&self) -> Result<ProgramId, String>;
    fn attach_shader(&self, program: ProgramId, shader: ShaderId);
    fn detach_shader(&self, program: ProgramId, shader: ShaderId);
    fn link_program(&self, program: ProgramId);
    fn get_program_link_status(&self, program: ProgramId) -> bool;
    fn get_program_info_log(&self, program: ProgramId) -> String;
    fn delete_program(&self, program: ProgramId);
    fn use_program(&self, program: Option<ProgramId>);

    // ---- locations & uniforms ----
    fn get_uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation>;
    fn get_attrib_location(&self, program: ProgramId, name: &str) -> Option<AttribLocation>;
    fn uniform_1_i32(&self, location: UniformLocation, x: i32);
    fn uniform_4_f32(&self, location: UniformLocation, x: f32, y: f32, z: f32, w: f32);
    fn uniform_matrix_4_f32_slice(&self, location: UniformLocation, value: &[f32]);
    fn enable_vertex_attrib_array(&self, index: AttribLocation);
    /// Tightly packed `GL_FLOAT` attribute sourced from the bound `ARRAY_BUFFER`.
    fn vertex_attrib_pointer_f32(&self, index: AttribLocation, size: i32);

    // ---- drawing & state ----
    fn draw_elements(&self, mode: u32, count: i32, element_type: u32, offset: i32);
    fn draw_arrays(&self, mode: u32, first: i32, count: i32);
    fn enable(&self, cap: u32);
    fn disable(&self, cap: u32);
    fn depth_mask(&self, flag: bool);
    fn blend_func(&self, src: u32, dst: u32);
    fn clear_color(&self, r: f32, g: f32, b: f32, a: f32);
    fn clear(&self, mask: u32);
    fn finish(&self);
}

/// Bytes per pixel of an upload `format`/`ty` pair; 0 when unknown.
pub fn bytes_per_pixel(format: u32, ty: u32) -> usize {
    if ty != glow::UNSIGNED_BYTE {
        return 0;
    }
    match format {
        glow::RED | glow::LUMINANCE | glow::ALPHA => 1,
        glow::RG | glow::LUMINANCE_ALPHA => 2,
        glow::RGB => 3,
        glow::RGBA | glow::BGRA => 4,
        _ => 0,
    }
}
