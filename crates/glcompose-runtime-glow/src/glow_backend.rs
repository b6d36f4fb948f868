//! `GpuApi` on top of a real `glow::Context`.
//!
//! This is the only module that touches `unsafe`: every method forwards to the matching
//! glow call, which is sound as long as the context stays current on the calling thread.
#![allow(unsafe_code)]

use std::collections::BTreeSet;
use std::ffi::c_void;

use glow::HasContext;

use glcompose_core::CompositorError;

use crate::gpu::{
    AttribLocation, BufferId, GpuApi, GpuCaps, ProgramId, ShaderId, TextureId, UniformLocation,
};

/// Entry points the compositor cannot work without.
pub const CRITICAL_ENTRY_POINTS: &[&str] = &[
    "glActiveTexture",
    "glAttachShader",
    "glBindBuffer",
    "glBindTexture",
    "glBlendFunc",
    "glBufferData",
    "glClear",
    "glClearColor",
    "glCompileShader",
    "glCreateProgram",
    "glCreateShader",
    "glDeleteBuffers",
    "glDeleteProgram",
    "glDeleteShader",
    "glDeleteTextures",
    "glDepthMask",
    "glDetachShader",
    "glDisable",
    "glDrawArrays",
    "glDrawElements",
    "glEnable",
    "glEnableVertexAttribArray",
    "glFinish",
    "glGenBuffers",
    "glGenTextures",
    "glGetAttribLocation",
    "glGetIntegerv",
    "glGetProgramInfoLog",
    "glGetProgramiv",
    "glGetShaderInfoLog",
    "glGetShaderiv",
    "glGetString",
    "glGetUniformLocation",
    "glLinkProgram",
    "glPixelStorei",
    "glShaderSource",
    "glTexImage2D",
    "glTexParameteri",
    "glTexSubImage2D",
    "glUniform1i",
    "glUniform4f",
    "glUniformMatrix4fv",
    "glUseProgram",
    "glVertexAttribPointer",
];

/// Persistent-mapping path; all of them must resolve for it to be used.
pub const PERSISTENT_MAP_ENTRY_POINTS: &[&str] = &[
    "glBufferStorage",
    "glMapBufferRange",
    "glFlushMappedBufferRange",
    "glUnmapBuffer",
];

pub const FENCE_ENTRY_POINTS: &[&str] = &["glFenceSync", "glDeleteSync", "glClientWaitSync"];

/// Result of resolving the entry points through the windowing layer's loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryPointProbe {
    pub persistent_map: bool,
    pub fences: bool,
}

/// Resolves every entry point by name. A missing critical one is fatal; missing optional
/// ones only clear the matching capability.
pub fn probe_entry_points<F>(loader: &mut F) -> Result<EntryPointProbe, CompositorError>
where
    F: FnMut(&str) -> *const c_void,
{
    for &name in CRITICAL_ENTRY_POINTS {
        if loader(name).is_null() {
            return Err(CompositorError::MissingEntryPoint(name));
        }
    }

    let mut all_present = |names: &[&str]| {
        let missing: Vec<&str> = names.iter().copied().filter(|n| loader(n).is_null()).collect();
        if !missing.is_empty() {
            tracing::warn!(?missing, "optional GL entry points unavailable, using synchronous uploads");
        }
        missing.is_empty()
    };
    let persistent_map = all_present(PERSISTENT_MAP_ENTRY_POINTS);
    let fences = all_present(FENCE_ENTRY_POINTS);
    Ok(EntryPointProbe {
        persistent_map,
        fences,
    })
}

pub struct GlowGpu {
    gl: glow::Context,
    caps: GpuCaps,
}

impl std::fmt::Debug for GlowGpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlowGpu")
            .field("caps", &self.caps)
            .field("gl", &"<glow context>")
            .finish()
    }
}

impl GlowGpu {
    /// Builds the backend from the windowing layer's function loader.
    ///
    /// # Safety
    /// A GL context must be current on this thread, and `loader` must return valid
    /// function pointers (or null) for that context. Every later call on the returned
    /// value must happen with the same context current.
    pub unsafe fn new<F>(mut loader: F) -> Result<Self, CompositorError>
    where
        F: FnMut(&str) -> *const c_void,
    {
        let probe = probe_entry_points(&mut loader)?;
        let gl = glow::Context::from_loader_function(loader);

        let version = gl.version();
        if !version.is_embedded && version.major < 2 {
            return Err(CompositorError::Unsupported(format!(
                "OpenGL {}.{} has no shader support",
                version.major, version.minor
            )));
        }

        let extensions: BTreeSet<String> = gl.supported_extensions().iter().cloned().collect();
        let mut caps = GpuCaps::detect(version.major, version.minor, version.is_embedded, extensions);
        caps.supports_persistent_map = probe.persistent_map;
        caps.supports_fences = probe.fences;
        if !caps.supports_npot {
            tracing::warn!("no NPOT texture support, textures will be rounded to powers of two");
        }
        tracing::debug!(
            major = caps.major,
            minor = caps.minor,
            es = caps.is_es,
            vendor = %version.vendor_info,
            "GL context ready"
        );
        Ok(Self { gl, caps })
    }

    pub fn context(&self) -> &glow::Context {
        &self.gl
    }
}

fn uniform(loc: UniformLocation) -> glow::NativeUniformLocation {
    glow::NativeUniformLocation(loc.0)
}

impl GpuApi for GlowGpu {
    fn caps(&self) -> &GpuCaps {
        &self.caps
    }

    fn create_texture(&self) -> Result<TextureId, String> {
        unsafe { self.gl.create_texture().map(TextureId::from) }
    }

    fn delete_texture(&self, texture: TextureId) {
        unsafe { self.gl.delete_texture(texture.into()) }
    }

    fn active_texture(&self, unit: u32) {
        unsafe { self.gl.active_texture(unit) }
    }

    fn bind_texture(&self, target: u32, texture: Option<TextureId>) {
        unsafe { self.gl.bind_texture(target, texture.map(Into::into)) }
    }

    fn tex_parameter_i32(&self, target: u32, pname: u32, value: i32) {
        unsafe { self.gl.tex_parameter_i32(target, pname, value) }
    }

    fn tex_image_2d(
        &self,
        target: u32,
        internal_format: i32,
        width: i32,
        height: i32,
        format: u32,
        ty: u32,
        pixels: Option<&[u8]>,
    ) {
        unsafe {
            self.gl
                .tex_image_2d(target, 0, internal_format, width, height, 0, format, ty, pixels)
        }
    }

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
    ) {
        unsafe {
            self.gl.tex_sub_image_2d(
                target,
                0,
                x,
                y,
                width,
                height,
                format,
                ty,
                glow::PixelUnpackData::Slice(pixels),
            )
        }
    }

    fn pixel_store_i32(&self, pname: u32, value: i32) {
        unsafe { self.gl.pixel_store_i32(pname, value) }
    }

    fn create_buffer(&self) -> Result<BufferId, String> {
        unsafe { self.gl.create_buffer().map(BufferId::from) }
    }

    fn delete_buffer(&self, buffer: BufferId) {
        unsafe { self.gl.delete_buffer(buffer.into()) }
    }

    fn bind_buffer(&self, target: u32, buffer: Option<BufferId>) {
        unsafe { self.gl.bind_buffer(target, buffer.map(Into::into)) }
    }

    fn buffer_data_u8_slice(&self, target: u32, data: &[u8], usage: u32) {
        unsafe { self.gl.buffer_data_u8_slice(target, data, usage) }
    }

    fn create_shader(&self, kind: u32) -> Result<ShaderId, String> {
        unsafe { self.gl.create_shader(kind).map(ShaderId::from) }
    }

    fn shader_source(&self, shader: ShaderId, source: &str) {
        unsafe { self.gl.shader_source(shader.into(), source) }
    }

    fn compile_shader(&self, shader: ShaderId) {
        unsafe { self.gl.compile_shader(shader.into()) }
    }

    fn get_shader_compile_status(&self, shader: ShaderId) -> bool {
        unsafe { self.gl.get_shader_compile_status(shader.into()) }
    }

    fn get_shader_info_log(&self, shader: ShaderId) -> String {
        unsafe { self.gl.get_shader_info_log(shader.into()) }
    }

    fn delete_shader(&self, shader: ShaderId) {
        unsafe { self.gl.delete_shader(shader.into()) }
    }

    fn create_program(&self) -> Result<ProgramId, String> {
        unsafe { self.gl.create_program().map(ProgramId::from) }
    }

    fn attach_shader(&self, program: ProgramId, shader: ShaderId) {
        unsafe { self.gl.attach_shader(program.into(), shader.into()) }
    }

    fn detach_shader(&self, program: ProgramId, shader: ShaderId) {
        unsafe { self.gl.detach_shader(program.into(), shader.into()) }
    }

    fn link_program(&self, program: ProgramId) {
        unsafe { self.gl.link_program(program.into()) }
    }

    fn get_program_link_status(&self, program: ProgramId) -> bool {
        unsafe { self.gl.get_program_link_status(program.into()) }
    }

    fn get_program_info_log(&self, program: ProgramId) -> String {
        unsafe { self.gl.get_program_info_log(program.into()) }
    }

    fn delete_program(&self, program: ProgramId) {
        unsafe { self.gl.delete_program(program.into()) }
    }

    fn use_program(&self, program: Option<ProgramId>) {
        unsafe { self.gl.use_program(program.map(Into::into)) }
    }

    fn get_uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        unsafe {
            self.gl
                .get_uniform_location(program.into(), name)
                .map(|l| UniformLocation(l.0))
        }
    }

    fn get_attrib_location(&self, program: ProgramId, name: &str) -> Option<AttribLocation> {
        unsafe { self.gl.get_attrib_location(program.into(), name).map(AttribLocation) }
    }

    fn uniform_1_i32(&self, location: UniformLocation, x: i32) {
        unsafe { self.gl.uniform_1_i32(Some(&uniform(location)), x) }
    }

    fn uniform_4_f32(&self, location: UniformLocation, x: f32, y: f32, z: f32, w: f32) {
        unsafe { self.gl.uniform_4_f32(Some(&uniform(location)), x, y, z, w) }
    }

    fn uniform_matrix_4_f32_slice(&self, location: UniformLocation, value: &[f32]) {
        unsafe {
            self.gl
                .uniform_matrix_4_f32_slice(Some(&uniform(location)), false, value)
        }
    }

    fn enable_vertex_attrib_array(&self, index: AttribLocation) {
        unsafe { self.gl.enable_vertex_attrib_array(index.0) }
    }

    fn vertex_attrib_pointer_f32(&self, index: AttribLocation, size: i32) {
        unsafe {
            self.gl
                .vertex_attrib_pointer_f32(index.0, size, glow::FLOAT, false, 0, 0)
        }
    }

    fn draw_elements(&self, mode: u32, count: i32, element_type: u32, offset: i32) {
        unsafe { self.gl.draw_elements(mode, count, element_type, offset) }
    }

    fn draw_arrays(&self, mode: u32, first: i32, count: i32) {
        unsafe { self.gl.draw_arrays(mode, first, count) }
    }

    fn enable(&self, cap: u32) {
        unsafe { self.gl.enable(cap) }
    }

    fn disable(&self, cap: u32) {
        unsafe { self.gl.disable(cap) }
    }

    fn depth_mask(&self, flag: bool) {
        unsafe { self.gl.depth_mask(flag) }
    }

    fn blend_func(&self, src: u32, dst: u32) {
        unsafe { self.gl.blend_func(src, dst) }
    }

    fn clear_color(&self, r: f32, g: f32, b: f32, a: f32) {
        unsafe { self.gl.clear_color(r, g, b, a) }
    }

    fn clear(&self, mask: u32) {
        unsafe { self.gl.clear(mask) }
    }

    fn finish(&self) {
        unsafe { self.gl.finish() }
    }
}
