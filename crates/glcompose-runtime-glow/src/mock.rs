//! In-memory `GpuApi` for headless tests.
//!
//! Tracks every live GL object so tests can assert that nothing leaks, records draw
//! calls and buffer uploads, and resolves uniform/attribute locations by scanning the
//! GLSL declarations of the attached shaders.

use std::cell::{Ref, RefCell};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::num::NonZeroU32;

use crate::gpu::{
    bytes_per_pixel, AttribLocation, BufferId, GpuApi, GpuCaps, ProgramId, ShaderId, TextureId,
    UniformLocation,
};

/// Failures to inject into the next calls.
#[derive(Debug, Clone, Default)]
pub struct MockFailures {
    /// Number of textures that can still be created before `create_texture` fails.
    pub texture_budget: Option<usize>,
    /// Same for buffers.
    pub buffer_budget: Option<usize>,
    pub fail_vertex_compile: bool,
    pub fail_fragment_compile: bool,
    pub fail_link: bool,
    /// Uniform or attribute names reported as missing after link.
    pub hidden_locations: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawKind {
    Elements { mode: u32, count: i32 },
    Arrays { mode: u32, first: i32, count: i32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub kind: DrawKind,
    pub program: Option<ProgramId>,
    pub blend: bool,
    /// Textures bound on units 0.. at draw time.
    pub textures: Vec<Option<TextureId>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MockTexture {
    pub width: i32,
    pub height: i32,
    pub internal_format: i32,
    pub uploads: usize,
}

#[derive(Debug, Clone, Default)]
struct MockBuffer {
    data: Vec<u8>,
    uploads: usize,
}

#[derive(Debug, Clone)]
struct MockShader {
    kind: u32,
    source: String,
}

#[derive(Debug, Clone, Default)]
struct MockProgram {
    attached: Vec<ShaderId>,
    linked: bool,
    uniforms: HashMap<String, UniformLocation>,
    attribs: HashMap<String, AttribLocation>,
}

#[derive(Debug, Default)]
struct MockState {
    next_id: u32,
    next_location: u32,
    failures: MockFailures,
    textures: HashMap<TextureId, MockTexture>,
    textures_created: usize,
    buffers: HashMap<BufferId, MockBuffer>,
    shaders: HashMap<ShaderId, MockShader>,
    programs: HashMap<ProgramId, MockProgram>,
    active_unit: usize,
    units: Vec<Option<TextureId>>,
    bound_buffers: HashMap<u32, BufferId>,
    current_program: Option<ProgramId>,
    uniform_names: HashMap<UniformLocation, String>,
    uniform4: HashMap<String, [f32; 4]>,
    uniform_i32: HashMap<String, i32>,
    pixel_store: HashMap<u32, i32>,
    enabled: HashSet<u32>,
    draws: Vec<DrawCall>,
    upload_errors: Vec<String>,
    finished: usize,
}

impl MockState {
    fn next_id(&mut self) -> NonZeroU32 {
        self.next_id += 1;
        NonZeroU32::new(self.next_id).unwrap_or(NonZeroU32::MIN)
    }

    fn bound_texture(&self) -> Option<TextureId> {
        self.units.get(self.active_unit).copied().flatten()
    }
}

#[derive(Debug)]
pub struct MockGpu {
    caps: GpuCaps,
    state: RefCell<MockState>,
}

impl Default for MockGpu {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGpu {
    /// Desktop GL 3.3 with NPOT support.
    pub fn new() -> Self {
        let mut caps = GpuCaps::detect(
            3,
            3,
            false,
            BTreeSet::from(["GL_ARB_texture_non_power_of_two".to_string()]),
        );
        caps.supports_persistent_map = true;
        caps.supports_fences = true;
        Self::with_caps(caps)
    }

    /// GL 2.1 without NPOT textures.
    pub fn without_npot() -> Self {
        Self::with_caps(GpuCaps::detect(2, 1, false, BTreeSet::new()))
    }

    pub fn with_caps(caps: GpuCaps) -> Self {
        Self {
            caps,
            state: RefCell::new(MockState::default()),
        }
    }

    pub fn set_failures(&self, failures: MockFailures) {
        self.state.borrow_mut().failures = failures;
    }

    pub fn live_textures(&self) -> usize {
        self.state.borrow().textures.len()
    }

    pub fn textures_created(&self) -> usize {
        self.state.borrow().textures_created
    }

    pub fn texture(&self, id: TextureId) -> Option<MockTexture> {
        self.state.borrow().textures.get(&id).copied()
    }

    pub fn live_buffers(&self) -> usize {
        self.state.borrow().buffers.len()
    }

    pub fn live_shaders(&self) -> usize {
        self.state.borrow().shaders.len()
    }

    pub fn live_programs(&self) -> usize {
        self.state.borrow().programs.len()
    }

    /// Number of live GL objects of any kind.
    pub fn live_objects(&self) -> usize {
        self.live_textures() + self.live_buffers() + self.live_shaders() + self.live_programs()
    }

    pub fn buffer_uploads(&self, id: BufferId) -> usize {
        self.state.borrow().buffers.get(&id).map_or(0, |b| b.uploads)
    }

    pub fn buffer_data(&self, id: BufferId) -> Vec<u8> {
        self.state
            .borrow()
            .buffers
            .get(&id)
            .map(|b| b.data.clone())
            .unwrap_or_default()
    }

    pub fn draws(&self) -> Ref<'_, Vec<DrawCall>> {
        Ref::map(self.state.borrow(), |s| &s.draws)
    }

    pub fn clear_draws(&self) {
        self.state.borrow_mut().draws.clear();
    }

    /// Last value written to a `vec4` uniform, by name.
    pub fn uniform4(&self, name: &str) -> Option<[f32; 4]> {
        self.state.borrow().uniform4.get(name).copied()
    }

    pub fn uniform_i32(&self, name: &str) -> Option<i32> {
        self.state.borrow().uniform_i32.get(name).copied()
    }

    pub fn is_enabled(&self, cap: u32) -> bool {
        self.state.borrow().enabled.contains(&cap)
    }

    /// Uploads that would have read out of bounds or written outside their texture.
    pub fn upload_errors(&self) -> Vec<String> {
        self.state.borrow().upload_errors.clone()
    }

    pub fn finish_calls(&self) -> usize {
        self.state.borrow().finished
    }
}

/// Names declared as `uniform`/`attribute` in GLSL sources.
fn declared_names(sources: &[&str], qualifier: &str) -> Vec<String> {
    let mut out = Vec::new();
    for src in sources {
        for stmt in src.split(';') {
            let tokens: Vec<&str> = stmt.split_whitespace().collect();
            let Some(pos) = tokens.iter().position(|t| *t == qualifier) else {
                continue;
            };
            if let Some(last) = tokens[pos..].last() {
                let name = last.split('[').next().unwrap_or(last);
                out.push(name.to_string());
            }
        }
    }
    out
}

impl GpuApi for MockGpu {
    fn caps(&self) -> &GpuCaps {
        &self.caps
    }

    fn create_texture(&self) -> Result<TextureId, String> {
        let mut s = self.state.borrow_mut();
        if let Some(budget) = s.failures.texture_budget.as_mut() {
            if *budget == 0 {
                return Err("mock: texture budget exhausted".into());
            }
            *budget -= 1;
        }
        let id = TextureId(s.next_id());
        s.textures.insert(id, MockTexture::default());
        s.textures_created += 1;
        Ok(id)
    }

    fn delete_texture(&self, texture: TextureId) {
        let mut s = self.state.borrow_mut();
        s.textures.remove(&texture);
        for unit in s.units.iter_mut() {
            if *unit == Some(texture) {
                *unit = None;
            }
        }
    }

    fn active_texture(&self, unit: u32) {
        let mut s = self.state.borrow_mut();
        let idx = unit.saturating_sub(glow::TEXTURE0) as usize;
        if s.units.len() <= idx {
            s.units.resize(idx + 1, None);
        }
        s.active_unit = idx;
    }

    fn bind_texture(&self, _target: u32, texture: Option<TextureId>) {
        let mut s = self.state.borrow_mut();
        let idx = s.active_unit;
        if s.units.len() <= idx {
            s.units.resize(idx + 1, None);
        }
        s.units[idx] = texture;
    }

    fn tex_parameter_i32(&self, _target: u32, _pname: u32, _value: i32) {}

    fn tex_image_2d(
        &self,
        _target: u32,
        internal_format: i32,
        width: i32,
        height: i32,
        format: u32,
        ty: u32,
        pixels: Option<&[u8]>,
    ) {
        let mut s = self.state.borrow_mut();
        let Some(id) = s.bound_texture() else {
            s.upload_errors.push("tex_image_2d without bound texture".into());
            return;
        };
        if let Some(px) = pixels {
            let need = width as usize * height as usize * bytes_per_pixel(format, ty);
            if px.len() < need {
                s.upload_errors.push(format!("tex_image_2d: {} < {need} bytes", px.len()));
            }
        }
        if let Some(t) = s.textures.get_mut(&id) {
            t.width = width;
            t.height = height;
            t.internal_format = internal_format;
        }
    }

    fn tex_sub_image_2d(
        &self,
        _target: u32,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        format: u32,
        ty: u32,
        pixels: &[u8],
    ) {
        let mut s = self.state.borrow_mut();
        let Some(id) = s.bound_texture() else {
            s.upload_errors.push("tex_sub_image_2d without bound texture".into());
            return;
        };
        let row_length = match s.pixel_store.get(&glow::UNPACK_ROW_LENGTH) {
            Some(&n) if n > 0 => n as usize,
            _ => width as usize,
        };
        let bpp = bytes_per_pixel(format, ty);
        let need = if height > 0 {
            (row_length * (height as usize - 1) + width as usize) * bpp
        } else {
            0
        };
        if pixels.len() < need {
            s.upload_errors.push(format!("tex_sub_image_2d: {} < {need} bytes", pixels.len()));
        }
        let Some(t) = s.textures.get(&id).copied() else {
            s.upload_errors.push("tex_sub_image_2d on deleted texture".into());
            return;
        };
        if x < 0 || y < 0 || x + width > t.width || y + height > t.height {
            s.upload_errors.push(format!(
                "tex_sub_image_2d: {width}x{height}+{x}+{y} outside {}x{}",
                t.width, t.height
            ));
        }
        if let Some(t) = s.textures.get_mut(&id) {
            t.uploads += 1;
        }
    }

    fn pixel_store_i32(&self, pname: u32, value: i32) {
        self.state.borrow_mut().pixel_store.insert(pname, value);
    }

    fn create_buffer(&self) -> Result<BufferId, String> {
        let mut s = self.state.borrow_mut();
        if let Some(budget) = s.failures.buffer_budget.as_mut() {
            if *budget == 0 {
                return Err("mock: buffer budget exhausted".into());
            }
            *budget -= 1;
        }
        let id = BufferId(s.next_id());
        s.buffers.insert(id, MockBuffer::default());
        Ok(id)
    }

    fn delete_buffer(&self, buffer: BufferId) {
        let mut s = self.state.borrow_mut();
        s.buffers.remove(&buffer);
        s.bound_buffers.retain(|_, b| *b != buffer);
    }

    fn bind_buffer(&self, target: u32, buffer: Option<BufferId>) {
        let mut s = self.state.borrow_mut();
        match buffer {
            Some(b) => s.bound_buffers.insert(target, b),
            None => s.bound_buffers.remove(&target),
        };
    }

    fn buffer_data_u8_slice(&self, target: u32, data: &[u8], _usage: u32) {
        let mut s = self.state.borrow_mut();
        let Some(id) = s.bound_buffers.get(&target).copied() else {
            s.upload_errors.push("buffer_data without bound buffer".into());
            return;
        };
        if let Some(b) = s.buffers.get_mut(&id) {
            b.data = data.to_vec();
            b.uploads += 1;
        }
    }

    fn create_shader(&self, kind: u32) -> Result<ShaderId, String> {
        let mut s = self.state.borrow_mut();
        let id = ShaderId(s.next_id());
        s.shaders.insert(
            id,
            MockShader {
                kind,
                source: String::new(),
            },
        );
        Ok(id)
    }

    fn shader_source(&self, shader: ShaderId, source: &str) {
        if let Some(sh) = self.state.borrow_mut().shaders.get_mut(&shader) {
            sh.source = source.to_string();
        }
    }

    fn compile_shader(&self, _shader: ShaderId) {}

    fn get_shader_compile_status(&self, shader: ShaderId) -> bool {
        let s = self.state.borrow();
        match s.shaders.get(&shader) {
            Some(sh) if sh.source.trim().is_empty() => false,
            Some(sh) if sh.kind == glow::VERTEX_SHADER => !s.failures.fail_vertex_compile,
            Some(sh) if sh.kind == glow::FRAGMENT_SHADER => !s.failures.fail_fragment_compile,
            _ => false,
        }
    }

    fn get_shader_info_log(&self, _shader: ShaderId) -> String {
        "mock: 0:1: syntax error".into()
    }

    fn delete_shader(&self, shader: ShaderId) {
        self.state.borrow_mut().shaders.remove(&shader);
    }

    fn create_program(&self) -> Result<ProgramId, String> {
        let mut s = self.state.borrow_mut();
        let id = ProgramId(s.next_id());
        s.programs.insert(id, MockProgram::default());
        Ok(id)
    }

    fn attach_shader(&self, program: ProgramId, shader: ShaderId) {
        if let Some(p) = self.state.borrow_mut().programs.get_mut(&program) {
            p.attached.push(shader);
        }
    }

    fn detach_shader(&self, program: ProgramId, shader: ShaderId) {
        if let Some(p) = self.state.borrow_mut().programs.get_mut(&program) {
            p.attached.retain(|s| *s != shader);
        }
    }

    fn link_program(&self, program: ProgramId) {
        let mut guard = self.state.borrow_mut();
        let s = &mut *guard;
        let Some(p) = s.programs.get(&program) else {
            return;
        };
        let sources: Vec<&str> = p
            .attached
            .iter()
            .filter_map(|id| s.shaders.get(id))
            .map(|sh| sh.source.as_str())
            .collect();
        let uniforms = declared_names(&sources, "uniform");
        let attribs = declared_names(&sources, "attribute");
        let linked = !s.failures.fail_link && sources.len() == 2;

        let mut uniform_map = HashMap::new();
        for name in uniforms {
            s.next_location += 1;
            let loc = UniformLocation(s.next_location);
            s.uniform_names.insert(loc, name.clone());
            uniform_map.insert(name, loc);
        }
        let attrib_map = attribs
            .into_iter()
            .enumerate()
            .map(|(i, name)| (name, AttribLocation(i as u32)))
            .collect();

        if let Some(p) = s.programs.get_mut(&program) {
            p.linked = linked;
            p.uniforms = uniform_map;
            p.attribs = attrib_map;
        }
    }

    fn get_program_link_status(&self, program: ProgramId) -> bool {
        self.state.borrow().programs.get(&program).is_some_and(|p| p.linked)
    }

    fn get_program_info_log(&self, _program: ProgramId) -> String {
        "mock: link failed".into()
    }

    fn delete_program(&self, program: ProgramId) {
        let mut s = self.state.borrow_mut();
        s.programs.remove(&program);
        if s.current_program == Some(program) {
            s.current_program = None;
        }
    }

    fn use_program(&self, program: Option<ProgramId>) {
        self.state.borrow_mut().current_program = program;
    }

    fn get_uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        let s = self.state.borrow();
        if s.failures.hidden_locations.iter().any(|h| h == name) {
            return None;
        }
        s.programs.get(&program)?.uniforms.get(name).copied()
    }

    fn get_attrib_location(&self, program: ProgramId, name: &str) -> Option<AttribLocation> {
        let s = self.state.borrow();
        if s.failures.hidden_locations.iter().any(|h| h == name) {
            return None;
        }
        s.programs.get(&program)?.attribs.get(name).copied()
    }

    fn uniform_1_i32(&self, location: UniformLocation, x: i32) {
        let mut s = self.state.borrow_mut();
        if let Some(name) = s.uniform_names.get(&location).cloned() {
            s.uniform_i32.insert(name, x);
        }
    }


    fn uniform_4_f32(&self, location: UniformLocation, x: f32, y: f32, z: f32, w: f32) {
        let mut s = self.state.borrow_mut();
        if let Some(name) = s.uniform_names.get(&location).cloned() {
            s.uniform4.insert(name, [x, y, z, w]);
        }
    }

    fn uniform_matrix_4_f32_slice(&self, _location: UniformLocation, value: &[f32]) {
        if value.len() != 16 {
            self.state
                .borrow_mut()
                .upload_errors
                .push(format!("mat4 uniform with {} floats", value.len()));
        }
    }

    fn enable_vertex_attrib_array(&self, _index: AttribLocation) {}

    fn vertex_attrib_pointer_f32(&self, _index: AttribLocation, _size: i32) {
        let mut s = self.state.borrow_mut();
        if !s.bound_buffers.contains_key(&glow::ARRAY_BUFFER) {
            s.upload_errors.push("attribute pointer without ARRAY_BUFFER".into());
        }
    }

    fn draw_elements(&self, mode: u32, count: i32, _element_type: u32, _offset: i32) {
        let mut s = self.state.borrow_mut();
        let call = DrawCall {
            kind: DrawKind::Elements { mode, count },
            program: s.current_program,
            blend: s.enabled.contains(&glow::BLEND),
            textures: s.units.clone(),
        };
        s.draws.push(call);
    }

    fn draw_arrays(&self, mode: u32, first: i32, count: i32) {
        let mut s = self.state.borrow_mut();
        let call = DrawCall {
            kind: DrawKind::Arrays { mode, first, count },
            program: s.current_program,
            blend: s.enabled.contains(&glow::BLEND),
            textures: s.units.clone(),
        };
        s.draws.push(call);
    }

    fn enable(&self, cap: u32) {
        self.state.borrow_mut().enabled.insert(cap);
    }

    fn disable(&self, cap: u32) {
        self.state.borrow_mut().enabled.remove(&cap);
    }

    fn depth_mask(&self, _flag: bool) {}

    fn blend_func(&self, _src: u32, _dst: u32) {}

    fn clear_color(&self, _r: f32, _g: f32, _b: f32, _a: f32) {}

    fn clear(&self, _mask: u32) {}

    fn finish(&self) {
        self.state.borrow_mut().finished += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VS: &str = "attribute vec3 VertexPosition;\nuniform mat4 ZoomMatrix;\nvoid main() {}";
    const FS: &str = "uniform sampler2D Texture0;\nuniform vec4 FillColor;\nvoid main() {}";

    fn link(gpu: &MockGpu) -> ProgramId {
        let vs = gpu.create_shader(glow::VERTEX_SHADER).unwrap();
        gpu.shader_source(vs, VS);
        let fs = gpu.create_shader(glow::FRAGMENT_SHADER).unwrap();
        gpu.shader_source(fs, FS);
        let p = gpu.create_program().unwrap();
        gpu.attach_shader(p, vs);
        gpu.attach_shader(p, fs);
        gpu.link_program(p);
        gpu.delete_shader(vs);
        gpu.delete_shader(fs);
        p
    }

    #[test]
    fn locations_come_from_declarations() {
        let gpu = MockGpu::new();
        let p = link(&gpu);
        assert!(gpu.get_program_link_status(p));
        assert!(gpu.get_uniform_location(p, "FillColor").is_some());
        assert!(gpu.get_uniform_location(p, "Texture0").is_some());
        assert!(gpu.get_uniform_location(p, "Texture1").is_none());
        assert!(gpu.get_attrib_location(p, "VertexPosition").is_some());
    }

    #[test]
    fn uniform_values_are_recorded_by_name() {
        let gpu = MockGpu::new();
        let p = link(&gpu);
        let loc = gpu.get_uniform_location(p, "FillColor").unwrap();
        gpu.uniform_4_f32(loc, 1.0, 1.0, 1.0, 0.5);
        assert_eq!(gpu.uniform4("FillColor"), Some([1.0, 1.0, 1.0, 0.5]));
    }

    #[test]
    fn texture_budget_fails_creation() {
        let gpu = MockGpu::new();
        gpu.set_failures(MockFailures {
            texture_budget: Some(1),
            ..Default::default()
        });
        let t = gpu.create_texture().unwrap();
        assert!(gpu.create_texture().is_err());
        gpu.delete_texture(t);
        assert_eq!(gpu.live_textures(), 0);
        assert_eq!(gpu.textures_created(), 1);
    }

    #[test]
    fn out_of_bounds_upload_is_reported() {
        let gpu = MockGpu::new();
        let t = gpu.create_texture().unwrap();
        gpu.bind_texture(glow::TEXTURE_2D, Some(t));
        gpu.tex_image_2d(glow::TEXTURE_2D, glow::RGBA as i32, 4, 4, glow::RGBA, glow::UNSIGNED_BYTE, None);
        gpu.tex_sub_image_2d(glow::TEXTURE_2D, 0, 0, 4, 4, glow::RGBA, glow::UNSIGNED_BYTE, &[0; 64]);
        assert!(gpu.upload_errors().is_empty());
        gpu.tex_sub_image_2d(glow::TEXTURE_2D, 2, 2, 4, 4, glow::RGBA, glow::UNSIGNED_BYTE, &[0; 8]);
        assert_eq!(gpu.upload_errors().len(), 2);
    }
}
