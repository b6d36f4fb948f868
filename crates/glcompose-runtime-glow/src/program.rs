//! Shader program build/link and the location table.

use std::fmt::Write as _;

use glcompose_core::CompositorError;
use glcompose_geometry::TransformMatrices;

use crate::converter::TextureConverter;
use crate::gpu::{AttribLocation, GpuApi, GpuCaps, ProgramId, UniformLocation};

/// Uniform names of the transform matrices, in `TransformMatrices::named` order.
pub const MATRIX_UNIFORMS: [&str; 6] = [
    "OrientationMatrix",
    "ProjectionMatrix",
    "ZRotMatrix",
    "YRotMatrix",
    "XRotMatrix",
    "ZoomMatrix",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationKind {
    Uniform,
    Attribute,
}

impl LocationKind {
    fn label(self) -> &'static str {
        match self {
            LocationKind::Uniform => "uniform",
            LocationKind::Attribute => "attribute",
        }
    }
}

/// Locations every program must expose for `tex_count` planes.
pub fn required_locations(tex_count: usize) -> Vec<(String, LocationKind)> {
    let mut table: Vec<(String, LocationKind)> = MATRIX_UNIFORMS
        .iter()
        .map(|n| (n.to_string(), LocationKind::Uniform))
        .collect();
    table.push(("VertexPosition".into(), LocationKind::Attribute));
    for i in 0..tex_count {
        table.push((format!("MultiTexCoord{i}"), LocationKind::Attribute));
    }
    table
}

/// Projection-agnostic vertex shader with one texcoord per plane.
pub fn vertex_shader_source(caps: &GpuCaps, tex_count: usize) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "#version {}", caps.glsl_version);
    if caps.is_es {
        s.push_str("precision highp float;\n");
    }
    for i in 0..tex_count {
        let _ = writeln!(s, "varying vec2 TexCoord{i};");
        let _ = writeln!(s, "attribute vec4 MultiTexCoord{i};");
    }
    s.push_str("attribute vec3 VertexPosition;\n");
    for name in MATRIX_UNIFORMS {
        let _ = writeln!(s, "uniform mat4 {name};");
    }
    s.push_str("void main() {\n");
    for i in 0..tex_count {
        let _ = writeln!(s, "    TexCoord{i} = vec4(OrientationMatrix * MultiTexCoord{i}).st;");
    }
    s.push_str(
        "    gl_Position = ProjectionMatrix * ZoomMatrix * ZRotMatrix * XRotMatrix * YRotMatrix\n\
         \x20       * vec4(VertexPosition, 1.0);\n}\n",
    );
    s
}

fn create_err(what: &str, e: String) -> CompositorError {
    CompositorError::fatal(format!("{what} failed: {e}"))
}

/// Compiles both stages and links them. Shader objects never outlive this call.
pub fn compile_program(
    gl: &dyn GpuApi,
    vert_src: &str,
    frag_src: &str,
) -> Result<ProgramId, CompositorError> {
    let vs = gl
        .create_shader(glow::VERTEX_SHADER)
        .map_err(|e| create_err("create_shader(VS)", e))?;
    gl.shader_source(vs, vert_src);
    gl.compile_shader(vs);
    if !gl.get_shader_compile_status(vs) {
        let log = gl.get_shader_info_log(vs);
        gl.delete_shader(vs);
        tracing::error!("vertex shader: {log}");
        return Err(CompositorError::VertexCompile(log));
    }

    let fs = match gl.create_shader(glow::FRAGMENT_SHADER) {
        Ok(fs) => fs,
        Err(e) => {
            gl.delete_shader(vs);
            return Err(create_err("create_shader(FS)", e));
        }
    };
    gl.shader_source(fs, frag_src);
    gl.compile_shader(fs);
    if !gl.get_shader_compile_status(fs) {
        let log = gl.get_shader_info_log(fs);
        gl.delete_shader(vs);
        gl.delete_shader(fs);
        tracing::error!("fragment shader: {log}");
        return Err(CompositorError::FragmentCompile(log));
    }

    let program = match gl.create_program() {
        Ok(p) => p,
        Err(e) => {
            gl.delete_shader(vs);
            gl.delete_shader(fs);
            return Err(create_err("create_program", e));
        }
    };
    gl.attach_shader(program, vs);
    gl.attach_shader(program, fs);
    gl.link_program(program);

    gl.detach_shader(program, vs);
    gl.detach_shader(program, fs);
    gl.delete_shader(vs);
    gl.delete_shader(fs);

    if !gl.get_program_link_status(program) {
        let log = gl.get_program_info_log(program);
        gl.delete_program(program);
        tracing::error!("program link: {log}");
        return Err(CompositorError::Link(log));
    }

    Ok(program)
}

/// A linked program, its converter and resolved locations.
#[derive(Debug)]
pub struct ShaderProgram {
    program: ProgramId,
    converter: Box<dyn TextureConverter>,
    matrices: [UniformLocation; 6],
    vertex_position: AttribLocation,
    tex_coords: Vec<AttribLocation>,
}

impl ShaderProgram {
    /// Links the converter's fragment shader against the vertex template.
    ///
    /// Takes ownership of `converter`; on failure it has been released and every GL
    /// object created here deleted.
    pub fn build(
        gl: &dyn GpuApi,
        mut converter: Box<dyn TextureConverter>,
    ) -> Result<Self, CompositorError> {
        match Self::link(gl, converter.as_mut()) {
            Ok((program, matrices, vertex_position, tex_coords)) => {
                tracing::debug!(
                    converter = converter.name(),
                    tex_count = tex_coords.len(),
                    "program linked"
                );
                Ok(Self {
                    program,
                    converter,
                    matrices,
                    vertex_position,
                    tex_coords,
                })
            }
            Err(e) => {
                converter.release(gl);
                Err(e)
            }
        }
    }

    #[allow(clippy::type_complexity)]
    fn link(
        gl: &dyn GpuApi,
        converter: &mut dyn TextureConverter,
    ) -> Result<(ProgramId, [UniformLocation; 6], AttribLocation, Vec<AttribLocation>), CompositorError>
    {
        let tex_count = converter.layout().tex_count();
        let vs = vertex_shader_source(gl.caps(), tex_count);
        let program = compile_program(gl, &vs, converter.fragment_shader())?;

        let resolved = Self::resolve(gl, program, tex_count).and_then(|r| {
            converter.fetch_locations(gl, program)?;
            Ok(r)
        });
        match resolved {
            Ok((matrices, vertex_position, tex_coords)) => {
                Ok((program, matrices, vertex_position, tex_coords))
            }
            Err(e) => {
                gl.delete_program(program);
                Err(e)
            }
        }
    }

    /// Walks the location table; the first miss is fatal.
    fn resolve(
        gl: &dyn GpuApi,
        program: ProgramId,
        tex_count: usize,
    ) -> Result<([UniformLocation; 6], AttribLocation, Vec<AttribLocation>), CompositorError> {
        let mut uniforms = Vec::with_capacity(MATRIX_UNIFORMS.len());
        let mut attribs = Vec::with_capacity(tex_count + 1);
        for (name, kind) in required_locations(tex_count) {
            let found = match kind {
                LocationKind::Uniform => gl.get_uniform_location(program, &name).map(|l| uniforms.push(l)),
                LocationKind::Attribute => gl.get_attrib_location(program, &name).map(|l| attribs.push(l)),
            };
            if found.is_none() {
                tracing::error!("unable to get {} location `{name}`", kind.label());
                return Err(CompositorError::MissingLocation {
                    kind: kind.label(),
                    name,
                });
            }
        }
        let matrices: [UniformLocation; 6] = uniforms
            .try_into()
            .map_err(|_| CompositorError::fatal("matrix uniform table mismatch"))?;
        let vertex_position = attribs.remove(0);
        Ok((matrices, vertex_position, attribs))
    }

    pub fn id(&self) -> ProgramId {
        self.program
    }

    pub fn converter(&self) -> &dyn TextureConverter {
        self.converter.as_ref()
    }

    pub fn converter_mut(&mut self) -> &mut dyn TextureConverter {
        self.converter.as_mut()
    }

    pub fn vertex_position(&self) -> AttribLocation {
        self.vertex_position
    }

    pub fn tex_coord(&self, plane: usize) -> Option<AttribLocation> {
        self.tex_coords.get(plane).copied()
    }

    pub fn use_program(&self, gl: &dyn GpuApi) {
        gl.use_program(Some(self.program));
    }

    pub fn load_matrices(&self, gl: &dyn GpuApi, m: &TransformMatrices) {
        for (loc, (_, value)) in self.matrices.iter().zip(m.named()) {
            gl.uniform_matrix_4_f32_slice(*loc, value);
        }
    }

    pub fn destroy(mut self, gl: &dyn GpuApi) {
        self.converter.release(gl);
        gl.delete_program(self.program);
    }
}
