//! Generic software converter: uploads CPU planes with `glTexSubImage2D`.
//!
//! Accepts every chroma of the catalogue, so it is the fallback of every registry.

use std::fmt::Write as _;

use glcompose_core::{Chroma, ColorSpace, CompositorError, Picture, Plane, VideoFormat};
use glcompose_geometry::{Mat4, PlaneScale, TexSize};

use crate::converter::{ConverterProbe, TextureConverter, TextureLayout, TexturePlane};
use crate::gpu::{bytes_per_pixel, GpuApi, GpuCaps, ProgramId, TextureId, UniformLocation};

#[derive(Debug, Clone, Copy)]
pub struct GenericProbe;

impl ConverterProbe for GenericProbe {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn probe(&self, gl: &dyn GpuApi, format: &VideoFormat) -> Option<Box<dyn TextureConverter>> {
        Some(Box::new(GenericConverter::new(gl.caps(), format)))
    }
}

/// Luma/chroma weights (Kr, Kb) of a colour space.
fn luma_weights(space: ColorSpace) -> (f32, f32) {
    match space {
        ColorSpace::Undefined | ColorSpace::Bt601 => (0.299, 0.114),
        ColorSpace::Bt709 => (0.2126, 0.0722),
        ColorSpace::Bt2020 => (0.2627, 0.0593),
    }
}

/// Column-major affine matrix taking `(y, u, v, 1)` samples to RGB.
pub fn yuv_to_rgb_matrix(space: ColorSpace, full_range: bool) -> Mat4 {
    let (kr, kb) = luma_weights(space);
    let kg = 1.0 - kr - kb;
    let cr_r = 2.0 * (1.0 - kr);
    let cb_b = 2.0 * (1.0 - kb);
    let cb_g = -2.0 * kb * (1.0 - kb) / kg;
    let cr_g = -2.0 * kr * (1.0 - kr) / kg;

    let (ys, cs, yoff) = if full_range {
        (1.0, 1.0, 0.0)
    } else {
        (255.0 / 219.0, 255.0 / 224.0, 16.0 / 255.0)
    };
    let coff = 128.0 / 255.0;

    #[rustfmt::skip]
    let m = [
        ys,  ys,            ys,            0.0,
        0.0, cs * cb_g,     cs * cb_b,     0.0,
        cs * cr_r, cs * cr_g, 0.0,         0.0,
        -(ys * yoff + cs * cr_r * coff),
        -(ys * yoff + cs * (cb_g + cr_g) * coff),
        -(ys * yoff + cs * cb_b * coff),
        1.0,
    ];
    m
}

/// Texture format and GLSL swizzle for a plane of `pixel_size` bytes.
fn plane_storage(caps: &GpuCaps, chroma: Chroma, pixel_size: u32) -> (i32, u32, &'static str) {
    let sized = !caps.is_es || caps.major >= 3;
    let red = caps.has_red_textures();
    match (chroma, pixel_size) {
        (Chroma::Rgba | Chroma::Bgra, _) => {
            ((if sized { glow::RGBA8 } else { glow::RGBA }) as i32, glow::RGBA, "rgba")
        }
        (Chroma::Rgb24, _) => ((if sized { glow::RGB8 } else { glow::RGB }) as i32, glow::RGB, "rgb"),
        // GLES2 with GL_EXT_texture_rg only takes the unsized RED/RG internal formats.
        (_, 2) if red => ((if sized { glow::RG8 } else { glow::RG }) as i32, glow::RG, "rg"),
        (_, 2) => (glow::LUMINANCE_ALPHA as i32, glow::LUMINANCE_ALPHA, "ra"),
        (_, _) if red => ((if sized { glow::R8 } else { glow::RED }) as i32, glow::RED, "r"),
        (_, _) => (glow::LUMINANCE as i32, glow::LUMINANCE, "r"),
    }
}

fn fragment_shader_source(caps: &GpuCaps, chroma: Chroma, swizzles: &[&str]) -> String {
    let n = swizzles.len();
    let mut s = String::new();
    let _ = writeln!(s, "#version {}", caps.glsl_version);
    if caps.is_es {
        s.push_str("precision highp float;\n");
    }
    for i in 0..n {
        let _ = writeln!(s, "uniform sampler2D Texture{i};");
        let _ = writeln!(s, "varying vec2 TexCoord{i};");
    }
    s.push_str("uniform vec4 FillColor;\n");
    if chroma.is_yuv() {
        s.push_str("uniform mat4 Coefficients;\n");
    }
    s.push_str("void main(void) {\n");

    let sample = |i: usize| format!("texture2D(Texture{i}, TexCoord{i}).{}", swizzles[i]);
    match chroma {
        Chroma::I420 | Chroma::I422 | Chroma::I444 => {
            let _ = writeln!(s, "    float y = {};", sample(0));
            let _ = writeln!(s, "    float u = {};", sample(1));
            let _ = writeln!(s, "    float v = {};", sample(2));
        }
        Chroma::Yv12 => {
            let _ = writeln!(s, "    float y = {};", sample(0));
            let _ = writeln!(s, "    float v = {};", sample(1));
            let _ = writeln!(s, "    float u = {};", sample(2));
        }
        Chroma::Nv12 | Chroma::Nv21 => {
            let _ = writeln!(s, "    float y = {};", sample(0));
            let _ = writeln!(s, "    vec2 uv = {};", sample(1));
            if chroma == Chroma::Nv12 {
                s.push_str("    float u = uv.x;\n    float v = uv.y;\n");
            } else {
                s.push_str("    float u = uv.y;\n    float v = uv.x;\n");
            }
        }
        Chroma::Rgba => {
            let _ = writeln!(s, "    vec4 result = {};", sample(0));
        }
        Chroma::Bgra => {
            // Uploaded as RGBA; swap red and blue back.
            let _ = writeln!(s, "    vec4 result = {}.bgra;", sample(0));
        }
        Chroma::Rgb24 => {
            let _ = writeln!(s, "    vec4 result = vec4({}, 1.0);", sample(0));
        }
        Chroma::Grey => {
            let _ = writeln!(s, "    float y = {};", sample(0));
            s.push_str("    vec4 result = vec4(y, y, y, 1.0);\n");
        }
    }
    if chroma.is_yuv() {
        s.push_str("    vec4 result = Coefficients * vec4(y, u, v, 1.0);\n");
        s.push_str("    result.a = 1.0;\n");
    }
    s.push_str("    gl_FragColor = result * FillColor;\n}\n");
    s
}

#[derive(Debug, Clone)]
struct Locations {
    textures: Vec<UniformLocation>,
    fill_color: UniformLocation,
    coefficients: Option<UniformLocation>,
}

#[derive(Debug)]
pub struct GenericConverter {
    format: VideoFormat,
    layout: TextureLayout,
    fragment: String,
    coefficients: Option<Mat4>,
    locations: Option<Locations>,
    supports_row_length: bool,
    /// Reused for rows that cannot be uploaded in place.
    staging: Vec<u8>,
}

impl GenericConverter {
    pub fn new(caps: &GpuCaps, format: &VideoFormat) -> Self {
        let chroma = format.chroma;
        let mut planes = Vec::with_capacity(chroma.plane_count());
        let mut swizzles = Vec::with_capacity(chroma.plane_count());
        for p in chroma.planes() {
            let (internal_format, fmt, swizzle) = plane_storage(caps, chroma, p.pixel_size);
            planes.push(TexturePlane {
                scale: PlaneScale::new(p.w, p.h),
                internal_format,
                format: fmt,
                ty: glow::UNSIGNED_BYTE,
            });
            swizzles.push(swizzle);
        }
        let fragment = fragment_shader_source(caps, chroma, &swizzles);
        let coefficients = chroma
            .is_yuv()
            .then(|| yuv_to_rgb_matrix(format.color_space, format.full_range));
        Self {
            format: format.clone(),
            layout: TextureLayout {
                target: glow::TEXTURE_2D,
                planes,
                handles_texture_gen: false,
            },
            fragment,
            coefficients,
            locations: None,
            supports_row_length: caps.supports_unpack_row_length,
            staging: Vec::new(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn upload_plane(
        &mut self,
        gl: &dyn GpuApi,
        index: usize,
        plane: &Plane,
        offset: usize,
        width: u32,
        height: u32,
    ) -> Result<(), CompositorError> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        let tp = self.layout.planes[index];
        let bpp = bytes_per_pixel(tp.format, tp.ty);
        if plane.pixel_pitch != bpp {
            return Err(CompositorError::frame(format!(
                "plane {index}: {} bytes per pixel, texture expects {bpp}",
                plane.pixel_pitch
            )));
        }

        let row_bytes = width as usize * bpp;
        let end = offset + plane.pitch * (height as usize - 1) + row_bytes;
        if end > plane.data.len() {
            return Err(CompositorError::frame(format!(
                "plane {index}: needs {end} bytes, has {}",
                plane.data.len()
            )));
        }

        let target = self.layout.target;
        let (w, h) = (width as i32, height as i32);
        if plane.pitch == row_bytes {
            gl.tex_sub_image_2d(target, 0, 0, w, h, tp.format, tp.ty, &plane.data[offset..end]);
        } else if self.supports_row_length && plane.pitch % bpp == 0 {
            gl.pixel_store_i32(glow::UNPACK_ROW_LENGTH, (plane.pitch / bpp) as i32);
            gl.tex_sub_image_2d(target, 0, 0, w, h, tp.format, tp.ty, &plane.data[offset..end]);
            gl.pixel_store_i32(glow::UNPACK_ROW_LENGTH, 0);
        } else {
            let len = row_bytes * height as usize;
            self.staging.clear();
            self.staging
                .try_reserve(len)
                .map_err(|e| CompositorError::oom(format!("staging buffer of {len} bytes: {e}")))?;
            for row in 0..height as usize {
                let start = offset + row * plane.pitch;
                self.staging.extend_from_slice(&plane.data[start..start + row_bytes]);
            }
            gl.tex_sub_image_2d(target, 0, 0, w, h, tp.format, tp.ty, &self.staging);
        }
        Ok(())
    }
}

impl TextureConverter for GenericConverter {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn layout(&self) -> &TextureLayout {
        &self.layout
    }

    fn format(&self) -> &VideoFormat {
        &self.format
    }

    fn fragment_shader(&self) -> &str {
        &self.fragment
    }

    fn update(
        &mut self,
        gl: &dyn GpuApi,
        textures: &[TextureId],
        sizes: &[TexSize],
        picture: &Picture,
        plane_offsets: Option<&[usize]>,
    ) -> Result<(), CompositorError> {
        let planes = picture
            .planes()
            .ok_or_else(|| CompositorError::frame("GPU surfaces need a hardware converter"))?;
        if picture.format.chroma != self.format.chroma {
            return Err(CompositorError::frame(format!(
                "picture is {}, converter expects {}",
                picture.format.chroma, self.format.chroma
            )));
        }
        let count = self.layout.tex_count();
        if planes.len() < count || textures.len() < count || sizes.len() < count {
            return Err(CompositorError::frame(format!(
                "expected {count} planes, got {}",
                planes.len()
            )));
        }

        gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
        for i in 0..count {
            let plane = &planes[i];
            let scale = self.layout.planes[i].scale;
            let (w, h, offset) = match plane_offsets {
                Some(offsets) => (
                    scale.w.apply(picture.format.visible_width),
                    scale.h.apply(picture.format.visible_height),
                    offsets.get(i).copied().unwrap_or(0),
                ),
                None => (
                    (plane.pitch / plane.pixel_pitch.max(1)) as u32,
                    plane.lines as u32,
                    0,
                ),
            };
            let w = w.min(sizes[i].width);
            let h = h.min(sizes[i].height).min(plane.lines as u32);

            gl.bind_texture(self.layout.target, Some(textures[i]));
            self.upload_plane(gl, i, plane, offset, w, h)?;
        }
        gl.bind_texture(self.layout.target, None);
        Ok(())
    }

    fn fetch_locations(&mut self, gl: &dyn GpuApi, program: ProgramId) -> Result<(), CompositorError> {
        let get = |name: String| {
            gl.get_uniform_location(program, &name)
                .ok_or(CompositorError::MissingLocation {
                    kind: "uniform",
                    name,
                })
        };
        let textures = (0..self.layout.tex_count())
            .map(|i| get(format!("Texture{i}")))
            .collect::<Result<Vec<_>, _>>()?;
        let fill_color = get("FillColor".into())?;
        let coefficients = match self.coefficients {
            Some(_) => Some(get("Coefficients".into())?),
            None => None,
        };
        self.locations = Some(Locations {
            textures,
            fill_color,
            coefficients,
        });
        Ok(())
    }

    fn prepare_shader(&self, gl: &dyn GpuApi, _sizes: &[TexSize], alpha: f32) {
        let Some(loc) = &self.locations else {
            tracing::trace!("prepare_shader before fetch_locations");
            return;
        };
        for (unit, tex) in loc.textures.iter().enumerate() {
            gl.uniform_1_i32(*tex, unit as i32);
        }
        gl.uniform_4_f32(loc.fill_color, 1.0, 1.0, 1.0, alpha);
        if let (Some(l), Some(m)) = (loc.coefficients, &self.coefficients) {
            gl.uniform_matrix_4_f32_slice(l, m);
        }
    }
}
