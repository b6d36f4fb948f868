//! The compositor: video program, overlay program, GPU buffers and the frame lifecycle.
//!
//! One frame is `prepare` (texture uploads) followed by `display` (draws + present).
//! Everything runs on the thread that owns the GL context.

use glcompose_core::{
    Chroma, CompositorConfig, CompositorError, Orientation, Picture, PicturePool, ProjectionMode,
    SourceRect, Subpicture, VideoFormat, PICTURE_POOL_MAX,
};
use glcompose_geometry::{
    build_geometry, plane_crops, texture_sizes, CubemapPadding, TexSize, TransformMatrices,
    Viewpoint, ViewpointTransform,
};

use crate::converter::{delete_textures, gen_textures, ConverterRegistry};
use crate::gpu::{BufferId, GpuApi, TextureId};
use crate::overlay::{OverlayBuffers, OverlayCache, OverlayTexture};
use crate::present::Present;
use crate::program::ShaderProgram;

/// Chromas accepted for overlay regions.
pub const OVERLAY_CHROMAS: [Chroma; 1] = [Chroma::Rgba];

#[derive(Debug)]
struct VideoBuffers {
    vertex: BufferId,
    index: BufferId,
    texcoords: Vec<BufferId>,
}

impl VideoBuffers {
    fn create(gl: &dyn GpuApi, tex_count: usize) -> Result<Self, CompositorError> {
        let mut created = Vec::with_capacity(tex_count + 2);
        for _ in 0..tex_count + 2 {
            match gl.create_buffer() {
                Ok(b) => created.push(b),
                Err(e) => {
                    for b in created {
                        gl.delete_buffer(b);
                    }
                    return Err(CompositorError::oom(format!("create_buffer failed: {e}")));
                }
            }
        }
        let texcoords = created.split_off(2);
        Ok(Self {
            vertex: created[0],
            index: created[1],
            texcoords,
        })
    }

    fn destroy(self, gl: &dyn GpuApi) {
        gl.delete_buffer(self.vertex);
        gl.delete_buffer(self.index);
        for b in self.texcoords {
            gl.delete_buffer(b);
        }
    }
}

/// Geometry currently uploaded to the video buffers.
#[derive(Debug, Clone, Copy, PartialEq)]
struct BuiltGeometry {
    source: SourceRect,
    index_count: i32,
}

#[derive(Debug)]
pub struct Compositor {
    format: VideoFormat,
    negotiated: VideoFormat,
    supports_npot: bool,
    video: ShaderProgram,
    overlay: ShaderProgram,
    textures: Vec<TextureId>,
    tex_sizes: Vec<TexSize>,
    buffers: VideoBuffers,
    overlay_buffers: OverlayBuffers,
    overlays: OverlayCache,
    viewpoint: ViewpointTransform,
    source: SourceRect,
    built: Option<BuiltGeometry>,
    video_ready: bool,
}

impl Compositor {
    /// Builds both programs, the video textures and the buffer objects for `format`.
    ///
    /// Fails without leaving any GL object behind.
    pub fn new(
        gl: &dyn GpuApi,
        format: &VideoFormat,
        config: &CompositorConfig,
        registry: &ConverterRegistry,
    ) -> Result<Self, CompositorError> {
        config.validate()?;
        let caps = gl.caps();
        if !caps.supports_shaders() {
            return Err(CompositorError::Unsupported(format!(
                "OpenGL {}.{} has no shader support",
                caps.major, caps.minor
            )));
        }

        let mut format = format.clone();
        config.apply_to(&mut format);

        let mut viewpoint = ViewpointTransform::new(
            format.projection,
            format.orientation,
            config.fov_max,
            format.display_aspect(),
        );
        if format.projection.is_spherical() {
            viewpoint.set_viewpoint(&Viewpoint::from(config.viewpoint))?;
        }

        let video_conv = registry.select(gl, &format)?;
        let format = video_conv.format().clone();

        let overlay_format = VideoFormat::new(Chroma::Rgba, format.width, format.height)
            .with_orientation(Orientation::Normal)
            .with_projection(ProjectionMode::Flat);
        let mut overlay_conv = match registry.select(gl, &overlay_format) {
            Ok(c) => c,
            Err(e) => {
                let mut video_conv = video_conv;
                video_conv.release(gl);
                return Err(e);
            }
        };

        let mut video = match ShaderProgram::build(gl, video_conv) {
            Ok(p) => p,
            Err(e) => {
                overlay_conv.release(gl);
                return Err(e);
            }
        };
        let overlay = match ShaderProgram::build(gl, overlay_conv) {
            Ok(p) => p,
            Err(e) => {
                video.destroy(gl);
                return Err(e);
            }
        };

        let scales = video.converter().layout().scales();
        let tex_sizes = texture_sizes(format.width, format.height, &scales, caps.supports_npot);
        let gpu_objects = gen_textures(gl, video.converter_mut(), &tex_sizes).and_then(|mut textures| {
            let buffers = match VideoBuffers::create(gl, textures.len()) {
                Ok(b) => b,
                Err(e) => {
                    delete_textures(gl, &mut textures);
                    return Err(e);
                }
            };
            match OverlayBuffers::new(gl) {
                Ok(o) => Ok((textures, buffers, o)),
                Err(e) => {
                    delete_textures(gl, &mut textures);
                    buffers.destroy(gl);
                    Err(e)
                }
            }
        });
        let (textures, buffers, overlay_buffers) = match gpu_objects {
            Ok(objects) => objects,
            Err(e) => {
                video.destroy(gl);
                overlay.destroy(gl);
                return Err(e);
            }
        };

        gl.disable(glow::BLEND);
        gl.disable(glow::DEPTH_TEST);
        gl.depth_mask(false);
        gl.enable(glow::CULL_FACE);
        gl.clear_color(0.0, 0.0, 0.0, 1.0);
        gl.clear(glow::COLOR_BUFFER_BIT);

        // The orientation matrix takes care of rotations from here on.
        let negotiated = format.clone().with_orientation(Orientation::Normal);
        tracing::debug!(
            chroma = %format.chroma,
            projection = ?format.projection,
            converter = video.converter().name(),
            "compositor ready"
        );

        Ok(Self {
            source: format.source_rect(),
            format,
            negotiated,
            supports_npot: caps.supports_npot,
            video,
            overlay,
            textures,
            tex_sizes,
            buffers,
            overlay_buffers,
            overlays: OverlayCache::default(),
            viewpoint,
            built: None,
            video_ready: false,
        })
    }

    /// Format the upstream pipeline must produce.
    pub fn negotiated_format(&self) -> &VideoFormat {
        &self.negotiated
    }

    /// Pixel formats accepted for overlay regions.
    pub fn overlay_chromas(&self) -> &'static [Chroma] {
        &OVERLAY_CHROMAS
    }

    pub fn video_converter_name(&self) -> &'static str {
        self.video.converter().name()
    }

    pub fn video_textures(&self) -> &[TextureId] {
        &self.textures
    }

    pub fn texture_sizes(&self) -> &[TexSize] {
        &self.tex_sizes
    }

    pub fn vertex_buffer(&self) -> BufferId {
        self.buffers.vertex
    }

    pub fn index_buffer(&self) -> BufferId {
        self.buffers.index
    }

    pub fn texcoord_buffers(&self) -> &[BufferId] {
        &self.buffers.texcoords
    }

    pub fn overlay_textures(&self) -> &[OverlayTexture] {
        self.overlays.entries()
    }

    pub fn overlay_buffer_capacity(&self) -> usize {
        self.overlay_buffers.capacity()
    }

    pub fn viewpoint(&self) -> &ViewpointTransform {
        &self.viewpoint
    }

    /// Picture pool for the upstream decoder, capped to [`PICTURE_POOL_MAX`].
    pub fn create_pool(&mut self, gl: &dyn GpuApi, requested: usize) -> Result<PicturePool, CompositorError> {
        let count = requested.clamp(1, PICTURE_POOL_MAX);
        let pool = match self.video.converter_mut().pool(gl, count) {
            Some(pool) => pool?,
            None => PicturePool::allocate(&self.negotiated, count)?,
        };
        if pool.is_empty() {
            return Err(CompositorError::oom("picture pool is empty"));
        }
        tracing::debug!(requested, allocated = pool.len(), "picture pool created");
        Ok(pool)
    }

    /// Uploads `picture` and the overlay regions for the next `display`.
    ///
    /// A failed video upload only skips the video draw; overlays are still processed.
    /// The video error is reported first.
    pub fn prepare(
        &mut self,
        gl: &dyn GpuApi,
        picture: &Picture,
        subpicture: Option<&Subpicture<'_>>,
    ) -> Result<(), CompositorError> {
        let source = picture.format.source_rect();
        let video = if source.x_offset + source.visible_width > self.format.width
            || source.y_offset + source.visible_height > self.format.height
        {
            Err(CompositorError::frame(format!(
                "crop {source:?} outside the {}x{} buffer",
                self.format.width, self.format.height
            )))
        } else {
            self.video
                .converter_mut()
                .update(gl, &self.textures, &self.tex_sizes, picture, None)
        };
        match &video {
            Ok(()) => {
                self.source = source;
                self.video_ready = true;
            }
            Err(e) => {
                tracing::warn!("video upload failed, frame skipped: {e}");
                self.video_ready = false;
            }
        }

        let overlays = self
            .overlays
            .update(gl, self.overlay.converter_mut(), subpicture, self.supports_npot);
        if let Err(e) = &overlays {
            tracing::warn!("overlay upload: {e}");
        }
        video.and(overlays)
    }

    /// Draws the prepared frame and presents it.
    pub fn display(&mut self, gl: &dyn GpuApi, present: &mut dyn Present) -> Result<(), CompositorError> {
        gl.clear(glow::COLOR_BUFFER_BIT);

        if self.video_ready && !self.source.is_empty() {
            self.draw_video(gl)?;
        }
        if !self.overlays.is_empty() {
            self.draw_overlays(gl)?;
        }

        present.present();
        Ok(())
    }

    fn rebuild_geometry(&mut self, gl: &dyn GpuApi) -> Result<BuiltGeometry, CompositorError> {
        let scales = self.video.converter().layout().scales();
        let crops = plane_crops(&self.source, &scales, &self.tex_sizes);
        let padding = CubemapPadding::from_pixels(
            self.format.cubemap_padding,
            self.format.width,
            self.format.height,
        );
        let geometry = build_geometry(self.format.projection, &crops, padding)?;

        for (plane, buffer) in self.buffers.texcoords.iter().enumerate() {
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(*buffer));
            gl.buffer_data_u8_slice(
                glow::ARRAY_BUFFER,
                bytemuck::cast_slice(geometry.plane_texcoords(plane)),
                glow::STATIC_DRAW,
            );
        }
        gl.bind_buffer(glow::ARRAY_BUFFER, Some(self.buffers.vertex));
        gl.buffer_data_u8_slice(
            glow::ARRAY_BUFFER,
            bytemuck::cast_slice(&geometry.vertices),
            glow::STATIC_DRAW,
        );
        gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(self.buffers.index));
        gl.buffer_data_u8_slice(
            glow::ELEMENT_ARRAY_BUFFER,
            bytemuck::cast_slice(&geometry.indices),
            glow::STATIC_DRAW,
        );

        let built = BuiltGeometry {
            source: self.source,
            index_count: geometry.index_count() as i32,
        };
        tracing::debug!(source = ?self.source, indices = built.index_count, "geometry rebuilt");
        self.built = Some(built);
        Ok(built)
    }

    fn draw_video(&mut self, gl: &dyn GpuApi) -> Result<(), CompositorError> {
        self.video.use_program(gl);
        let built = match self.built {
            Some(b) if b.source == self.source => b,
            _ => self.rebuild_geometry(gl)?,
        };

        let converter = self.video.converter();
        converter.prepare_shader(gl, &self.tex_sizes, 1.0);
        let target = converter.layout().target;
        for (plane, tex) in self.textures.iter().enumerate() {
            gl.active_texture(glow::TEXTURE0 + plane as u32);
            gl.bind_texture(target, Some(*tex));
            if let (Some(attr), Some(buffer)) =
                (self.video.tex_coord(plane), self.buffers.texcoords.get(plane))
            {
                gl.bind_buffer(glow::ARRAY_BUFFER, Some(*buffer));
                gl.enable_vertex_attrib_array(attr);
                gl.vertex_attrib_pointer_f32(attr, 2);
            }
        }
        gl.active_texture(glow::TEXTURE0);

        let position = self.video.vertex_position();
        gl.bind_buffer(glow::ARRAY_BUFFER, Some(self.buffers.vertex));
        gl.enable_vertex_attrib_array(position);
        gl.vertex_attrib_pointer_f32(position, 3);
        gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(self.buffers.index));

        self.video.load_matrices(gl, self.viewpoint.matrices());
        gl.draw_elements(glow::TRIANGLES, built.index_count, glow::UNSIGNED_SHORT, 0);
        Ok(())
    }

    fn draw_overlays(&mut self, gl: &dyn GpuApi) -> Result<(), CompositorError> {
        self.overlay_buffers.reserve(gl, self.overlays.len())?;

        self.overlay.use_program(gl);
        gl.enable(glow::BLEND);
        gl.blend_func(glow::SRC_ALPHA, glow::ONE_MINUS_SRC_ALPHA);
        self.overlay.load_matrices(gl, &TransformMatrices::default());

        let converter = self.overlay.converter();
        let target = converter.layout().target;
        let position = self.overlay.vertex_position();
        let texcoord = self.overlay.tex_coord(0);
        gl.active_texture(glow::TEXTURE0);
        for (i, entry) in self.overlays.entries().iter().enumerate() {
            let Some((vertex_buf, texcoord_buf)) = self.overlay_buffers.pair(i) else {
                break;
            };
            gl.bind_texture(target, Some(entry.texture));
            converter.prepare_shader(gl, &[entry.tex_size], entry.alpha);

            if let Some(attr) = texcoord {
                gl.bind_buffer(glow::ARRAY_BUFFER, Some(texcoord_buf));
                gl.buffer_data_u8_slice(
                    glow::ARRAY_BUFFER,
                    bytemuck::cast_slice(&entry.texcoords()),
                    glow::DYNAMIC_DRAW,
                );
                gl.enable_vertex_attrib_array(attr);
                gl.vertex_attrib_pointer_f32(attr, 2);
            }

            gl.bind_buffer(glow::ARRAY_BUFFER, Some(vertex_buf));
            gl.buffer_data_u8_slice(
                glow::ARRAY_BUFFER,
                bytemuck::cast_slice(&entry.vertices()),
                glow::DYNAMIC_DRAW,
            );
            gl.enable_vertex_attrib_array(position);
            gl.vertex_attrib_pointer_f32(position, 2);

            gl.draw_arrays(glow::TRIANGLE_STRIP, 0, 4);
        }
        gl.disable(glow::BLEND);
        Ok(())
    }

    /// Applies a new camera. Out-of-range values leave the previous one in place.
    pub fn set_viewpoint(&mut self, viewpoint: &Viewpoint) -> Result<(), CompositorError> {
        self.viewpoint.set_viewpoint(viewpoint)?;
        Ok(())
    }

    pub fn set_window_aspect_ratio(&mut self, sar: f32) -> Result<(), CompositorError> {
        self.viewpoint.set_aspect_ratio(sar)?;
        Ok(())
    }

    /// Releases every GL object owned by the compositor.
    pub fn destroy(mut self, gl: &dyn GpuApi) {
        gl.finish();
        delete_textures(gl, &mut self.textures);
        self.overlays.clear(gl);
        self.video.destroy(gl);
        self.overlay.destroy(gl);
        self.buffers.destroy(gl);
        self.overlay_buffers.destroy(gl);
        tracing::debug!("compositor destroyed");
    }
}
