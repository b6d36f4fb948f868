//! Overlay texture cache and the per-region buffer pool.

use glcompose_core::{Chroma, CompositorError, OverlayRegion, Subpicture};
use glcompose_geometry::{aligned_size, TexSize};

use crate::converter::{delete_textures, gen_textures, TextureConverter};
use crate::gpu::{BufferId, GpuApi, TextureId};

/// Number of overlay buffers created up front (two per region).
pub const INITIAL_OVERLAY_BUFFERS: usize = 8;

/// One uploaded overlay region.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayTexture {
    pub texture: TextureId,
    /// Visible size of the region, in pixels.
    pub width: u32,
    pub height: u32,
    /// Allocated texture size (power-of-two aligned without NPOT).
    pub tex_size: TexSize,
    /// Fraction of the texture covered by the region.
    pub tex_width: f32,
    pub tex_height: f32,
    /// Screen quad in normalized device coordinates.
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub alpha: f32,
}

impl OverlayTexture {
    /// Triangle-strip corners, `(left, top), (left, bottom), (right, top), (right, bottom)`.
    pub fn vertices(&self) -> [f32; 8] {
        [
            self.left,
            self.top,
            self.left,
            self.bottom,
            self.right,
            self.top,
            self.right,
            self.bottom,
        ]
    }

    pub fn texcoords(&self) -> [f32; 8] {
        [
            0.0,
            0.0,
            0.0,
            self.tex_height,
            self.tex_width,
            0.0,
            self.tex_width,
            self.tex_height,
        ]
    }
}

/// Combined region and subpicture alpha, normalized to `0..=1`.
pub fn combined_alpha(subpicture_alpha: u8, region_alpha: u8) -> f32 {
    subpicture_alpha as f32 * region_alpha as f32 / 255.0 / 255.0
}

/// Screen placement of `region` on the subpicture canvas.
fn place(
    sub: &Subpicture<'_>,
    region: &OverlayRegion<'_>,
    texture: TextureId,
    tex_size: TexSize,
) -> OverlayTexture {
    let canvas_w = sub.canvas_width.max(1) as f32;
    let canvas_h = sub.canvas_height.max(1) as f32;
    let (w, h) = (region.width(), region.height());
    let (x, y) = (region.x as f32, region.y as f32);
    OverlayTexture {
        texture,
        width: w,
        height: h,
        tex_size,
        tex_width: w as f32 / tex_size.width as f32,
        tex_height: h as f32 / tex_size.height as f32,
        left: 2.0 * x / canvas_w - 1.0,
        top: -2.0 * y / canvas_h + 1.0,
        right: 2.0 * (x + w as f32) / canvas_w - 1.0,
        bottom: -2.0 * (y + h as f32) / canvas_h + 1.0,
        alpha: combined_alpha(sub.alpha, region.alpha),
    }
}

/// Textures of the regions drawn last frame, recycled by allocated size.
#[derive(Debug, Default)]
pub struct OverlayCache {
    entries: Vec<OverlayTexture>,
}

impl OverlayCache {
    pub fn entries(&self) -> &[OverlayTexture] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rebuilds the cache for `subpicture`.
    ///
    /// Textures whose allocated size matches a new region are reused; the rest are deleted before
    /// new ones are generated, so the texture count never exceeds the region count. A
    /// region that cannot be uploaded is skipped; the first such error is returned after
    /// every other region has been processed.
    pub fn update(
        &mut self,
        gl: &dyn GpuApi,
        converter: &mut dyn TextureConverter,
        subpicture: Option<&Subpicture<'_>>,
        supports_npot: bool,
    ) -> Result<(), CompositorError> {
        let mut stale = std::mem::take(&mut self.entries);
        let Some(sub) = subpicture else {
            release(gl, &mut stale);
            return Ok(());
        };

        let mut first_err: Option<CompositorError> = None;

        // Pass 1: claim a cached texture of the same size for every region.
        let mut slots: Vec<(OverlayRegion<'_>, TexSize, Option<TextureId>)> =
            Vec::with_capacity(sub.len());
        for region in &sub.regions {
            if region.chroma() != Chroma::Rgba {
                first_err.get_or_insert(CompositorError::frame(format!(
                    "overlay region is {}, expected RGBA",
                    region.chroma()
                )));
                continue;
            }
            let (w, h) = (region.width(), region.height());
            if w == 0 || h == 0 {
                continue;
            }
            let tex_size = if supports_npot {
                TexSize::new(w, h)
            } else {
                TexSize::new(aligned_size(w), aligned_size(h))
            };
            let reused = stale
                .iter()
                .position(|e| e.tex_size == tex_size)
                .map(|i| stale.swap_remove(i).texture);
            slots.push((*region, tex_size, reused));
        }

        release(gl, &mut stale);

        // Pass 2: allocate what could not be recycled, then upload.
        for (region, tex_size, reused) in slots {
            let texture = match reused {
                Some(t) => t,
                None => match gen_textures(gl, converter, &[tex_size]) {
                    Ok(mut t) if !t.is_empty() => t.swap_remove(0),
                    Ok(_) => continue,
                    Err(e) => {
                        first_err.get_or_insert(e);
                        continue;
                    }
                },
            };

            let pic = region.picture;
            let offsets = pic.crop_offsets();
            match converter.update(gl, &[texture], &[tex_size], pic, Some(&offsets)) {
                Ok(()) => self.entries.push(place(sub, &region, texture, tex_size)),
                Err(e) => {
                    gl.delete_texture(texture);
                    first_err.get_or_insert(e);
                }
            }
        }

        tracing::trace!(regions = self.entries.len(), "overlay cache updated");
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Deletes every cached texture.
    pub fn clear(&mut self, gl: &dyn GpuApi) {
        release(gl, &mut self.entries);
    }
}

fn release(gl: &dyn GpuApi, entries: &mut Vec<OverlayTexture>) {
    let mut textures: Vec<TextureId> = entries.drain(..).map(|e| e.texture).collect();
    delete_textures(gl, &mut textures);
}

/// Vertex/texcoord buffer pairs for overlay regions. Only ever grows.
#[derive(Debug, Default)]
pub struct OverlayBuffers {
    buffers: Vec<BufferId>,
}

impl OverlayBuffers {
    pub fn new(gl: &dyn GpuApi) -> Result<Self, CompositorError> {
        let mut pool = Self::default();
        pool.grow_to(gl, INITIAL_OVERLAY_BUFFERS)?;
        Ok(pool)
    }

    pub fn capacity(&self) -> usize {
        self.buffers.len()
    }

    /// Makes room for `regions` regions, doubling the pool when it is too small.
    pub fn reserve(&mut self, gl: &dyn GpuApi, regions: usize) -> Result<(), CompositorError> {
        let needed = 2 * regions;
        if needed <= self.buffers.len() {
            return Ok(());
        }
        let new_len = (2 * self.buffers.len()).max(needed);
        tracing::debug!(from = self.buffers.len(), to = new_len, "growing overlay buffers");
        self.grow_to(gl, new_len)
    }

    fn grow_to(&mut self, gl: &dyn GpuApi, len: usize) -> Result<(), CompositorError> {
        let old_len = self.buffers.len();
        while self.buffers.len() < len {
            match gl.create_buffer() {
                Ok(b) => self.buffers.push(b),
                Err(e) => {
                    for b in self.buffers.drain(old_len..) {
                        gl.delete_buffer(b);
                    }
                    return Err(CompositorError::oom(format!("overlay buffers: {e}")));
                }
            }
        }
        Ok(())
    }

    /// `(vertex, texcoord)` buffers of region `index`.
    pub fn pair(&self, index: usize) -> Option<(BufferId, BufferId)> {
        Some((*self.buffers.get(2 * index)?, *self.buffers.get(2 * index + 1)?))
    }

    pub fn destroy(&mut self, gl: &dyn GpuApi) {
        for b in self.buffers.drain(..) {
            gl.delete_buffer(b);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::ConverterRegistry;
    use crate::mock::{MockFailures, MockGpu};
    use glcompose_core::{Picture, VideoFormat};

    fn rgba(w: u32, h: u32) -> Picture {
        Picture::new(&VideoFormat::new(Chroma::Rgba, w, h)).unwrap()
    }

    fn converter(gpu: &MockGpu) -> Box<dyn TextureConverter> {
        ConverterRegistry::new()
            .select(gpu, &VideoFormat::new(Chroma::Rgba, 1, 1))
            .unwrap()
    }

    #[test]
    fn quad_and_alpha_follow_the_canvas() {
        let gpu = MockGpu::new();
        let mut conv = converter(&gpu);
        let mut cache = OverlayCache::default();
        let pic = rgba(32, 32);
        let mut sub = Subpicture::new(64, 64);
        sub.push(&pic, 16, 0, 128);
        cache.update(&gpu, conv.as_mut(), Some(&sub), true).unwrap();

        let e = &cache.entries()[0];
        assert!((e.alpha - 128.0 / 255.0).abs() < 1e-6);
        assert_eq!((e.left, e.top, e.right, e.bottom), (-0.5, 1.0, 0.5, 0.0));
        assert_eq!(e.texcoords(), [0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn npot_fallback_shrinks_texcoords() {
        let gpu = MockGpu::without_npot();
        let mut conv = converter(&gpu);
        let mut cache = OverlayCache::default();
        let pic = rgba(24, 10);
        let mut sub = Subpicture::new(100, 100);
        sub.push(&pic, 0, 0, 255);
        cache.update(&gpu, conv.as_mut(), Some(&sub), false).unwrap();

        let e = &cache.entries()[0];
        assert_eq!(e.tex_size, TexSize::new(32, 16));
        assert_eq!((e.tex_width, e.tex_height), (0.75, 0.625));
        let t = gpu.texture(e.texture).unwrap();
        assert_eq!((t.width, t.height), (32, 16));
        assert!(gpu.upload_errors().is_empty(), "{:?}", gpu.upload_errors());
    }

    #[test]
    fn sizes_rounding_to_the_same_texture_share_it() {
        let gpu = MockGpu::without_npot();
        let mut conv = converter(&gpu);
        let mut cache = OverlayCache::default();
        let first = rgba(20, 10);
        let second = rgba(24, 12);

        let mut sub = Subpicture::new(64, 64);
        sub.push(&first, 0, 0, 255);
        cache.update(&gpu, conv.as_mut(), Some(&sub), false).unwrap();
        let texture = cache.entries()[0].texture;

        let mut sub = Subpicture::new(64, 64);
        sub.push(&second, 0, 0, 255);
        cache.update(&gpu, conv.as_mut(), Some(&sub), false).unwrap();

        assert_eq!(gpu.textures_created(), 1);
        let e = &cache.entries()[0];
        assert_eq!(e.texture, texture);
        assert_eq!(e.tex_size, TexSize::new(32, 16));
        assert_eq!((e.width, e.height), (24, 12));
        assert_eq!((e.tex_width, e.tex_height), (0.75, 0.75));
        assert!(gpu.upload_errors().is_empty(), "{:?}", gpu.upload_errors());
    }

    #[test]
    fn same_size_is_recycled_and_new_size_replaced() {
        let gpu = MockGpu::new();
        let mut conv = converter(&gpu);
        let mut cache = OverlayCache::default();
        let small = rgba(8, 8);
        let big = rgba(16, 8);

        let mut sub = Subpicture::new(64, 64);
        sub.push(&small, 0, 0, 255);
        cache.update(&gpu, conv.as_mut(), Some(&sub), true).unwrap();
        let first = cache.entries()[0].texture;

        let mut sub = Subpicture::new(64, 64);
        sub.push(&small, 4, 4, 255);
        cache.update(&gpu, conv.as_mut(), Some(&sub), true).unwrap();
        assert_eq!(cache.entries()[0].texture, first);
        assert_eq!(gpu.textures_created(), 1);

        let mut sub = Subpicture::new(64, 64);
        sub.push(&big, 0, 0, 255);
        cache.update(&gpu, conv.as_mut(), Some(&sub), true).unwrap();
        assert_ne!(cache.entries()[0].texture, first);
        assert_eq!(gpu.textures_created(), 2);
        assert_eq!(gpu.live_textures(), 1);

        cache.update(&gpu, conv.as_mut(), None, true).unwrap();
        assert!(cache.is_empty());
        assert_eq!(gpu.live_textures(), 0);
    }

    #[test]
    fn non_rgba_region_is_skipped() {
        let gpu = MockGpu::new();
        let mut conv = converter(&gpu);
        let mut cache = OverlayCache::default();
        let yuv = Picture::new(&VideoFormat::new(Chroma::I420, 8, 8)).unwrap();
        let ok = rgba(8, 8);
        let mut sub = Subpicture::new(64, 64);
        sub.push(&yuv, 0, 0, 255);
        sub.push(&ok, 8, 8, 255);

        let err = cache.update(&gpu, conv.as_mut(), Some(&sub), true).unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(cache.len(), 1);
        assert_eq!(gpu.live_textures(), 1);
    }

    #[test]
    fn failed_allocation_skips_region() {
        let gpu = MockGpu::new();
        let mut conv = converter(&gpu);
        let mut cache = OverlayCache::default();
        let a = rgba(8, 8);
        let b = rgba(4, 4);
        gpu.set_failures(MockFailures {
            texture_budget: Some(1),
            ..Default::default()
        });
        let mut sub = Subpicture::new(64, 64);
        sub.push(&a, 0, 0, 255);
        sub.push(&b, 0, 0, 255);
        assert!(cache.update(&gpu, conv.as_mut(), Some(&sub), true).is_err());
        assert_eq!(cache.len(), 1);
        assert_eq!(gpu.live_textures(), 1);
    }

    #[test]
    fn buffers_grow_geometrically() {
        let gpu = MockGpu::new();
        let mut pool = OverlayBuffers::new(&gpu).unwrap();
        assert_eq!(pool.capacity(), 8);
        pool.reserve(&gpu, 4).unwrap();
        assert_eq!(pool.capacity(), 8);
        pool.reserve(&gpu, 5).unwrap();
        assert_eq!(pool.capacity(), 16);
        pool.reserve(&gpu, 20).unwrap();
        assert_eq!(pool.capacity(), 40);
        assert!(pool.pair(19).is_some());
        assert!(pool.pair(20).is_none());
        pool.destroy(&gpu);
        assert_eq!(gpu.live_buffers(), 0);
    }

    #[test]
    fn failed_growth_keeps_existing_buffers() {
        let gpu = MockGpu::new();
        let mut pool = OverlayBuffers::new(&gpu).unwrap();
        gpu.set_failures(MockFailures {
            buffer_budget: Some(3),
            ..Default::default()
        });
        assert!(pool.reserve(&gpu, 5).is_err());
        assert_eq!(pool.capacity(), 8);
        assert_eq!(gpu.live_buffers(), 8);
    }
}
