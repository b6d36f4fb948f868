//! Texture sizing and per-plane crop extents.

use glcompose_core::{Rational, SourceRect};

/// Scale of one texture plane relative to the visible picture size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneScale {
    pub w: Rational,
    pub h: Rational,
}

impl PlaneScale {
    pub const FULL: PlaneScale = PlaneScale {
        w: Rational::ONE,
        h: Rational::ONE,
    };

    pub const fn new(w: Rational, h: Rational) -> Self {
        Self { w, h }
    }
}

/// Allocated size of one texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TexSize {
    pub width: u32,
    pub height: u32,
}

impl TexSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Smallest power of two greater than or equal to `size`.
pub fn aligned_size(size: u32) -> u32 {
    size.max(1).next_power_of_two()
}

/// Texture sizes for each plane of a `visible_width` x `visible_height` picture.
///
/// Without NPOT support every dimension is rounded up to a power of two.
pub fn texture_sizes(
    visible_width: u32,
    visible_height: u32,
    scales: &[PlaneScale],
    supports_npot: bool,
) -> Vec<TexSize> {
    scales
        .iter()
        .map(|s| {
            let w = s.w.apply(visible_width);
            let h = s.h.apply(visible_height);
            if supports_npot {
                TexSize::new(w, h)
            } else {
                TexSize::new(aligned_size(w), aligned_size(h))
            }
        })
        .collect()
}

/// Normalized texture-space rectangle sampled for one plane.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlaneCrop {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl PlaneCrop {
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    /// Back to texel units for a texture of size `tex`.
    pub fn to_texels(&self, tex: TexSize) -> [f32; 4] {
        let (w, h) = (tex.width as f32, tex.height as f32);
        [self.left * w, self.top * h, self.right * w, self.bottom * h]
    }
}

/// Per-plane UV extents of `source` inside textures of size `tex`.
///
/// When textures were rounded up to a power of two the extents shrink proportionally, so
/// the padding texels are never sampled. Note the right/bottom edge can still land between
/// a written and an unwritten texel in that case.
pub fn plane_crops(source: &SourceRect, scales: &[PlaneScale], tex: &[TexSize]) -> Vec<PlaneCrop> {
    scales
        .iter()
        .zip(tex)
        .map(|(s, t)| {
            let scale_w = if t.width == 0 { 0.0 } else { s.w.as_f32() / t.width as f32 };
            let scale_h = if t.height == 0 { 0.0 } else { s.h.as_f32() / t.height as f32 };
            PlaneCrop {
                left: source.x_offset as f32 * scale_w,
                top: source.y_offset as f32 * scale_h,
                right: (source.x_offset + source.visible_width) as f32 * scale_w,
                bottom: (source.y_offset + source.visible_height) as f32 * scale_h,
            }
        })
        .collect()
}
