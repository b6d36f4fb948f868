//! Video format description shared by every layer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Most planes a picture can have (and textures a converter can bind).
pub const PLANE_MAX: usize = 3;

/// Small unsigned fraction (plane scale factors, sample aspect ratio).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    pub num: u32,
    pub den: u32,
}

impl Rational {
    pub const ONE: Rational = Rational { num: 1, den: 1 };
    pub const HALF: Rational = Rational { num: 1, den: 2 };

    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    /// Scales an integer dimension, rounding down.
    pub fn apply(self, v: u32) -> u32 {
        if self.den == 0 {
            return 0;
        }
        ((v as u64 * self.num as u64) / self.den as u64) as u32
    }

    pub fn as_f32(self) -> f32 {
        if self.den == 0 {
            return 0.0;
        }
        self.num as f32 / self.den as f32
    }
}

impl Default for Rational {
    fn default() -> Self {
        Rational::ONE
    }
}

/// Geometry of one plane relative to the luma/visible size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneLayout {
    pub w: Rational,
    pub h: Rational,
    /// Bytes per texel in this plane.
    pub pixel_size: u32,
}

const fn plane(w: Rational, h: Rational, pixel_size: u32) -> PlaneLayout {
    PlaneLayout { w, h, pixel_size }
}

const FULL: Rational = Rational::ONE;
const HALF: Rational = Rational::HALF;

/// Pixel format tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chroma {
    /// Planar YUV 4:2:0, U before V.
    I420,
    /// Planar YUV 4:2:0, V before U.
    Yv12,
    I422,
    I444,
    /// Semi-planar 4:2:0, interleaved UV.
    Nv12,
    /// Semi-planar 4:2:0, interleaved VU.
    Nv21,
    Rgba,
    Bgra,
    Rgb24,
    Grey,
}

impl Chroma {
    pub const ALL: [Chroma; 10] = [
        Chroma::I420,
        Chroma::Yv12,
        Chroma::I422,
        Chroma::I444,
        Chroma::Nv12,
        Chroma::Nv21,
        Chroma::Rgba,
        Chroma::Bgra,
        Chroma::Rgb24,
        Chroma::Grey,
    ];

    pub fn fourcc(self) -> &'static str {
        match self {
            Chroma::I420 => "I420",
            Chroma::Yv12 => "YV12",
            Chroma::I422 => "I422",
            Chroma::I444 => "I444",
            Chroma::Nv12 => "NV12",
            Chroma::Nv21 => "NV21",
            Chroma::Rgba => "RGBA",
            Chroma::Bgra => "BGRA",
            Chroma::Rgb24 => "RV24",
            Chroma::Grey => "GREY",
        }
    }

    pub fn is_yuv(self) -> bool {
        matches!(
            self,
            Chroma::I420 | Chroma::Yv12 | Chroma::I422 | Chroma::I444 | Chroma::Nv12 | Chroma::Nv21
        )
    }

    /// Planes as stored in memory, in storage order.
    pub fn planes(self) -> &'static [PlaneLayout] {
        const P420: [PlaneLayout; 3] = [plane(FULL, FULL, 1), plane(HALF, HALF, 1), plane(HALF, HALF, 1)];
        const P422: [PlaneLayout; 3] = [plane(FULL, FULL, 1), plane(HALF, FULL, 1), plane(HALF, FULL, 1)];
        const P444: [PlaneLayout; 3] = [plane(FULL, FULL, 1), plane(FULL, FULL, 1), plane(FULL, FULL, 1)];
        const PNV: [PlaneLayout; 2] = [plane(FULL, FULL, 1), plane(HALF, HALF, 2)];
        const PRGBA: [PlaneLayout; 1] = [plane(FULL, FULL, 4)];
        const PRGB: [PlaneLayout; 1] = [plane(FULL, FULL, 3)];
        const PGREY: [PlaneLayout; 1] = [plane(FULL, FULL, 1)];
        match self {
            Chroma::I420 | Chroma::Yv12 => &P420,
            Chroma::I422 => &P422,
            Chroma::I444 => &P444,
            Chroma::Nv12 | Chroma::Nv21 => &PNV,
            Chroma::Rgba | Chroma::Bgra => &PRGBA,
            Chroma::Rgb24 => &PRGB,
            Chroma::Grey => &PGREY,
        }
    }

    pub fn plane_count(self) -> usize {
        self.planes().len()
    }
}

impl fmt::Display for Chroma {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.fourcc())
    }
}

/// How the stored picture must be turned to be displayed upright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    Normal,
    HFlipped,
    VFlipped,
    Rotated180,
    Transposed,
    AntiTransposed,
    Rotated90,
    Rotated270,
}

impl Orientation {
    /// True when displaying swaps width and height.
    pub fn swaps_axes(self) -> bool {
        matches!(
            self,
            Orientation::Transposed
                | Orientation::AntiTransposed
                | Orientation::Rotated90
                | Orientation::Rotated270
        )
    }
}

/// Surface the video is mapped onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectionMode {
    #[default]
    #[serde(alias = "rectangular")]
    Flat,
    #[serde(alias = "sphere")]
    Equirectangular,
    #[serde(alias = "cube")]
    Cubemap,
}

impl ProjectionMode {
    /// Projections viewed from inside, driven by the viewpoint.
    pub fn is_spherical(self) -> bool {
        matches!(self, ProjectionMode::Equirectangular | ProjectionMode::Cubemap)
    }
}

/// YUV matrix coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorSpace {
    #[default]
    Undefined,
    Bt601,
    Bt709,
    Bt2020,
}

/// Crop rectangle of a format: the part of the buffer that is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SourceRect {
    pub x_offset: u32,
    pub y_offset: u32,
    pub visible_width: u32,
    pub visible_height: u32,
}

impl SourceRect {
    pub fn is_empty(&self) -> bool {
        self.visible_width == 0 || self.visible_height == 0
    }
}

/// Negotiated video format.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VideoFormat {
    pub chroma: Chroma,
    /// Allocated buffer size.
    pub width: u32,
    pub height: u32,
    pub x_offset: u32,
    pub y_offset: u32,
    pub visible_width: u32,
    pub visible_height: u32,
    /// Sample aspect ratio.
    pub sar: Rational,
    pub orientation: Orientation,
    pub projection: ProjectionMode,
    /// Cubemap face padding, in pixels.
    pub cubemap_padding: u32,
    pub color_space: ColorSpace,
    pub full_range: bool,
}

impl VideoFormat {
    /// A format whose visible area covers the whole buffer.
    pub fn new(chroma: Chroma, width: u32, height: u32) -> Self {
        Self {
            chroma,
            width,
            height,
            x_offset: 0,
            y_offset: 0,
            visible_width: width,
            visible_height: height,
            sar: Rational::ONE,
            orientation: Orientation::Normal,
            projection: ProjectionMode::Flat,
            cubemap_padding: 0,
            color_space: ColorSpace::Undefined,
            full_range: false,
        }
    }

    pub fn with_projection(mut self, projection: ProjectionMode) -> Self {
        self.projection = projection;
        self
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn with_crop(mut self, x: u32, y: u32, w: u32, h: u32) -> Self {
        self.x_offset = x;
        self.y_offset = y;
        self.visible_width = w;
        self.visible_height = h;
        self
    }

    pub fn source_rect(&self) -> SourceRect {
        SourceRect {
            x_offset: self.x_offset,
            y_offset: self.y_offset,
            visible_width: self.visible_width,
            visible_height: self.visible_height,
        }
    }

    /// Displayed width/height ratio including the sample aspect ratio.
    ///
    /// Falls back to 1.0 for a degenerate visible area.
    pub fn display_aspect(&self) -> f32 {
        if self.visible_width == 0 || self.visible_height == 0 {
            return 1.0;
        }
        let sar = if self.sar.num == 0 || self.sar.den == 0 {
            1.0
        } else {
            self.sar.as_f32()
        };
        let (w, h) = if self.orientation.swaps_axes() {
            (self.visible_height, self.visible_width)
        } else {
            (self.visible_width, self.visible_height)
        };
        w as f32 * sar / h as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn i420_has_three_planes_with_half_chroma() {
        let planes = Chroma::I420.planes();
        assert_eq!(planes.len(), 3);
        assert_eq!(planes[1].w.apply(64), 32);
        assert_eq!(planes[2].h.apply(63), 31);
    }

    #[test]
    fn nv12_chroma_plane_is_two_bytes_wide() {
        let planes = Chroma::Nv12.planes();
        assert_eq!(planes.len(), 2);
        assert_eq!(planes[1].pixel_size, 2);
    }

    #[test]
    fn projection_parses_legacy_names() {
        let p: ProjectionMode = serde_json::from_str("\"rectangular\"").unwrap();
        assert_eq!(p, ProjectionMode::Flat);
        let p: ProjectionMode = serde_json::from_str("\"equirectangular\"").unwrap();
        assert!(p.is_spherical());
    }

    #[test]
    fn display_aspect_accounts_for_rotation() {
        let f = VideoFormat::new(Chroma::I420, 1920, 1080).with_orientation(Orientation::Rotated90);
        assert!((f.display_aspect() - 1080.0 / 1920.0).abs() < 1e-6);
        let empty = VideoFormat::new(Chroma::I420, 0, 10);
        assert_eq!(empty.display_aspect(), 1.0);
        assert!(empty.source_rect().is_empty());
    }
}
