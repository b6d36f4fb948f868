//! Overlay (subtitle/OSD) input.

use crate::format::Chroma;
use crate::picture::Picture;

/// One overlay rectangle.
///
/// The picture's format carries the region size (`visible_width`/`visible_height`) and the
/// crop origin inside its buffer (`x_offset`/`y_offset`), which lets several regions share
/// one larger surface.
#[derive(Debug, Clone, Copy)]
pub struct OverlayRegion<'a> {
    pub picture: &'a Picture,
    /// Placement on the canvas, in canvas pixels.
    pub x: i32,
    pub y: i32,
    /// Region alpha, 0..=255.
    pub alpha: u8,
}

impl OverlayRegion<'_> {
    pub fn width(&self) -> u32 {
        self.picture.format.visible_width
    }

    pub fn height(&self) -> u32 {
        self.picture.format.visible_height
    }

    pub fn chroma(&self) -> Chroma {
        self.picture.format.chroma
    }
}

/// An ordered set of overlay regions placed on a canvas.
///
/// The canvas size is the coordinate space of the regions, independent from the video size.
#[derive(Debug, Clone)]
pub struct Subpicture<'a> {
    pub regions: Vec<OverlayRegion<'a>>,
    /// Global alpha applied to every region, 0..=255.
    pub alpha: u8,
    pub canvas_width: u32,
    pub canvas_height: u32,
}

impl<'a> Subpicture<'a> {
    pub fn new(canvas_width: u32, canvas_height: u32) -> Self {
        Self {
            regions: Vec::new(),
            alpha: 255,
            canvas_width,
            canvas_height,
        }
    }

    pub fn push(&mut self, picture: &'a Picture, x: i32, y: i32, alpha: u8) {
        self.regions.push(OverlayRegion { picture, x, y, alpha });
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}
