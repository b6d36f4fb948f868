//! Decoded pictures and picture pools.
//!
//! Pictures are owned by the upstream allocator. The compositor only borrows one for the
//! duration of a texture update and never keeps it afterwards.

use crate::error::CompositorError;
use crate::format::VideoFormat;

/// Upper bound on the number of pictures in a pool.
pub const PICTURE_POOL_MAX: usize = 128;

/// One plane of pixel data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
    pub data: Vec<u8>,
    /// Bytes between the start of two consecutive rows.
    pub pitch: usize,
    /// Number of rows stored.
    pub lines: usize,
    /// Bytes per pixel.
    pub pixel_pitch: usize,
}

impl Plane {
    /// Allocates a zeroed, tightly packed plane.
    pub fn zeroed(width: usize, lines: usize, pixel_pitch: usize) -> Result<Self, CompositorError> {
        let pitch = width * pixel_pitch;
        let len = pitch * lines;
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|e| CompositorError::oom(format!("plane of {len} bytes: {e}")))?;
        data.resize(len, 0);
        Ok(Self {
            data,
            pitch,
            lines,
            pixel_pitch,
        })
    }
}

/// Opaque reference to a GPU-resident surface owned by a hardware decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PictureData {
    /// CPU memory, one entry per plane in storage order.
    Planes(Vec<Plane>),
    /// Already on the GPU; only a matching hardware converter can consume it.
    Surface(SurfaceHandle),
}

/// A decoded frame tagged with its format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Picture {
    pub format: VideoFormat,
    pub data: PictureData,
}

impl Picture {
    /// Allocates a zeroed picture matching `format`.
    pub fn new(format: &VideoFormat) -> Result<Self, CompositorError> {
        let mut planes = Vec::with_capacity(format.chroma.plane_count());
        for layout in format.chroma.planes() {
            planes.push(Plane::zeroed(
                layout.w.apply(format.width) as usize,
                layout.h.apply(format.height) as usize,
                layout.pixel_size as usize,
            )?);
        }
        Ok(Self::from_planes(format.clone(), planes))
    }

    pub fn from_planes(format: VideoFormat, planes: Vec<Plane>) -> Self {
        Self {
            format,
            data: PictureData::Planes(planes),
        }
    }

    pub fn from_surface(format: VideoFormat, surface: SurfaceHandle) -> Self {
        Self {
            format,
            data: PictureData::Surface(surface),
        }
    }

    pub fn planes(&self) -> Option<&[Plane]> {
        match &self.data {
            PictureData::Planes(p) => Some(p),
            PictureData::Surface(_) => None,
        }
    }

    pub fn planes_mut(&mut self) -> Option<&mut [Plane]> {
        match &mut self.data {
            PictureData::Planes(p) => Some(p),
            PictureData::Surface(_) => None,
        }
    }

    /// Byte offset of the format's crop origin inside each plane; empty for surfaces.
    pub fn crop_offsets(&self) -> Vec<usize> {
        let (x, y) = (self.format.x_offset as usize, self.format.y_offset as usize);
        self.planes()
            .map(|planes| planes.iter().map(|p| y * p.pitch + x * p.pixel_pitch).collect())
            .unwrap_or_default()
    }
}

/// A fixed set of pictures handed to the upstream decoder.
#[derive(Debug, Default)]
pub struct PicturePool {
    pictures: Vec<Picture>,
}

impl PicturePool {
    pub fn from_pictures(pictures: Vec<Picture>) -> Self {
        Self { pictures }
    }

    /// Allocates up to `count` pictures (capped to [`PICTURE_POOL_MAX`]).
    ///
    /// Stops at the first allocation failure; an empty result is an error.
    pub fn allocate(format: &VideoFormat, count: usize) -> Result<Self, CompositorError> {
        let count = count.min(PICTURE_POOL_MAX);
        let mut pictures = Vec::with_capacity(count);
        for _ in 0..count {
            match Picture::new(format) {
                Ok(p) => pictures.push(p),
                Err(e) => {
                    tracing::warn!("picture pool: stopped after {} pictures: {e}", pictures.len());
                    break;
                }
            }
        }
        if pictures.is_empty() {
            return Err(CompositorError::oom("picture pool is empty"));
        }
        Ok(Self { pictures })
    }

    pub fn len(&self) -> usize {
        self.pictures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pictures.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Picture> {
        self.pictures.get(idx)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut Picture> {
        self.pictures.get_mut(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Picture> {
        self.pictures.iter()
    }
}
