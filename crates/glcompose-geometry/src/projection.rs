//! Vertex/texcoord/index generation for each projection mode.
//!
//! Every builder returns the same [`Geometry`] shape so the upload path does not care
//! which projection produced it. Texcoords are stored plane-major: all vertices of plane
//! 0, then all vertices of plane 1, and so on.

use glcompose_core::{CompositorError, ProjectionMode, PLANE_MAX};

use crate::crop::PlaneCrop;
use crate::viewpoint::SPHERE_RADIUS;

/// Latitude and longitude bands of the equirectangular sphere.
pub const SPHERE_BANDS: u32 = 128;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    #[error("geometry needs between 1 and {max} planes, got {0}", max = PLANE_MAX)]
    PlaneCount(usize),

    #[error("cannot allocate {0} geometry elements")]
    OutOfMemory(usize),
}

impl From<GeometryError> for CompositorError {
    fn from(e: GeometryError) -> Self {
        match e {
            GeometryError::PlaneCount(_) => CompositorError::InvalidArgument(e.to_string()),
            GeometryError::OutOfMemory(_) => CompositorError::OutOfMemory(e.to_string()),
        }
    }
}

/// Inset applied to every cubemap face, in normalized texture units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CubemapPadding {
    pub w: f32,
    pub h: f32,
}

impl CubemapPadding {
    /// Converts a padding in pixels for a `width` x `height` buffer.
    pub fn from_pixels(padding: u32, width: u32, height: u32) -> Self {
        let norm = |size: u32| if size == 0 { 0.0 } else { padding as f32 / size as f32 };
        Self {
            w: norm(width),
            h: norm(height),
        }
    }
}

/// CPU-side geometry ready for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    /// xyz per vertex.
    pub vertices: Vec<f32>,
    /// uv per vertex, per plane (plane-major).
    pub texcoords: Vec<f32>,
    pub indices: Vec<u16>,
    pub plane_count: usize,
}

impl Geometry {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 3
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    /// Texcoords of one plane.
    pub fn plane_texcoords(&self, plane: usize) -> &[f32] {
        let n = self.vertex_count() * 2;
        &self.texcoords[plane * n..(plane + 1) * n]
    }
}

/// Builds the geometry of `projection` for the given per-plane crops.
pub fn build_geometry(
    projection: ProjectionMode,
    crops: &[PlaneCrop],
    padding: CubemapPadding,
) -> Result<Geometry, GeometryError> {
    if crops.is_empty() || crops.len() > PLANE_MAX {
        return Err(GeometryError::PlaneCount(crops.len()));
    }
    let geometry = match projection {
        ProjectionMode::Flat => build_rectangle(crops)?,
        ProjectionMode::Equirectangular => build_sphere(crops)?,
        ProjectionMode::Cubemap => build_cube(crops, padding)?,
    };
    tracing::trace!(
        ?projection,
        vertices = geometry.vertex_count(),
        indices = geometry.index_count(),
        "geometry built"
    );
    Ok(geometry)
}

fn alloc<T>(len: usize) -> Result<Vec<T>, GeometryError> {
    let mut v = Vec::new();
    v.try_reserve_exact(len).map_err(|_| GeometryError::OutOfMemory(len))?;
    Ok(v)
}

fn build_rectangle(crops: &[PlaneCrop]) -> Result<Geometry, GeometryError> {
    const COORD: [f32; 12] = [
        -1.0, 1.0, -1.0, //
        -1.0, -1.0, -1.0, //
        1.0, 1.0, -1.0, //
        1.0, -1.0, -1.0,
    ];
    const IND: [u16; 6] = [0, 1, 2, 2, 1, 3];

    let mut vertices = alloc(COORD.len())?;
    vertices.extend_from_slice(&COORD);

    let mut texcoords = alloc(crops.len() * 4 * 2)?;
    for c in crops {
        texcoords.extend_from_slice(&[
            c.left, c.top, //
            c.left, c.bottom, //
            c.right, c.top, //
            c.right, c.bottom,
        ]);
    }

    let mut indices = alloc(IND.len())?;
    indices.extend_from_slice(&IND);

    Ok(Geometry {
        vertices,
        texcoords,
        indices,
        plane_count: crops.len(),
    })
}

fn build_sphere(crops: &[PlaneCrop]) -> Result<Geometry, GeometryError> {
    let lat_bands = SPHERE_BANDS;
    let lon_bands = SPHERE_BANDS;
    let vertex_count = ((lat_bands + 1) * (lon_bands + 1)) as usize;
    let index_count = (lat_bands * lon_bands * 6) as usize;

    let mut vertices = alloc(vertex_count * 3)?;
    for lat in 0..=lat_bands {
        let theta = lat as f32 * std::f32::consts::PI / lat_bands as f32;
        let (sin_theta, cos_theta) = theta.sin_cos();
        for lon in 0..=lon_bands {
            let phi = lon as f32 * 2.0 * std::f32::consts::PI / lon_bands as f32;
            let (sin_phi, cos_phi) = phi.sin_cos();
            vertices.push(SPHERE_RADIUS * cos_phi * sin_theta);
            vertices.push(SPHERE_RADIUS * cos_theta);
            vertices.push(SPHERE_RADIUS * sin_phi * sin_theta);
        }
    }

    let mut texcoords = alloc(crops.len() * vertex_count * 2)?;
    for c in crops {
        let (width, height) = (c.width(), c.height());
        for lat in 0..=lat_bands {
            let v = lat as f32 / lat_bands as f32 * height;
            for lon in 0..=lon_bands {
                let u = lon as f32 / lon_bands as f32 * width;
                texcoords.push(u);
                texcoords.push(v);
            }
        }
    }

    let mut indices = alloc(index_count)?;
    for lat in 0..lat_bands {
        for lon in 0..lon_bands {
            let first = (lat * (lon_bands + 1) + lon) as u16;
            let second = first + lon_bands as u16 + 1;
            indices.extend_from_slice(&[first, second, first + 1, second, second + 1, first + 1]);
        }
    }

    Ok(Geometry {
        vertices,
        texcoords,
        indices,
        plane_count: crops.len(),
    })
}

fn build_cube(crops: &[PlaneCrop], pad: CubemapPadding) -> Result<Geometry, GeometryError> {
    #[rustfmt::skip]
    const COORD: [f32; 72] = [
        -1.0,  1.0, -1.0, // front
        -1.0, -1.0, -1.0,
         1.0,  1.0, -1.0,
         1.0, -1.0, -1.0,

        -1.0,  1.0,  1.0, // back
        -1.0, -1.0,  1.0,
         1.0,  1.0,  1.0,
         1.0, -1.0,  1.0,

        -1.0,  1.0, -1.0, // left
        -1.0, -1.0, -1.0,
        -1.0,  1.0,  1.0,
        -1.0, -1.0,  1.0,

         1.0,  1.0, -1.0, // right
         1.0, -1.0, -1.0,
         1.0,  1.0,  1.0,
         1.0, -1.0,  1.0,

        -1.0, -1.0,  1.0, // bottom
        -1.0, -1.0, -1.0,
         1.0, -1.0,  1.0,
         1.0, -1.0, -1.0,

        -1.0,  1.0,  1.0, // top
        -1.0,  1.0, -1.0,
         1.0,  1.0,  1.0,
         1.0,  1.0, -1.0,
    ];
    #[rustfmt::skip]
    const IND: [u16; 36] = [
        0, 1, 2,    2, 1, 3,    // front
        6, 7, 4,    4, 7, 5,    // back
        10, 11, 8,  8, 11, 9,   // left
        12, 13, 14, 14, 13, 15, // right
        18, 19, 16, 16, 19, 17, // bottom
        20, 21, 22, 22, 21, 23, // top
    ];

    let mut vertices = alloc(COORD.len())?;
    vertices.extend_from_slice(&COORD);

    let (pw, ph) = (pad.w, pad.h);
    let mut texcoords = alloc(crops.len() * 24 * 2)?;
    for c in crops {
        let (width, height) = (c.width(), c.height());
        // 3 columns x 2 rows of faces.
        let col = [
            c.left,
            c.left + width / 3.0,
            c.left + width * 2.0 / 3.0,
            c.left + width,
        ];
        let row = [c.top, c.top + height / 2.0, c.top + height];

        #[rustfmt::skip]
        let tex = [
            col[1] + pw, row[1] + ph, // front
            col[1] + pw, row[2] - ph,
            col[2] - pw, row[1] + ph,
            col[2] - pw, row[2] - ph,

            col[3] - pw, row[1] + ph, // back
            col[3] - pw, row[2] - ph,
            col[2] + pw, row[1] + ph,
            col[2] + pw, row[2] - ph,

            col[2] - pw, row[0] + ph, // left
            col[2] - pw, row[1] - ph,
            col[1] + pw, row[0] + ph,
            col[1] + pw, row[1] - ph,

            col[0] + pw, row[0] + ph, // right
            col[0] + pw, row[1] - ph,
            col[1] - pw, row[0] + ph,
            col[1] - pw, row[1] - ph,

            col[0] + pw, row[2] - ph, // bottom
            col[0] + pw, row[1] + ph,
            col[1] - pw, row[2] - ph,
            col[1] - pw, row[1] + ph,

            col[2] + pw, row[0] + ph, // top
            col[2] + pw, row[1] - ph,
            col[3] - pw, row[0] + ph,
            col[3] - pw, row[1] - ph,
        ];
        texcoords.extend_from_slice(&tex);
    }

    let mut indices = alloc(IND.len())?;
    indices.extend_from_slice(&IND);

    Ok(Geometry {
        vertices,
        texcoords,
        indices,
        plane_count: crops.len(),
    })
}
