//! Viewpoint transform: orientation, projection, rotation and zoom matrices.
//!
//! Matrices are column-major `[f32; 16]`, ready for `glUniformMatrix4fv` without
//! transposition.

use glcompose_core::{CompositorError, Orientation, ProjectionMode, ViewpointConfig};

pub type Mat4 = [f32; 16];

#[rustfmt::skip]
pub const IDENTITY: Mat4 = [
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 1.0, 0.0,
    0.0, 0.0, 0.0, 1.0,
];

pub const SPHERE_RADIUS: f32 = 1.0;
pub const FOV_DEGREES_MAX: f32 = 150.0;
pub const FOV_DEGREES_DEFAULT: f32 = 80.0;

/// Horizontal fov (degrees) above which the camera is pulled back.
const ZOOM_THRESHOLD_DEGREES: f32 = 90.0;

const Z_NEAR: f32 = 0.01;
const Z_FAR: f32 = 1000.0;

/// Tolerance on the fov bounds, in radians.
const FOV_EPSILON: f32 = 0.001;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ViewpointError {
    #[error("field of view {fov} deg outside (0, {max}]")]
    FovOutOfRange { fov: f32, max: f32 },

    #[error("aspect ratio {0} must be finite and > 0")]
    AspectRatio(f32),

    #[error("non-finite angle in viewpoint {0:?}")]
    NonFinite(Viewpoint),
}

impl From<ViewpointError> for CompositorError {
    fn from(e: ViewpointError) -> Self {
        CompositorError::InvalidArgument(e.to_string())
    }
}

/// Requested camera, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewpoint {
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
    pub fov: f32,
}

impl Default for Viewpoint {
    fn default() -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.0,
            roll: 0.0,
            fov: FOV_DEGREES_DEFAULT,
        }
    }
}

impl From<ViewpointConfig> for Viewpoint {
    fn from(c: ViewpointConfig) -> Self {
        Self {
            yaw: c.yaw,
            pitch: c.pitch,
            roll: c.roll,
            fov: c.fov,
        }
    }
}

/// The six matrices consumed by the vertex shader.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformMatrices {
    pub orientation: Mat4,
    pub projection: Mat4,
    pub z_rot: Mat4,
    pub y_rot: Mat4,
    pub x_rot: Mat4,
    pub zoom: Mat4,
}

impl Default for TransformMatrices {
    fn default() -> Self {
        Self {
            orientation: IDENTITY,
            projection: IDENTITY,
            z_rot: IDENTITY,
            y_rot: IDENTITY,
            x_rot: IDENTITY,
            zoom: IDENTITY,
        }
    }
}

impl TransformMatrices {
    /// Matrices paired with their uniform names.
    pub fn named(&self) -> [(&'static str, &Mat4); 6] {
        [
            ("OrientationMatrix", &self.orientation),
            ("ProjectionMatrix", &self.projection),
            ("ZRotMatrix", &self.z_rot),
            ("YRotMatrix", &self.y_rot),
            ("XRotMatrix", &self.x_rot),
            ("ZoomMatrix", &self.zoom),
        ]
    }
}

#[rustfmt::skip]
fn z_rotation(theta: f32) -> Mat4 {
    let (st, ct) = theta.sin_cos();
    [
        ct,  -st, 0.0, 0.0,
        st,  ct,  0.0, 0.0,
        0.0, 0.0, 1.0, 0.0,
        0.0, 0.0, 0.0, 1.0,
    ]
}

#[rustfmt::skip]
fn y_rotation(theta: f32) -> Mat4 {
    let (st, ct) = theta.sin_cos();
    [
        ct,  0.0, -st, 0.0,
        0.0, 1.0, 0.0, 0.0,
        st,  0.0, ct,  0.0,
        0.0, 0.0, 0.0, 1.0,
    ]
}

#[rustfmt::skip]
fn x_rotation(phi: f32) -> Mat4 {
    let (sp, cp) = phi.sin_cos();
    [
        1.0, 0.0, 0.0, 0.0,
        0.0, cp,  sp,  0.0,
        0.0, -sp, cp,  0.0,
        0.0, 0.0, 0.0, 1.0,
    ]
}

#[rustfmt::skip]
fn zoom_matrix(zoom: f32) -> Mat4 {
    [
        1.0, 0.0, 0.0,  0.0,
        0.0, 1.0, 0.0,  0.0,
        0.0, 0.0, 1.0,  0.0,
        0.0, 0.0, zoom, 1.0,
    ]
}

/// gluPerspective equivalent.
#[rustfmt::skip]
fn perspective(sar: f32, fovy: f32) -> Mat4 {
    let f = 1.0 / (fovy / 2.0).tan();
    [
        f / sar, 0.0, 0.0,                                   0.0,
        0.0,     f,   0.0,                                   0.0,
        0.0,     0.0, (Z_NEAR + Z_FAR) / (Z_NEAR - Z_FAR),   -1.0,
        0.0,     0.0, (2.0 * Z_NEAR * Z_FAR) / (Z_NEAR - Z_FAR), 0.0,
    ]
}

/// Texture-coordinate transform that displays `orientation` upright.
pub fn orientation_matrix(orientation: Orientation) -> Mat4 {
    let mut m = IDENTITY;
    match orientation {
        Orientation::Normal => {}
        Orientation::Rotated90 => {
            m[0] = 0.0;
            m[1] = -1.0;
            m[4] = 1.0;
            m[5] = 0.0;
            m[13] = 1.0;
        }
        Orientation::Rotated180 => {
            m[0] = -1.0;
            m[1] = 0.0;
            m[4] = 0.0;
            m[5] = -1.0;
            m[12] = 1.0;
            m[13] = 1.0;
        }
        Orientation::Rotated270 => {
            m[0] = 0.0;
            m[1] = 1.0;
            m[4] = -1.0;
            m[5] = 0.0;
            m[12] = 1.0;
        }
        Orientation::HFlipped => {
            m[0] = -1.0;
            m[12] = 1.0;
        }
        Orientation::VFlipped => {
            m[5] = -1.0;
            m[13] = 1.0;
        }
        Orientation::Transposed => {
            m[0] = 0.0;
            m[5] = 0.0;
            m[10] = -1.0;
            m[1] = 1.0;
            m[4] = 1.0;
        }
        Orientation::AntiTransposed => {
            m[0] = 0.0;
            m[5] = 0.0;
            m[10] = -1.0;
            m[1] = -1.0;
            m[4] = -1.0;
            m[12] = 1.0;
            m[13] = 1.0;
        }
    }
    m
}

/// Camera state for spherical projections and the matrices derived from it.
///
/// Angles are stored in radians. Matrices are recomputed on every successful setter call
/// and served from cache otherwise. Flat projections always get identity matrices (only the
/// orientation matrix applies) so the picture is never distorted.
#[derive(Debug, Clone)]
pub struct ViewpointTransform {
    projection: ProjectionMode,
    orientation: Orientation,
    fov_max: f32,
    yaw: f32,
    pitch: f32,
    roll: f32,
    fovx: f32,
    fovy: f32,
    zoom: f32,
    zoom_min: f32,
    sar: f32,
    matrices: TransformMatrices,
}

impl ViewpointTransform {
    /// `fov_max_degrees` bounds every later fov request; `sar` is the window aspect ratio.
    ///
    /// With `fov_max_degrees` at or below 90 the zoom stays at 0 for every accepted fov.
    pub fn new(
        projection: ProjectionMode,
        orientation: Orientation,
        fov_max_degrees: f32,
        sar: f32,
    ) -> Self {
        let sar = if sar.is_finite() && sar > 0.0 { sar } else { 1.0 };
        let mut t = Self {
            projection,
            orientation,
            fov_max: fov_max_degrees.to_radians(),
            yaw: -std::f32::consts::FRAC_PI_2,
            pitch: 0.0,
            roll: 0.0,
            fovx: FOV_DEGREES_DEFAULT.min(fov_max_degrees).to_radians(),
            fovy: 0.0,
            zoom: 0.0,
            zoom_min: 0.0,
            sar,
            matrices: TransformMatrices::default(),
        };
        t.update_fovy();
        t.update_zoom();
        t.rebuild();
        t
    }

    /// Applies a viewpoint. On error nothing changes.
    pub fn set_viewpoint(&mut self, vp: &Viewpoint) -> Result<(), ViewpointError> {
        if !(vp.yaw.is_finite() && vp.pitch.is_finite() && vp.roll.is_finite()) {
            return Err(ViewpointError::NonFinite(*vp));
        }
        let fovx = vp.fov.to_radians();
        if !fovx.is_finite() || fovx <= 0.0 || fovx > self.fov_max + FOV_EPSILON {
            return Err(ViewpointError::FovOutOfRange {
                fov: vp.fov,
                max: self.fov_max.to_degrees(),
            });
        }

        // The sphere is built with longitude 0 on +x; a zero yaw looks down -z.
        self.yaw = vp.yaw.to_radians() - std::f32::consts::FRAC_PI_2;
        self.pitch = vp.pitch.to_radians();
        self.roll = vp.roll.to_radians();

        if (fovx - self.fovx).abs() >= FOV_EPSILON {
            self.fovx = fovx.min(self.fov_max);
            self.update_fovy();
            self.update_zoom();
        }
        self.rebuild();
        Ok(())
    }

    /// Window aspect ratio changed: vertical fov and minimum zoom follow.
    pub fn set_aspect_ratio(&mut self, sar: f32) -> Result<(), ViewpointError> {
        if !sar.is_finite() || sar <= 0.0 {
            return Err(ViewpointError::AspectRatio(sar));
        }
        self.sar = sar;
        self.update_fovy();
        self.update_zoom();
        self.rebuild();
        Ok(())
    }

    pub fn matrices(&self) -> &TransformMatrices {
        &self.matrices
    }

    /// Current camera distance along the view axis (<= 0).
    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    /// Closest the camera may get to the sphere edge for the current fov.
    pub fn zoom_min(&self) -> f32 {
        self.zoom_min
    }

    pub fn fovx(&self) -> f32 {
        self.fovx
    }

    pub fn fovy(&self) -> f32 {
        self.fovy
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.sar
    }

    /// Current yaw/pitch/roll/fov, in degrees.
    pub fn viewpoint(&self) -> Viewpoint {
        Viewpoint {
            yaw: (self.yaw + std::f32::consts::FRAC_PI_2).to_degrees(),
            pitch: self.pitch.to_degrees(),
            roll: self.roll.to_degrees(),
            fov: self.fovx.to_degrees(),
        }
    }

    fn update_fovy(&mut self) {
        self.fovy = 2.0 * ((self.fovx / 2.0).tan() / self.sar).atan();
    }

    /// Pulls the camera back at wide fov without ever showing outside the sphere.
    fn update_zoom(&mut self) {
        let tan_x = (self.fovx / 2.0).tan();
        let tan_y = (self.fovy / 2.0).tan();
        self.zoom_min = -SPHERE_RADIUS / (tan_x * tan_x + tan_y * tan_y).sqrt().atan().sin();

        let threshold = ZOOM_THRESHOLD_DEGREES.to_radians();
        if self.fovx <= threshold {
            self.zoom = 0.0;
        } else {
            let f = self.zoom_min / (self.fov_max - threshold);
            self.zoom = (f * self.fovx - f * threshold).max(self.zoom_min);
        }
    }

    fn rebuild(&mut self) {
        self.matrices.orientation = orientation_matrix(self.orientation);
        if self.projection.is_spherical() {
            self.matrices.projection = perspective(self.sar, self.fovy);
            self.matrices.y_rot = y_rotation(self.yaw);
            self.matrices.x_rot = x_rotation(self.pitch);
            self.matrices.z_rot = z_rotation(self.roll);
            self.matrices.zoom = zoom_matrix(self.zoom);
        } else {
            self.matrices.projection = IDENTITY;
            self.matrices.y_rot = IDENTITY;
            self.matrices.x_rot = IDENTITY;
            self.matrices.z_rot = IDENTITY;
            self.matrices.zoom = IDENTITY;
        }
    }
}
