//! JSON configuration for a compositor session.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::CompositorError;
use crate::format::{ProjectionMode, VideoFormat};

/// Camera orientation, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewpointConfig {
    #[serde(default)]
    pub yaw: f32,
    #[serde(default)]
    pub pitch: f32,
    #[serde(default)]
    pub roll: f32,
    /// Horizontal field of view.
    #[serde(default = "default_fov")]
    pub fov: f32,
}

impl Default for ViewpointConfig {
    fn default() -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.0,
            roll: 0.0,
            fov: default_fov(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositorConfig {
    /// Overrides the projection announced by the format when set.
    #[serde(default)]
    pub projection: Option<ProjectionMode>,

    /// Cubemap face padding, in pixels.
    #[serde(default)]
    pub cubemap_padding: u32,

    #[serde(default)]
    pub viewpoint: ViewpointConfig,

    /// Widest accepted horizontal field of view, in degrees.
    #[serde(default = "default_fov_max")]
    pub fov_max: f32,

    /// Number of pictures requested from the pool.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_fov() -> f32 {
    80.0
}
fn default_fov_max() -> f32 {
    150.0
}
fn default_pool_size() -> usize {
    3
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            projection: None,
            cubemap_padding: 0,
            viewpoint: ViewpointConfig::default(),
            fov_max: default_fov_max(),
            pool_size: default_pool_size(),
        }
    }
}

impl CompositorConfig {
    pub fn from_json_str(text: &str) -> Result<Self, CompositorError> {
        let cfg: CompositorConfig = serde_json::from_str(text)
            .map_err(|e| CompositorError::Config(format!("parse json: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Self, CompositorError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| CompositorError::ConfigFile {
            path: path.to_path_buf(),
            msg: format!("read json: {e}"),
        })?;
        Self::from_json_str(&text).map_err(|e| CompositorError::ConfigFile {
            path: path.to_path_buf(),
            msg: e.to_string(),
        })
    }

    pub fn validate(&self) -> Result<(), CompositorError> {
        // At or below 90 degrees the camera never moves back, so the widest fov would not
        // reach the minimum zoom.
        if !(self.fov_max > 90.0 && self.fov_max < 180.0) {
            return Err(CompositorError::Config(format!(
                "fov_max must be in (90, 180), got {}",
                self.fov_max
            )));
        }
        let fov = self.viewpoint.fov;
        if !(fov > 0.0 && fov <= self.fov_max) {
            return Err(CompositorError::Config(format!(
                "viewpoint.fov must be in (0, {}], got {fov}",
                self.fov_max
            )));
        }
        if self.pool_size == 0 {
            return Err(CompositorError::Config("pool_size must be > 0".into()));
        }
        Ok(())
    }

    /// Applies projection settings to a format about to be negotiated.
    pub fn apply_to(&self, fmt: &mut VideoFormat) {
        if let Some(projection) = self.projection {
            fmt.projection = projection;
        }
        if self.cubemap_padding > 0 {
            fmt.cubemap_padding = self.cubemap_padding;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Chroma;

    #[test]
    fn empty_object_uses_defaults() {
        let cfg = CompositorConfig::from_json_str("{}").unwrap();
        assert_eq!(cfg, CompositorConfig::default());
        assert_eq!(cfg.viewpoint.fov, 80.0);
    }

    #[test]
    fn parses_projection_and_viewpoint() {
        let cfg = CompositorConfig::from_json_str(
            r#"{ "projection": "cubemap", "cubemap_padding": 4, "viewpoint": { "yaw": 30, "fov": 120 } }"#,
        )
        .unwrap();
        assert_eq!(cfg.projection, Some(ProjectionMode::Cubemap));
        assert_eq!(cfg.viewpoint.yaw, 30.0);
        assert_eq!(cfg.viewpoint.pitch, 0.0);

        let mut fmt = VideoFormat::new(Chroma::I420, 64, 64);
        cfg.apply_to(&mut fmt);
        assert_eq!(fmt.projection, ProjectionMode::Cubemap);
        assert_eq!(fmt.cubemap_padding, 4);
    }

    #[test]
    fn absent_projection_keeps_the_format() {
        let cfg = CompositorConfig::default();
        let mut fmt = VideoFormat::new(Chroma::I420, 64, 32).with_projection(ProjectionMode::Equirectangular);
        cfg.apply_to(&mut fmt);
        assert_eq!(fmt.projection, ProjectionMode::Equirectangular);
    }

    #[test]
    fn rejects_out_of_range_fov() {
        let err = CompositorConfig::from_json_str(r#"{ "viewpoint": { "fov": 170 } }"#).unwrap_err();
        assert!(err.to_string().contains("viewpoint.fov"), "unexpected: {err}");
    }

    #[test]
    fn fov_max_must_exceed_the_zoom_threshold() {
        for fov_max in [45.0, 90.0, 180.0] {
            let json = format!(r#"{{ "fov_max": {fov_max}, "viewpoint": {{ "fov": 40 }} }}"#);
            let err = CompositorConfig::from_json_str(&json).unwrap_err();
            assert!(err.to_string().contains("fov_max"), "unexpected: {err}");
        }
        let cfg = CompositorConfig::from_json_str(r#"{ "fov_max": 120 }"#).unwrap();
        assert_eq!(cfg.fov_max, 120.0);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = CompositorConfig::from_json_path("/nonexistent/glcompose.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/glcompose.json"));
    }
}
