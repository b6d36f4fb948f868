#![forbid(unsafe_code)]

#[cfg(test)]
mod tests {
    use glcompose_core::{Chroma, CompositorConfig, ErrorKind, Picture, ProjectionMode, VideoFormat};
    use glcompose_geometry::{Viewpoint, FOV_DEGREES_MAX, IDENTITY};
    use glcompose_runtime_glow::mock::MockGpu;
    use glcompose_runtime_glow::{Compositor, ConverterRegistry, NoopPresent};

    fn sphere(gpu: &MockGpu) -> Compositor {
        let fmt = VideoFormat::new(Chroma::I420, 128, 64).with_projection(ProjectionMode::Equirectangular);
        Compositor::new(gpu, &fmt, &CompositorConfig::default(), &ConverterRegistry::new())
            .expect("sphere compositor")
    }

    fn fov(fov: f32) -> Viewpoint {
        Viewpoint {
            fov,
            ..Viewpoint::default()
        }
    }

    /// Contract: narrow fields of view never move the camera.
    #[test]
    fn narrow_fov_keeps_camera_centered() {
        let gpu = MockGpu::new();
        let mut c = sphere(&gpu);
        c.set_viewpoint(&fov(0.001)).expect("tiny fov");
        assert_eq!(c.viewpoint().zoom(), 0.0);
        c.set_viewpoint(&fov(90.0)).expect("threshold fov");
        assert_eq!(c.viewpoint().zoom(), 0.0);
    }

    /// Contract: the widest field of view pulls the camera back exactly to the limit.
    #[test]
    fn widest_fov_reaches_minimum_zoom() {
        let gpu = MockGpu::new();
        let mut c = sphere(&gpu);
        c.set_viewpoint(&fov(FOV_DEGREES_MAX)).expect("max fov");
        let vp = c.viewpoint();
        assert!(vp.zoom() < 0.0);
        assert!((vp.zoom() - vp.zoom_min()).abs() < 1e-4, "{} vs {}", vp.zoom(), vp.zoom_min());
    }

    /// Contract: zoom only gets further away as the fov widens.
    #[test]
    fn zoom_is_monotonic_in_fov() {
        let gpu = MockGpu::new();
        let mut c = sphere(&gpu);
        let mut last = 0.0f32;
        for deg in (80..=150).step_by(5) {
            c.set_viewpoint(&fov(deg as f32)).expect("fov in range");
            let z = c.viewpoint().zoom();
            assert!(z <= last + 1e-6, "{deg}: {z} > {last}");
            last = z;
        }
    }

    /// Contract: out-of-range requests are rejected and leave the previous camera.
    #[test]
    fn rejected_viewpoint_changes_nothing() {
        let gpu = MockGpu::new();
        let mut c = sphere(&gpu);
        let good = Viewpoint {
            yaw: 30.0,
            pitch: 10.0,
            roll: 0.0,
            fov: 100.0,
        };
        c.set_viewpoint(&good).expect("good viewpoint");
        let before = *c.viewpoint().matrices();

        for bad in [fov(0.0), fov(-10.0), fov(FOV_DEGREES_MAX + 1.0), fov(f32::NAN)] {
            let err = c.set_viewpoint(&bad).expect_err("bad viewpoint");
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
        assert_eq!(c.viewpoint().matrices(), &before);
        assert!((c.viewpoint().viewpoint().yaw - 30.0).abs() < 1e-3);
    }

    /// Contract: the window aspect ratio drives the vertical fov.
    #[test]
    fn aspect_ratio_drives_vertical_fov() {
        let gpu = MockGpu::new();
        let mut c = sphere(&gpu);
        c.set_window_aspect_ratio(1.0).expect("square window");
        assert!((c.viewpoint().fovy() - c.viewpoint().fovx()).abs() < 1e-5);
        c.set_window_aspect_ratio(2.0).expect("wide window");
        assert!(c.viewpoint().fovy() < c.viewpoint().fovx());
        assert_eq!(
            c.set_window_aspect_ratio(0.0).expect_err("zero").kind(),
            ErrorKind::InvalidArgument
        );
    }

    /// Contract: a flat picture ignores the camera entirely.
    #[test]
    fn flat_projection_ignores_the_viewpoint() {
        let gpu = MockGpu::new();
        let mut c = Compositor::new(
            &gpu,
            &VideoFormat::new(Chroma::I420, 32, 32),
            &CompositorConfig::default(),
            &ConverterRegistry::new(),
        )
        .expect("flat compositor");
        c.set_viewpoint(&Viewpoint {
            yaw: 45.0,
            pitch: 20.0,
            roll: 5.0,
            fov: 120.0,
        })
        .expect("viewpoint");

        let m = c.viewpoint().matrices();
        assert_eq!(m.projection, IDENTITY);
        assert_eq!(m.zoom, IDENTITY);
        assert_eq!(m.y_rot, IDENTITY);

        let pic = Picture::new(c.negotiated_format()).expect("picture");
        c.prepare(&gpu, &pic, None).expect("prepare");
        c.display(&gpu, &mut NoopPresent).expect("display");
        assert_eq!(gpu.draws().len(), 1);
    }
}
