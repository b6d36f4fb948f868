#![forbid(unsafe_code)]

#[cfg(test)]
mod tests {
    use glcompose_core::{Chroma, CompositorConfig, ErrorKind, Picture, VideoFormat};
    use glcompose_runtime_glow::mock::{DrawKind, MockFailures, MockGpu};
    use glcompose_runtime_glow::{Compositor, ConverterRegistry, FrameCounter, NoopPresent};

    fn flat(gpu: &MockGpu, chroma: Chroma, w: u32, h: u32) -> Compositor {
        Compositor::new(
            gpu,
            &VideoFormat::new(chroma, w, h),
            &CompositorConfig::default(),
            &ConverterRegistry::new(),
        )
        .expect("flat compositor")
    }

    /// Contract: an I420 64x64 flat session selects the generic converter, draws one
    /// six-index quad and holds no overlay textures.
    #[test]
    fn i420_flat_session_draws_one_quad() {
        let gpu = MockGpu::new();
        let mut c = flat(&gpu, Chroma::I420, 64, 64);
        assert_eq!(c.video_converter_name(), "generic");
        assert_eq!(c.video_textures().len(), 3);
        assert_eq!(c.texcoord_buffers().len(), 3);

        let pic = Picture::new(c.negotiated_format()).expect("picture");
        let mut present = FrameCounter::default();
        c.prepare(&gpu, &pic, None).expect("prepare");
        c.display(&gpu, &mut present).expect("display");

        let draws = gpu.draws();
        assert_eq!(draws.len(), 1);
        assert!(matches!(draws[0].kind, DrawKind::Elements { count: 6, .. }));
        assert!(c.overlay_textures().is_empty());
        assert_eq!(present.frames, 1);

        // 4 vertices of xyz.
        assert_eq!(gpu.buffer_data(c.vertex_buffer()).len(), 4 * 3 * 4);
        // 6 u16 indices.
        assert_eq!(gpu.buffer_data(c.index_buffer()).len(), 6 * 2);
    }

    /// Contract: displaying the same prepared frame twice does not touch the geometry
    /// buffers again.
    #[test]
    fn repeated_display_reuses_geometry() {
        let gpu = MockGpu::new();
        let mut c = flat(&gpu, Chroma::Nv12, 48, 32);
        let pic = Picture::new(c.negotiated_format()).expect("picture");

        c.prepare(&gpu, &pic, None).expect("prepare");
        c.display(&gpu, &mut NoopPresent).expect("first display");
        c.display(&gpu, &mut NoopPresent).expect("second display");

        assert_eq!(gpu.buffer_uploads(c.vertex_buffer()), 1);
        assert_eq!(gpu.buffer_uploads(c.index_buffer()), 1);
        for b in c.texcoord_buffers() {
            assert_eq!(gpu.buffer_uploads(*b), 1);
        }
        assert_eq!(gpu.draws().len(), 2);
    }

    /// Contract: a frame that fails to upload is skipped, and the compositor keeps
    /// working for the next one.
    #[test]
    fn bad_frame_does_not_poison_the_session() {
        let gpu = MockGpu::new();
        let mut c = flat(&gpu, Chroma::I420, 32, 32);

        let wrong = Picture::new(&VideoFormat::new(Chroma::Grey, 32, 32)).expect("picture");
        let err = c.prepare(&gpu, &wrong, None).expect_err("chroma mismatch");
        assert_eq!(err.kind(), ErrorKind::Frame);
        assert!(err.is_recoverable());
        c.display(&gpu, &mut NoopPresent).expect("display");
        assert!(gpu.draws().is_empty());

        let good = Picture::new(c.negotiated_format()).expect("picture");
        c.prepare(&gpu, &good, None).expect("prepare");
        c.display(&gpu, &mut NoopPresent).expect("display");
        assert_eq!(gpu.draws().len(), 1);
    }

    /// Contract: every construction failure is fatal and releases what was created.
    #[test]
    fn construction_failures_leak_nothing() {
        let cases = [
            MockFailures {
                fail_vertex_compile: true,
                ..MockFailures::default()
            },
            MockFailures {
                fail_fragment_compile: true,
                ..MockFailures::default()
            },
            MockFailures {
                fail_link: true,
                ..MockFailures::default()
            },
            MockFailures {
                hidden_locations: vec!["ZoomMatrix".into()],
                ..MockFailures::default()
            },
            MockFailures {
                hidden_locations: vec!["MultiTexCoord2".into()],
                ..MockFailures::default()
            },
            MockFailures {
                texture_budget: Some(1),
                ..MockFailures::default()
            },
            MockFailures {
                buffer_budget: Some(2),
                ..MockFailures::default()
            },
        ];

        for failures in cases {
            let gpu = MockGpu::new();
            gpu.set_failures(failures.clone());
            let res = Compositor::new(
                &gpu,
                &VideoFormat::new(Chroma::I420, 64, 64),
                &CompositorConfig::default(),
                &ConverterRegistry::new(),
            );
            let err = res.expect_err("construction must fail");
            assert!(
                matches!(err.kind(), ErrorKind::FatalInit | ErrorKind::OutOfMemory),
                "{failures:?}: {err}"
            );
            assert_eq!(gpu.live_objects(), 0, "{failures:?} leaked objects");
        }
    }

    /// Contract: teardown releases every GL object, after waiting for the GPU.
    #[test]
    fn destroy_after_frames_releases_everything() {
        let gpu = MockGpu::new();
        let mut c = flat(&gpu, Chroma::Rgba, 40, 30);
        let pic = Picture::new(c.negotiated_format()).expect("picture");
        c.prepare(&gpu, &pic, None).expect("prepare");
        c.display(&gpu, &mut NoopPresent).expect("display");
        assert!(gpu.live_objects() > 0);

        c.destroy(&gpu);
        assert_eq!(gpu.live_objects(), 0);
        assert_eq!(gpu.finish_calls(), 1);
    }

    #[test]
    fn pool_request_is_clamped() {
        let gpu = MockGpu::new();
        let mut c = flat(&gpu, Chroma::Grey, 4, 4);
        assert_eq!(c.create_pool(&gpu, 0).expect("pool").len(), 1);
        assert_eq!(c.create_pool(&gpu, 500).expect("pool").len(), 128);
    }
}
