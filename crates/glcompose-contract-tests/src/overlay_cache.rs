#![forbid(unsafe_code)]

#[cfg(test)]
mod tests {
    use glcompose_core::{Chroma, CompositorConfig, ErrorKind, Picture, Subpicture, VideoFormat};
    use glcompose_runtime_glow::mock::{DrawKind, MockGpu};
    use glcompose_runtime_glow::{Compositor, ConverterRegistry, NoopPresent};

    fn session(gpu: &MockGpu) -> (Compositor, Picture) {
        let c = Compositor::new(
            gpu,
            &VideoFormat::new(Chroma::I420, 64, 64),
            &CompositorConfig::default(),
            &ConverterRegistry::new(),
        )
        .expect("compositor");
        let pic = Picture::new(c.negotiated_format()).expect("picture");
        (c, pic)
    }

    fn rgba(w: u32, h: u32) -> Picture {
        Picture::new(&VideoFormat::new(Chroma::Rgba, w, h)).expect("region picture")
    }

    /// Contract: one 32x32 region at (10,10) with alpha 128 is one blended quad at
    /// alpha 128/255, placed on the 64x64 canvas; removing it frees its texture.
    #[test]
    fn single_region_lifecycle() {
        let gpu = MockGpu::new();
        let (mut c, pic) = session(&gpu);
        let region = rgba(32, 32);
        let mut sub = Subpicture::new(64, 64);
        sub.push(&region, 10, 10, 128);

        let before = gpu.live_textures();
        c.prepare(&gpu, &pic, Some(&sub)).expect("prepare");
        c.display(&gpu, &mut NoopPresent).expect("display");
        assert_eq!(gpu.live_textures(), before + 1);

        let entries = c.overlay_textures();
        assert_eq!(entries.len(), 1);
        let e = &entries[0];
        assert!((e.alpha - 128.0 / 255.0).abs() < 1e-6);
        assert!((e.alpha - 0.502).abs() < 1e-3);
        assert!((e.left - (20.0 / 64.0 - 1.0)).abs() < 1e-6);
        assert!((e.top - (1.0 - 20.0 / 64.0)).abs() < 1e-6);
        assert!((e.right - (84.0 / 64.0 - 1.0)).abs() < 1e-6);
        assert!((e.bottom - (1.0 - 84.0 / 64.0)).abs() < 1e-6);

        {
            let draws = gpu.draws();
            assert_eq!(draws.len(), 2);
            assert!(matches!(draws[1].kind, DrawKind::Arrays { first: 0, count: 4, .. }));
            assert!(draws[1].blend);
            assert_eq!(draws[1].textures.first().copied().flatten(), Some(e.texture));
        }

        c.prepare(&gpu, &pic, None).expect("prepare without overlay");
        assert!(c.overlay_textures().is_empty());
        assert_eq!(gpu.live_textures(), before);
    }

    /// Contract: a region of unchanged size reuses its texture across frames.
    #[test]
    fn same_size_region_is_recycled() {
        let gpu = MockGpu::new();
        let (mut c, pic) = session(&gpu);
        let region = rgba(16, 8);
        let created = gpu.textures_created();

        for x in 0..5 {
            let mut sub = Subpicture::new(64, 64);
            sub.push(&region, x * 4, 0, 255);
            c.prepare(&gpu, &pic, Some(&sub)).expect("prepare");
            c.display(&gpu, &mut NoopPresent).expect("display");
        }
        assert_eq!(gpu.textures_created(), created + 1);
        assert_eq!(c.overlay_textures().len(), 1);
    }

    /// Contract: a size change releases the old texture and allocates a new one, so
    /// live textures never exceed the number of regions.
    #[test]
    fn size_change_reallocates() {
        let gpu = MockGpu::new();
        let (mut c, pic) = session(&gpu);
        let base = gpu.live_textures();
        let small = rgba(8, 8);
        let large = rgba(24, 12);

        let mut sub = Subpicture::new(64, 64);
        sub.push(&small, 0, 0, 255);
        sub.push(&small, 20, 20, 255);
        c.prepare(&gpu, &pic, Some(&sub)).expect("prepare");
        assert_eq!(gpu.live_textures(), base + 2);
        let first = c.overlay_textures()[0].texture;

        let mut sub = Subpicture::new(64, 64);
        sub.push(&large, 0, 0, 255);
        c.prepare(&gpu, &pic, Some(&sub)).expect("prepare");
        assert_eq!(gpu.live_textures(), base + 1);
        let entry = &c.overlay_textures()[0];
        assert_eq!((entry.width, entry.height), (24, 12));
        let t = gpu.texture(entry.texture).expect("overlay texture");
        assert_eq!((t.width, t.height), (24, 12));
        assert!(gpu.texture(first).is_none());
    }

    /// Contract: many regions grow the buffer pool and draw one strip each.
    #[test]
    fn many_regions_grow_the_buffer_pool() {
        let gpu = MockGpu::new();
        let (mut c, pic) = session(&gpu);
        let region = rgba(2, 2);
        let mut sub = Subpicture::new(64, 64);
        for i in 0..10 {
            sub.push(&region, i * 3, i * 3, 200);
        }
        c.prepare(&gpu, &pic, Some(&sub)).expect("prepare");
        c.display(&gpu, &mut NoopPresent).expect("display");

        // Two buffers per region.
        assert!(c.overlay_buffer_capacity() >= 20);
        let strips = gpu
            .draws()
            .iter()
            .filter(|d| matches!(d.kind, DrawKind::Arrays { .. }))
            .count();
        assert_eq!(strips, 10);
    }

    /// Contract: a region in an unsupported chroma is skipped, the others are drawn.
    #[test]
    fn unsupported_region_is_skipped() {
        let gpu = MockGpu::new();
        let (mut c, pic) = session(&gpu);
        let good = rgba(4, 4);
        let bad = Picture::new(&VideoFormat::new(Chroma::I420, 4, 4)).expect("picture");
        let mut sub = Subpicture::new(64, 64);
        sub.push(&bad, 0, 0, 255);
        sub.push(&good, 8, 8, 255);

        let err = c.prepare(&gpu, &pic, Some(&sub)).expect_err("bad region");
        assert_eq!(err.kind(), ErrorKind::Frame);
        assert_eq!(c.overlay_textures().len(), 1);

        c.display(&gpu, &mut NoopPresent).expect("display");
        assert_eq!(gpu.draws().len(), 2);
    }

    #[test]
    fn overlay_textures_are_power_of_two_without_npot() {
        let gpu = MockGpu::without_npot();
        let (mut c, pic) = session(&gpu);
        let region = rgba(20, 10);
        let mut sub = Subpicture::new(64, 64);
        sub.push(&region, 0, 0, 255);
        c.prepare(&gpu, &pic, Some(&sub)).expect("prepare");

        let e = &c.overlay_textures()[0];
        assert_eq!((e.tex_size.width, e.tex_size.height), (32, 16));
        assert!((e.tex_width - 20.0 / 32.0).abs() < 1e-6);
        assert!((e.tex_height - 10.0 / 16.0).abs() < 1e-6);
    }
}
