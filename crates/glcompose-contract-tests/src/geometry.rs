#![forbid(unsafe_code)]

#[cfg(test)]
mod tests {
    use glcompose_core::{Chroma, CompositorConfig, Picture, ProjectionMode, VideoFormat};
    use glcompose_geometry::{
        build_geometry, plane_crops, texture_sizes, CubemapPadding, PlaneScale, TexSize,
    };
    use glcompose_runtime_glow::mock::{DrawKind, MockGpu};
    use glcompose_runtime_glow::{Compositor, ConverterRegistry, NoopPresent};

    fn scales(chroma: Chroma) -> Vec<PlaneScale> {
        chroma
            .planes()
            .iter()
            .map(|p| PlaneScale::new(p.w, p.h))
            .collect()
    }

    fn f32s(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            .collect()
    }

    fn drawn(projection: ProjectionMode, w: u32, h: u32) -> (MockGpu, Compositor) {
        let gpu = MockGpu::new();
        let fmt = VideoFormat::new(Chroma::I420, w, h).with_projection(projection);
        let mut c = Compositor::new(&gpu, &fmt, &CompositorConfig::default(), &ConverterRegistry::new())
            .expect("compositor");
        let pic = Picture::new(c.negotiated_format()).expect("picture");
        c.prepare(&gpu, &pic, None).expect("prepare");
        c.display(&gpu, &mut NoopPresent).expect("display");
        (gpu, c)
    }

    /// Contract: per-projection vertex and index counts, as uploaded.
    #[test]
    fn projection_counts_reach_the_gpu() {
        let cases = [
            (ProjectionMode::Flat, 4usize, 6usize),
            (ProjectionMode::Equirectangular, 129 * 129, 98_304),
            (ProjectionMode::Cubemap, 24, 36),
        ];
        for (projection, vertices, indices) in cases {
            let (gpu, c) = drawn(projection, 96, 64);
            assert_eq!(
                gpu.buffer_data(c.vertex_buffer()).len(),
                vertices * 3 * 4,
                "{projection:?} vertices"
            );
            assert_eq!(
                gpu.buffer_data(c.index_buffer()).len(),
                indices * 2,
                "{projection:?} indices"
            );
            for b in c.texcoord_buffers() {
                assert_eq!(gpu.buffer_data(*b).len(), vertices * 2 * 4);
            }
            let draws = gpu.draws();
            assert!(
                matches!(draws[0].kind, DrawKind::Elements { count, .. } if count as usize == indices),
                "{projection:?}: {:?}",
                draws[0].kind
            );
        }
    }

    /// Contract: every index addresses an existing vertex.
    #[test]
    fn indices_stay_in_range() {
        for projection in [
            ProjectionMode::Flat,
            ProjectionMode::Equirectangular,
            ProjectionMode::Cubemap,
        ] {
            let source = VideoFormat::new(Chroma::Nv12, 64, 64).source_rect();
            let sc = scales(Chroma::Nv12);
            let tex = texture_sizes(64, 64, &sc, true);
            let g = build_geometry(projection, &plane_crops(&source, &sc, &tex), CubemapPadding::default())
                .expect("geometry");
            let max = g.indices.iter().copied().max().unwrap_or(0) as usize;
            assert!(max < g.vertex_count(), "{projection:?}");
            assert_eq!(g.texcoords.len(), 2 * g.vertex_count() * 2);
        }
    }

    /// Contract: crop extent times texture size gives the visible size back, for every
    /// plane, with and without power-of-two rounding.
    #[test]
    fn crop_round_trips_to_visible_size() {
        let fmt = VideoFormat::new(Chroma::I420, 100, 50).with_crop(10, 4, 80, 40);
        let source = fmt.source_rect();
        let sc = scales(Chroma::I420);

        for npot in [true, false] {
            let tex = texture_sizes(fmt.width, fmt.height, &sc, npot);
            let crops = plane_crops(&source, &sc, &tex);
            for ((crop, t), s) in crops.iter().zip(&tex).zip(&sc) {
                let visible_w = s.w.apply(source.visible_width) as f32;
                let visible_h = s.h.apply(source.visible_height) as f32;
                assert!((crop.width() * t.width as f32 - visible_w).abs() < 1e-3, "npot={npot}");
                assert!((crop.height() * t.height as f32 - visible_h).abs() < 1e-3, "npot={npot}");
                if !npot {
                    assert!(t.width.is_power_of_two() && t.height.is_power_of_two());
                }
            }
        }
    }

    /// Contract: without NPOT support textures are rounded up and the quad samples only
    /// the written texels.
    #[test]
    fn pot_only_gpu_samples_the_written_area() {
        let gpu = MockGpu::without_npot();
        let mut c = Compositor::new(
            &gpu,
            &VideoFormat::new(Chroma::Rgba, 100, 50),
            &CompositorConfig::default(),
            &ConverterRegistry::new(),
        )
        .expect("compositor");
        assert_eq!(c.texture_sizes(), &[TexSize::new(128, 64)]);
        let t = gpu.texture(c.video_textures()[0]).expect("texture");
        assert_eq!((t.width, t.height), (128, 64));

        let pic = Picture::new(c.negotiated_format()).expect("picture");
        c.prepare(&gpu, &pic, None).expect("prepare");
        c.display(&gpu, &mut NoopPresent).expect("display");

        let uv = f32s(&gpu.buffer_data(c.texcoord_buffers()[0]));
        let (r, b) = (100.0 / 128.0, 50.0 / 64.0);
        assert_eq!(uv, vec![0.0, 0.0, 0.0, b, r, 0.0, r, b]);
        assert!(gpu.upload_errors().is_empty(), "{:?}", gpu.upload_errors());
    }
}
