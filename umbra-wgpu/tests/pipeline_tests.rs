//! End-to-end pipeline tests on a headless adapter.
//!
//! Tests for:
//! - GBuffer channel contents after capture
//! - Empty scene output
//! - Point light accumulation and disabled-pass skipping
//! - Bloom contribution from emissive geometry
//! - Light collection mutators and frames recorded into one encoder
//! - Shadowed directional light, with and without a shadow map capture
//! - Processor state errors
//! - Blits into host targets, including clipped offsets
//!
//! Every test returns early when no adapter is available.

use glam::{Mat4, Vec3, Vec4};

use umbra_wgpu::*;

const SIZE: u32 = 256;
const EPSILON: f32 = 1e-3;

fn gpu() -> Option<GpuContext> {
    init_logging();
    match GpuContext::headless() {
        Ok(gpu) => Some(gpu),
        Err(err) => {
            eprintln!("skipping GPU test: {err}");
            None
        }
    }
}

fn camera() -> Camera {
    Camera::look_at(
        Vec3::new(0.0, 0.0, 5.0),
        Vec3::ZERO,
        Vec3::Y,
        Mat4::perspective_rh(60f32.to_radians(), 1.0, 0.1, 100.0),
    )
}

/// Square in the z = `z` plane, facing +Z (counter-clockwise seen from +Z).
fn quad(device: &wgpu::Device, half: f32, z: f32) -> GpuMesh {
    #[rustfmt::skip]
    let positions = [
        -half, -half, z,
         half, -half, z,
         half,  half, z,
        -half,  half, z,
    ];
    let normals = [0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0];
    GpuMesh::upload(device, &positions, &normals, &[0, 1, 2, 0, 2, 3])
}

/// Same square with reversed winding, so it faces -Z.
fn back_quad(device: &wgpu::Device, half: f32, z: f32) -> GpuMesh {
    #[rustfmt::skip]
    let positions = [
        -half, -half, z,
         half, -half, z,
         half,  half, z,
        -half,  half, z,
    ];
    let normals = [0.0, 0.0, -1.0, 0.0, 0.0, -1.0, 0.0, 0.0, -1.0, 0.0, 0.0, -1.0];
    GpuMesh::upload(device, &positions, &normals, &[0, 2, 1, 0, 3, 2])
}

fn white() -> ObjectUniforms {
    ObjectUniforms::new(Mat4::IDENTITY, Vec4::ONE, Vec4::ZERO)
}

/// Capture `meshes` into the GBuffer, run the passes and read the output back.
fn render(
    gpu: &GpuContext,
    processor: &mut Processor,
    meshes: &[(&GpuMesh, ObjectUniforms)],
) -> Vec<[f32; 4]> {
    let ctx = gpu.render_context();
    let mut encoder = gpu
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    {
        let mut capture = processor
            .begin(ctx, &mut encoder, &camera(), false)
            .expect("begin");
        for (mesh, object) in meshes {
            capture.draw_mesh(mesh, object);
        }
    }
    processor.end(ctx, &mut encoder, None).expect("end");
    gpu.queue.submit(Some(encoder.finish()));
    processor.read_output(ctx).expect("readback")
}

fn pixel(pixels: &[[f32; 4]], x: u32, y: u32) -> [f32; 4] {
    pixels[(y * SIZE + x) as usize]
}

/// `Rgba16Float` texture the processor can blit into and the test can read back.
fn host_target(device: &wgpu::Device) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Host Target"),
        size: wgpu::Extent3d {
            width: SIZE,
            height: SIZE,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: HDR_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    })
}

const CENTRE: (u32, u32) = (SIZE / 2, SIZE / 2);
const CORNER: (u32, u32) = (2, 2);

// ============================================================================
// GBuffer / Processor
// ============================================================================

#[test]
fn gbuffer_channels_follow_contract() {
    let Some(gpu) = gpu() else { return };
    let mut processor = Processor::init(&gpu.device, ProcessorSettings::new(SIZE, SIZE)).unwrap();
    let mesh = quad(&gpu.device, 2.0, 0.0);
    let albedo = Vec4::new(0.25, 0.5, 0.75, 1.0);
    render(
        &gpu,
        &mut processor,
        &[(&mesh, ObjectUniforms::new(Mat4::IDENTITY, albedo, Vec4::ZERO))],
    );

    let ctx = gpu.render_context();
    let read = |channel| read_rgba16f(ctx, processor.gbuffer().texture(channel)).unwrap();

    let albedo_px = read(GBufferChannel::Albedo);
    let c = albedo_px[(CENTRE.1 * SIZE + CENTRE.0) as usize];
    assert!((c[0] - 0.25).abs() < EPSILON && (c[2] - 0.75).abs() < EPSILON, "{c:?}");

    let position = read(GBufferChannel::Position);
    assert_eq!(position[(CENTRE.1 * SIZE + CENTRE.0) as usize][3], 1.0);
    assert_eq!(position[(CORNER.1 * SIZE + CORNER.0) as usize], [0.0; 4]);

    let depth_normal = read(GBufferChannel::DepthNormal);
    let dn = depth_normal[(CENTRE.1 * SIZE + CENTRE.0) as usize];
    assert!((dn[2] - 1.0).abs() < EPSILON, "normal z = {}", dn[2]);
    assert!((dn[3] - 5.0).abs() < 0.01, "linear depth = {}", dn[3]);
}

#[test]
fn empty_scene_outputs_zero() {
    let Some(gpu) = gpu() else { return };
    let mut processor = Processor::init(&gpu.device, ProcessorSettings::new(SIZE, SIZE)).unwrap();
    let _lights = processor.create_pass::<PointLightPass>(&gpu.device).unwrap();

    let output = render(&gpu, &mut processor, &[]);

    assert_eq!(output.len(), (SIZE * SIZE) as usize);
    assert!(
        output.iter().all(|p| *p == [0.0; 4]),
        "empty scene should stay transparent black"
    );
    assert_eq!(processor.num_processed_passes(), 1);
}

#[test]
fn point_light_lights_geometry_only() {
    let Some(gpu) = gpu() else { return };
    let mut processor = Processor::init(&gpu.device, ProcessorSettings::new(SIZE, SIZE)).unwrap();
    let lights = processor.create_pass::<PointLightPass>(&gpu.device).unwrap();
    processor.pass_mut(lights).unwrap().add_light(PointLight {
        position: Vec3::new(0.0, 0.0, 2.0),
        radius: 10.0,
        ..Default::default()
    });

    let mesh = quad(&gpu.device, 2.0, 0.0);
    let output = render(&gpu, &mut processor, &[(&mesh, white())]);

    let centre = pixel(&output, CENTRE.0, CENTRE.1);
    assert!(centre[0] > 0.5, "centre should be lit, got {centre:?}");
    assert_eq!(pixel(&output, CORNER.0, CORNER.1), [0.0; 4]);
}

#[test]
fn disabled_bloom_adds_nothing() {
    let Some(gpu) = gpu() else { return };
    let mut processor = Processor::init(&gpu.device, ProcessorSettings::new(SIZE, SIZE)).unwrap();
    let lights = processor.create_pass::<PointLightPass>(&gpu.device).unwrap();
    let bloom = processor.create_pass::<HdrBloomPass>(&gpu.device).unwrap();
    processor.pass_mut(lights).unwrap().add_light(PointLight {
        position: Vec3::new(0.0, 0.0, 2.0),
        radius: 10.0,
        ..Default::default()
    });
    processor.pass_mut(bloom).unwrap().set_enabled(false);

    let mesh = quad(&gpu.device, 2.0, 0.0);
    let emissive = ObjectUniforms::new(Mat4::IDENTITY, Vec4::ONE, Vec4::splat(2.0));

    let with_disabled = render(&gpu, &mut processor, &[(&mesh, emissive)]);
    assert_eq!(processor.num_processed_passes(), 1);

    processor.remove_pass(bloom).unwrap();
    assert_eq!(processor.len(), 1);
    let light_only = render(&gpu, &mut processor, &[(&mesh, emissive)]);

    assert_eq!(with_disabled, light_only);
}

#[test]
fn enabled_bloom_spreads_emissive_light() {
    let Some(gpu) = gpu() else { return };
    let mut processor = Processor::init(&gpu.device, ProcessorSettings::new(SIZE, SIZE)).unwrap();
    let bloom = processor.create_pass::<HdrBloomPass>(&gpu.device).unwrap();

    let mesh = quad(&gpu.device, 2.0, 0.0);
    let emissive = ObjectUniforms::new(Mat4::IDENTITY, Vec4::ONE, Vec4::splat(4.0));

    // The quad edge lands near x = 217; x = 222 is just outside it.
    let glow = pixel(&render(&gpu, &mut processor, &[(&mesh, emissive)]), 222, CENTRE.1);
    assert!(glow[0] > 0.0, "bloom should spill past the edge, got {glow:?}");

    processor.pass_mut(bloom).unwrap().set_enabled(false);
    let plain = pixel(&render(&gpu, &mut processor, &[(&mesh, emissive)]), 222, CENTRE.1);
    assert_eq!(plain, [0.0; 4]);
}

#[test]
fn light_mutators_take_effect_without_readding() {
    let Some(gpu) = gpu() else { return };
    let mut processor = Processor::init(&gpu.device, ProcessorSettings::new(SIZE, SIZE)).unwrap();
    let lights = processor.create_pass::<PointLightPass>(&gpu.device).unwrap();

    {
        let pass = processor.pass_mut(lights).unwrap();
        assert_eq!(pass.lights_size(), 0);
        pass.add_light(PointLight::new(Vec3::new(0.0, 0.0, 2.0)));
        assert_eq!(pass.lights_size(), 1);
        pass.add_light(PointLight::default());
        pass.clear();
        assert_eq!(pass.lights_size(), 0);
        pass.add_light(PointLight {
            position: Vec3::new(0.0, 0.0, 2.0),
            radius: 10.0,
            ..Default::default()
        });
    }

    let mesh = quad(&gpu.device, 2.0, 0.0);
    let lit = pixel(&render(&gpu, &mut processor, &[(&mesh, white())]), CENTRE.0, CENTRE.1);
    assert!(lit[0] > 0.5);

    processor
        .pass_mut(lights)
        .unwrap()
        .light_ref(0)
        .unwrap()
        .intensity = 0.0;
    let dark = pixel(&render(&gpu, &mut processor, &[(&mesh, white())]), CENTRE.0, CENTRE.1);
    assert!(dark[0].abs() < EPSILON, "zero intensity should add nothing, got {dark:?}");
}

#[test]
fn frames_sharing_an_encoder_keep_their_own_light_values() {
    let Some(gpu) = gpu() else { return };
    let settings = ProcessorSettings::new(SIZE, SIZE).with_output_format(HDR_FORMAT);
    let mut processor = Processor::init(&gpu.device, settings).unwrap();
    let lights = processor.create_pass::<PointLightPass>(&gpu.device).unwrap();
    processor.pass_mut(lights).unwrap().add_light(PointLight {
        position: Vec3::new(0.0, 0.0, 2.0),
        radius: 10.0,
        ..Default::default()
    });

    let mesh = quad(&gpu.device, 2.0, 0.0);
    let first = host_target(&gpu.device);
    let second = host_target(&gpu.device);
    let ctx = gpu.render_context();
    let mut encoder = gpu
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });

    {
        let mut capture = processor.begin(ctx, &mut encoder, &camera(), false).unwrap();
        capture.draw_mesh(&mesh, &white());
    }
    processor.end(ctx, &mut encoder, Some(&first)).unwrap();

    processor
        .pass_mut(lights)
        .unwrap()
        .light_ref(0)
        .unwrap()
        .intensity = 0.0;
    {
        let mut capture = processor.begin(ctx, &mut encoder, &camera(), false).unwrap();
        capture.draw_mesh(&mesh, &white());
    }
    processor.end(ctx, &mut encoder, Some(&second)).unwrap();
    gpu.queue.submit(Some(encoder.finish()));

    let lit = pixel(&read_rgba16f(ctx, &first).unwrap(), CENTRE.0, CENTRE.1);
    let dark = pixel(&read_rgba16f(ctx, &second).unwrap(), CENTRE.0, CENTRE.1);
    assert!(lit[0] > 0.5, "first frame keeps its light, got {lit:?}");
    assert!(dark[0].abs() < EPSILON, "second frame has a zero-intensity light, got {dark:?}");
}

#[test]
fn many_lights_grow_storage() {
    let Some(gpu) = gpu() else { return };
    let mut processor = Processor::init(&gpu.device, ProcessorSettings::new(SIZE, SIZE)).unwrap();
    let lights = processor.create_pass::<PointLightPass>(&gpu.device).unwrap();
    for _ in 0..40 {
        processor.pass_mut(lights).unwrap().add_light(PointLight {
            position: Vec3::new(0.0, 0.0, 2.0),
            radius: 10.0,
            intensity: 0.01,
            ..Default::default()
        });
    }

    let mesh = quad(&gpu.device, 2.0, 0.0);
    let output = render(&gpu, &mut processor, &[(&mesh, white())]);
    assert!(pixel(&output, CENTRE.0, CENTRE.1)[0] > 0.0);
}

// ============================================================================
// Shadow light
// ============================================================================

#[test]
fn shadow_light_darkens_occluded_pixels() {
    let Some(gpu) = gpu() else { return };
    let mut settings = ProcessorSettings::new(SIZE, SIZE);
    settings.shadow.near_clip = 1.0;
    settings.shadow.far_clip = 50.0;
    settings.shadow.view_port_size = 10.0;
    let mut processor = Processor::init(&gpu.device, settings).unwrap();
    let shadow = processor.create_pass::<ShadowLightPass>(&gpu.device).unwrap();
    {
        let pass = processor.pass_mut(shadow).unwrap();
        pass.set_position(Vec3::new(0.0, 0.0, 10.0));
        pass.look_at(Vec3::ZERO, Vec3::Y);
        assert!((pass.linear_depth_scalar() - 1.0 / 49.0).abs() < 1e-6);
    }

    let ground = quad(&gpu.device, 2.0, 0.0);
    // Faces away from the light so front-face culling keeps it in the map.
    let occluder = back_quad(&gpu.device, 1.0, 1.0);

    let ctx = gpu.render_context();
    let mut encoder = gpu
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    {
        let pass = processor.pass_mut(shadow).unwrap();
        let mut capture = pass.begin_shadow_map(ctx, &mut encoder, false);
        capture.draw_mesh(&ground, &white());
        capture.draw_mesh(&occluder, &white());
        ShadowLightPass::end_shadow_map(capture);
    }
    {
        let mut capture = processor.begin(ctx, &mut encoder, &camera(), false).unwrap();
        capture.draw_mesh(&ground, &white());
    }
    processor.end(ctx, &mut encoder, None).unwrap();
    gpu.queue.submit(Some(encoder.finish()));
    let output = processor.read_output(ctx).unwrap();

    // World x = 1.5 on the ground, outside the occluder's footprint.
    let lit = pixel(&output, 194, CENTRE.1);
    let shadowed = pixel(&output, CENTRE.0, CENTRE.1);
    assert!(lit[0] > 1.0, "unoccluded ground: {lit:?}");
    assert!(shadowed[0] > 0.0, "ambient survives in shadow: {shadowed:?}");
    assert!(
        shadowed[0] < lit[0] * 0.8,
        "occluded {shadowed:?} should be darker than lit {lit:?}"
    );
    assert_eq!(pixel(&output, CORNER.0, CORNER.1), [0.0; 4]);
}

#[test]
fn shadow_light_without_capture_lights_everything() {
    let Some(gpu) = gpu() else { return };
    let mut settings = ProcessorSettings::new(SIZE, SIZE);
    settings.shadow.near_clip = 1.0;
    settings.shadow.far_clip = 50.0;
    settings.shadow.view_port_size = 10.0;
    let mut processor = Processor::init(&gpu.device, settings).unwrap();
    let shadow = processor.create_pass::<ShadowLightPass>(&gpu.device).unwrap();
    {
        let pass = processor.pass_mut(shadow).unwrap();
        pass.set_position(Vec3::new(0.0, 0.0, 10.0));
        pass.look_at(Vec3::ZERO, Vec3::Y);
    }

    let ground = quad(&gpu.device, 2.0, 0.0);
    // ambient 0.1 + diffuse 1.0 * n.l 1.0, with no darkness applied.
    for frame in 0..2 {
        let output = render(&gpu, &mut processor, &[(&ground, white())]);
        let centre = pixel(&output, CENTRE.0, CENTRE.1);
        assert!((centre[0] - 1.1).abs() < 0.01, "frame {frame}: {centre:?}");
    }
}

// ============================================================================
// State and registry errors
// ============================================================================

#[test]
fn zero_size_is_rejected() {
    let Some(gpu) = gpu() else { return };
    let result = Processor::init(&gpu.device, ProcessorSettings::new(0, 64));
    assert!(matches!(
        result,
        Err(UmbraError::InvalidSize { width: 0, height: 64 })
    ));
}

#[test]
fn out_of_order_calls_are_state_errors() {
    let Some(gpu) = gpu() else { return };
    let mut processor = Processor::init(&gpu.device, ProcessorSettings::new(64, 64)).unwrap();
    let ctx = gpu.render_context();
    let mut encoder = gpu
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });

    assert!(matches!(
        processor.end(ctx, &mut encoder, None),
        Err(UmbraError::InvalidState { expected: "Capturing", found: "Idle" })
    ));

    drop(processor.begin(ctx, &mut encoder, &camera(), false).unwrap());
    assert_eq!(processor.state(), ProcessorState::Capturing);
    assert!(matches!(
        processor.begin(ctx, &mut encoder, &camera(), false),
        Err(UmbraError::InvalidState { expected: "Idle", .. })
    ));
    assert!(processor.process(ctx, &mut encoder).is_err());

    processor.end(ctx, &mut encoder, None).unwrap();
    assert_eq!(processor.state(), ProcessorState::Idle);
    gpu.queue.submit(Some(encoder.finish()));
}

#[test]
fn registry_keeps_order_and_rejects_stale_handles() {
    let Some(gpu) = gpu() else { return };
    let mut processor = Processor::init(&gpu.device, ProcessorSettings::new(64, 64)).unwrap();
    let a = processor.create_pass::<PointLightPass>(&gpu.device).unwrap();
    let b = processor.create_pass::<ShadowLightPass>(&gpu.device).unwrap();
    let c = processor.create_pass::<HdrBloomPass>(&gpu.device).unwrap();

    let names: Vec<_> = processor.passes().map(|p| p.name().to_string()).collect();
    assert_eq!(names, ["PointLightPass", "ShadowLightPass", "HdrBloomPass"]);
    assert_eq!(processor.get(2).map(|p| p.size()), Some((64, 64)));

    processor.remove_pass(b).unwrap();
    assert_eq!(processor.get(1).map(|p| p.name()), Some("HdrBloomPass"));
    assert!(matches!(processor.pass(b), Err(UmbraError::PassNotFound)));
    assert!(matches!(processor.remove_pass(b), Err(UmbraError::PassNotFound)));
    assert!(processor.pass(a).is_ok());
    assert!(processor.pass(c).is_ok());
}

#[test]
fn output_saves_as_png() {
    let Some(gpu) = gpu() else { return };
    let mut processor = Processor::init(&gpu.device, ProcessorSettings::new(32, 32)).unwrap();
    let ctx = gpu.render_context();
    let mut encoder = gpu
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    drop(processor.begin(ctx, &mut encoder, &camera(), false).unwrap());
    processor.end(ctx, &mut encoder, None).unwrap();
    gpu.queue.submit(Some(encoder.finish()));

    let path = std::env::temp_dir().join("umbra_output_test.png");
    processor.save_output_png(ctx, &path).unwrap();
    let image = image::open(&path).unwrap();
    assert_eq!((image.width(), image.height()), (32, 32));
    let _ = std::fs::remove_file(&path);
}

#[test]
fn draw_blits_into_host_target() {
    let Some(gpu) = gpu() else { return };
    let settings = ProcessorSettings::new(SIZE, SIZE).with_output_format(HDR_FORMAT);
    let mut processor = Processor::init(&gpu.device, settings).unwrap();
    let lights = processor.create_pass::<PointLightPass>(&gpu.device).unwrap();
    processor.pass_mut(lights).unwrap().add_light(PointLight {
        position: Vec3::new(0.0, 0.0, 2.0),
        radius: 10.0,
        ..Default::default()
    });

    let target = host_target(&gpu.device);
    let mesh = quad(&gpu.device, 2.0, 0.0);
    let ctx = gpu.render_context();
    let mut encoder = gpu
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    {
        let mut capture = processor.begin(ctx, &mut encoder, &camera(), false).unwrap();
        capture.draw_mesh(&mesh, &white());
    }
    processor.end(ctx, &mut encoder, Some(&target)).unwrap();
    gpu.queue.submit(Some(encoder.finish()));

    let blitted = read_rgba16f(ctx, &target).unwrap();
    let output = processor.read_output(ctx).unwrap();
    let b = pixel(&blitted, CENTRE.0, CENTRE.1);
    let o = pixel(&output, CENTRE.0, CENTRE.1);
    assert!((b[0] - o[0]).abs() < EPSILON, "blit {b:?} vs output {o:?}");
    assert_eq!(b[3], 1.0);
}

#[test]
fn draw_clips_offset_blits_at_target_edges() {
    let Some(gpu) = gpu() else { return };
    let settings = ProcessorSettings::new(SIZE, SIZE).with_output_format(HDR_FORMAT);
    let mut processor = Processor::init(&gpu.device, settings).unwrap();
    let lights = processor.create_pass::<PointLightPass>(&gpu.device).unwrap();
    processor.pass_mut(lights).unwrap().add_light(PointLight {
        position: Vec3::new(0.0, 0.0, 2.0),
        radius: 10.0,
        ..Default::default()
    });
    let mesh = quad(&gpu.device, 2.0, 0.0);
    let output = render(&gpu, &mut processor, &[(&mesh, white())]);

    let shifted = host_target(&gpu.device);
    let pulled_back = host_target(&gpu.device);
    let missed = host_target(&gpu.device);
    let ctx = gpu.render_context();
    let mut encoder = gpu
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    processor.draw(ctx, &mut encoder, &shifted, 10.0, 10.0);
    processor.draw(ctx, &mut encoder, &pulled_back, -16.0, -16.0);
    processor.draw(ctx, &mut encoder, &missed, SIZE as f32, 0.0);
    gpu.queue.submit(Some(encoder.finish()));

    let o = pixel(&output, CENTRE.0, CENTRE.1);
    assert!(o[0] > 0.5, "lit centre expected, got {o:?}");

    let shifted = read_rgba16f(ctx, &shifted).unwrap();
    let s = pixel(&shifted, CENTRE.0 + 10, CENTRE.1 + 10);
    assert!((s[0] - o[0]).abs() < EPSILON, "shifted {s:?} vs output {o:?}");
    assert_eq!(pixel(&shifted, 5, 5), [0.0; 4], "left of the blit is untouched");
    assert_eq!(pixel(&shifted, SIZE - 1, SIZE - 1)[3], 1.0, "clipped blit reaches the edge");

    let pulled_back = read_rgba16f(ctx, &pulled_back).unwrap();
    let p = pixel(&pulled_back, CENTRE.0 - 16, CENTRE.1 - 16);
    assert!((p[0] - o[0]).abs() < EPSILON, "pulled back {p:?} vs output {o:?}");
    assert_eq!(pixel(&pulled_back, 0, 0)[3], 1.0);
    assert_eq!(pixel(&pulled_back, SIZE - 5, SIZE - 5), [0.0; 4]);

    let missed = read_rgba16f(ctx, &missed).unwrap();
    assert!(missed.iter().all(|p| *p == [0.0; 4]));
}
