//! Directional light with a single orthographic shadow map.
//!
//! Per frame: `update(camera)` → `begin_shadow_map` → host draws the scene
//! from the light → capture dropped → `render`. The processor calls
//! `update` and `render`; the host owns the capture in between.

use glam::{Mat4, Quat, Vec3, Vec4};
use umbra_gpu_shared::shaders;
use umbra_gpu_shared::uniforms::{ShadowCaptureUniforms, ShadowLightParams};
use wgpu::util::DeviceExt;

use super::{render_fullscreen_effect, CreatePass, PassInfo, RenderPass};
use crate::backend::{GBuffer, GBufferChannel, RenderTarget};
use crate::camera::Camera;
use crate::capture::{CaptureShader, ObjectBinder, SceneCapture};
use crate::error::Result;
use crate::gpu::{self, RenderContext};
use crate::pipeline;
use crate::render_targets::{self, HDR_FORMAT};
use crate::settings::{ProcessorSettings, ShadowSettings};

/// Maps clip-space xy in [-1, 1] (y up) to texture uv in [0, 1] (v down).
/// Depth is already 0..1 and passes through.
pub const BIAS_MATRIX: Mat4 = Mat4::from_cols(
    Vec4::new(0.5, 0.0, 0.0, 0.0),
    Vec4::new(0.0, -0.5, 0.0, 0.0),
    Vec4::new(0.0, 0.0, 1.0, 0.0),
    Vec4::new(0.5, 0.5, 0.0, 1.0),
);

/// Light-space matrices, free of GPU state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowProjection {
    near_clip: f32,
    far_clip: f32,
    /// Half-extent of the orthographic frustum.
    pub view_port_size: f32,
    linear_depth_scalar: f32,
    pub projection: Mat4,
    pub view: Mat4,
    /// bias * projection * view * inverse(camera view)
    pub shadow_trans: Mat4,
    /// Light forward direction in camera space.
    pub direction_in_view: Vec3,
}

impl ShadowProjection {
    pub fn new(settings: &ShadowSettings) -> Self {
        Self {
            near_clip: settings.near_clip,
            far_clip: settings.far_clip,
            view_port_size: settings.view_port_size,
            linear_depth_scalar: 1.0 / (settings.far_clip - settings.near_clip),
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            shadow_trans: Mat4::IDENTITY,
            direction_in_view: Vec3::NEG_Z,
        }
    }

    pub fn near_clip(&self) -> f32 {
        self.near_clip
    }

    pub fn far_clip(&self) -> f32 {
        self.far_clip
    }

    pub fn linear_depth_scalar(&self) -> f32 {
        self.linear_depth_scalar
    }

    pub fn set_near_clip(&mut self, near: f32) {
        self.near_clip = near;
        self.recompute_scalar();
    }

    pub fn set_far_clip(&mut self, far: f32) {
        self.far_clip = far;
        self.recompute_scalar();
    }

    fn recompute_scalar(&mut self) {
        self.linear_depth_scalar = 1.0 / (self.far_clip - self.near_clip);
    }

    /// Orthographic projection and light view from the light's world transform.
    pub fn update_light(&mut self, position: Vec3, orientation: Quat) {
        let s = self.view_port_size;
        self.projection = Mat4::orthographic_rh(-s, s, -s, s, self.near_clip, self.far_clip);
        self.view = Mat4::from_rotation_translation(orientation, position).inverse();
    }

    /// Full per-frame recompute against the viewing camera.
    pub fn update(&mut self, camera_view: &Mat4, position: Vec3, orientation: Quat) {
        self.recompute_scalar();
        self.update_light(position, orientation);
        self.shadow_trans = BIAS_MATRIX * self.projection * self.view * camera_view.inverse();

        let look_dir = orientation * Vec3::NEG_Z;
        let normal_matrix = camera_view.inverse().transpose();
        self.direction_in_view = normal_matrix
            .transform_vector3(look_dir)
            .normalize_or_zero();
    }

    pub fn capture_uniforms(&self) -> ShadowCaptureUniforms {
        ShadowCaptureUniforms {
            view: self.view.to_cols_array_2d(),
            projection: self.projection.to_cols_array_2d(),
            near_clip: self.near_clip,
            linear_depth_scalar: self.linear_depth_scalar,
            _pad0: 0.0,
            _pad1: 0.0,
        }
    }
}

pub struct ShadowLightPass {
    info: PassInfo,
    shadow: ShadowProjection,
    position: Vec3,
    orientation: Quat,
    pub ambient: Vec3,
    pub diffuse: Vec3,
    /// Fraction of diffuse light removed in shadow.
    pub darkness: f32,
    pub depth_bias: f32,
    /// Set by `begin_shadow_map`. Until then the map is held at the far plane.
    captured: bool,
    warned_uncaptured: bool,

    shadow_map: RenderTarget,
    capture_pipeline: wgpu::RenderPipeline,
    capture_buffer: wgpu::Buffer,
    capture_bind_group: wgpu::BindGroup,
    objects: ObjectBinder,

    light_pipeline: wgpu::RenderPipeline,
    light_bgl: wgpu::BindGroupLayout,
    params_buffer: wgpu::Buffer,
    sampler: wgpu::Sampler,
}

impl ShadowLightPass {
    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    pub fn orientation(&self) -> Quat {
        self.orientation
    }

    pub fn set_orientation(&mut self, orientation: Quat) {
        self.orientation = orientation;
    }

    /// Point the light's -Z axis at `target`.
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        let view = Mat4::look_at_rh(self.position, target, up);
        let (_, rotation, _) = view.inverse().to_scale_rotation_translation();
        self.orientation = rotation;
    }

    pub fn look_at_dir(&self) -> Vec3 {
        self.orientation * Vec3::NEG_Z
    }

    pub fn near_clip(&self) -> f32 {
        self.shadow.near_clip()
    }

    pub fn far_clip(&self) -> f32 {
        self.shadow.far_clip()
    }

    pub fn set_near_clip(&mut self, near: f32) {
        self.shadow.set_near_clip(near);
    }

    pub fn set_far_clip(&mut self, far: f32) {
        self.shadow.set_far_clip(far);
    }

    pub fn set_view_port_size(&mut self, size: f32) {
        self.shadow.view_port_size = size;
    }

    pub fn linear_depth_scalar(&self) -> f32 {
        self.shadow.linear_depth_scalar()
    }

    pub fn projection(&self) -> &ShadowProjection {
        &self.shadow
    }

    pub fn shadow_map(&self) -> &RenderTarget {
        &self.shadow_map
    }

    pub fn shadow_map_view(&self) -> &wgpu::TextureView {
        &self.shadow_map.color_view
    }

    /// Open the shadow map for scene drawing from the light's point of view.
    ///
    /// The map is cleared to the far plane. With `use_own_shader` the host
    /// binds its own pipeline through `SceneCapture::render_pass` and must
    /// write `(depth - near) * linear_depth_scalar` into R.
    pub fn begin_shadow_map<'a>(
        &'a mut self,
        ctx: RenderContext<'a>,
        encoder: &'a mut wgpu::CommandEncoder,
        use_own_shader: bool,
    ) -> SceneCapture<'a> {
        self.shadow.update_light(self.position, self.orientation);
        gpu::record_write(
            ctx.device,
            encoder,
            &self.capture_buffer,
            bytemuck::bytes_of(&self.shadow.capture_uniforms()),
        );
        self.captured = true;

        // Depth attachment is always present on the shadow map target.
        let depth_stencil_attachment =
            self.shadow_map
                .depth_view
                .as_ref()
                .map(|view| wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                });

        let pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Shadow Map Capture"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.shadow_map.color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::RED),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment,
            ..Default::default()
        });

        SceneCapture::new(
            pass,
            ctx.device,
            &self.objects,
            CaptureShader {
                pipeline: &self.capture_pipeline,
                view_bind_group: &self.capture_bind_group,
            },
            use_own_shader,
            "Shadow map",
        )
    }

    /// Reset the map to the far plane so every pixel is lit.
    fn clear_shadow_map(&self, encoder: &mut wgpu::CommandEncoder) {
        let _clear = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Shadow Map Clear"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.shadow_map.color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::RED),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            ..Default::default()
        });
    }

    /// Close a capture opened by [`begin_shadow_map`](Self::begin_shadow_map).
    pub fn end_shadow_map(capture: SceneCapture<'_>) {
        capture.end();
    }

    fn params(&self) -> ShadowLightParams {
        ShadowLightParams {
            shadow_trans: self.shadow.shadow_trans.to_cols_array_2d(),
            light_dir: self.shadow.direction_in_view.extend(0.0).to_array(),
            ambient: self.ambient.extend(1.0).to_array(),
            diffuse: self.diffuse.extend(1.0).to_array(),
            darkness: self.darkness,
            linear_depth_scalar: self.shadow.linear_depth_scalar(),
            depth_bias: self.depth_bias,
            _pad0: 0.0,
        }
    }
}

impl CreatePass for ShadowLightPass {
    fn create(device: &wgpu::Device, settings: &ProcessorSettings) -> Result<Self> {
        let shadow_settings = &settings.shadow;
        let objects = ObjectBinder::new(device);
        let capture_bgl = pipeline::create_shadow_capture_bgl(device);
        let light_bgl = pipeline::create_shadow_light_bgl(device);

        let capture_pipeline = gpu::validated(device, "Shadow Pipeline", || {
            pipeline::create_shadow_pipeline(device, &capture_bgl, &objects.layout)
        })?;
        let light_pipeline = gpu::validated(device, "Shadow Light Pipeline", || {
            pipeline::create_fullscreen_effect_pipeline(
                device,
                "Shadow Light Pipeline",
                shaders::SHADOW_LIGHT_FRAG,
                "fs_main",
                &light_bgl,
                HDR_FORMAT,
                None,
            )
        })?;
        let shadow_map = gpu::validated(device, "Shadow Map", || {
            render_targets::create_shadow_map_target(device, shadow_settings.map_size)
        })?;

        let shadow = ShadowProjection::new(shadow_settings);

        let capture_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Shadow Capture Uniforms"),
            contents: bytemuck::bytes_of(&shadow.capture_uniforms()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let capture_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Shadow Capture BG"),
            layout: &capture_bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: capture_buffer.as_entire_binding(),
            }],
        });

        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Shadow Light Params"),
            size: std::mem::size_of::<ShadowLightParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        log::debug!(
            "Shadow map {}x{} (near {}, far {})",
            shadow_settings.map_size,
            shadow_settings.map_size,
            shadow_settings.near_clip,
            shadow_settings.far_clip
        );

        Ok(Self {
            info: PassInfo::new("ShadowLightPass", settings.width, settings.height),
            shadow,
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            ambient: Vec3::splat(0.1),
            diffuse: Vec3::ONE,
            darkness: shadow_settings.darkness,
            depth_bias: shadow_settings.depth_bias,
            captured: false,
            warned_uncaptured: false,
            shadow_map,
            capture_pipeline,
            capture_buffer,
            capture_bind_group,
            objects,
            light_pipeline,
            light_bgl,
            params_buffer,
            sampler: pipeline::create_linear_clamp_sampler(device, "Shadow Map Sampler"),
        })
    }
}

impl RenderPass for ShadowLightPass {
    impl_pass_info!();

    fn update(&mut self, camera: &Camera) {
        self.shadow
            .update(&camera.view, self.position, self.orientation);
    }

    fn render(
        &mut self,
        ctx: RenderContext<'_>,
        encoder: &mut wgpu::CommandEncoder,
        read: &RenderTarget,
        write: &RenderTarget,
        gbuffer: &GBuffer,
    ) {
        if !self.captured {
            if !self.warned_uncaptured {
                log::warn!("ShadowLightPass rendered before any shadow map capture");
                self.warned_uncaptured = true;
            }
            self.clear_shadow_map(encoder);
        }

        gpu::record_write(
            ctx.device,
            encoder,
            &self.params_buffer,
            bytemuck::bytes_of(&self.params()),
        );

        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Shadow Light BG"),
            layout: &self.light_bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&read.color_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(
                        gbuffer.view(GBufferChannel::Albedo),
                    ),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(
                        gbuffer.view(GBufferChannel::Position),
                    ),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(
                        gbuffer.view(GBufferChannel::DepthNormal),
                    ),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: wgpu::BindingResource::TextureView(&self.shadow_map.color_view),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        render_fullscreen_effect(
            encoder,
            write,
            &self.light_pipeline,
            &bind_group,
            "Shadow Light Pass",
        );
    }
}
