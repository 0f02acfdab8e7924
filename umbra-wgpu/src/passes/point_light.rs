//! Point light accumulation.
//!
//! All lights are packed into one storage buffer and shaded in a single
//! full-screen pass: `write = read + sum(light contributions)`.

use glam::{Mat4, Vec3};
use umbra_gpu_shared::shaders;
use umbra_gpu_shared::uniforms::{PointLightData, PointLightParams};

use super::{render_fullscreen_effect, CreatePass, PassInfo, RenderPass};
use crate::backend::{GBuffer, GBufferChannel, RenderTarget};
use crate::camera::Camera;
use crate::error::Result;
use crate::gpu::{self, RenderContext};
use crate::pipeline;
use crate::render_targets::HDR_FORMAT;
use crate::settings::ProcessorSettings;

const INITIAL_LIGHT_CAPACITY: usize = 16;

/// A point light. Position is in world space; colours are linear RGB.
/// Values are not validated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    pub ambient: Vec3,
    pub diffuse: Vec3,
    pub specular: Vec3,
    pub position: Vec3,
    pub intensity: f32,
    /// Distance at which the contribution falls to zero.
    pub radius: f32,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            ambient: Vec3::ONE,
            diffuse: Vec3::ONE,
            specular: Vec3::ONE,
            position: Vec3::ZERO,
            intensity: 1.0,
            radius: 200.0,
        }
    }
}

impl PointLight {
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Pack for the GPU with the position moved into camera space.
    pub fn to_gpu(&self, view: &Mat4) -> PointLightData {
        PointLightData {
            ambient: self.ambient.extend(1.0).to_array(),
            diffuse: self.diffuse.extend(1.0).to_array(),
            specular: self.specular.extend(1.0).to_array(),
            position: view.transform_point3(self.position).extend(1.0).to_array(),
            intensity: self.intensity,
            radius: self.radius,
            _pad0: 0.0,
            _pad1: 0.0,
        }
    }
}

pub struct PointLightPass {
    info: PassInfo,
    lights: Vec<PointLight>,
    /// Blinn-Phong exponent shared by all lights.
    pub shininess: f32,
    view: Mat4,
    pipeline: wgpu::RenderPipeline,
    bgl: wgpu::BindGroupLayout,
    params_buffer: wgpu::Buffer,
    light_buffer: wgpu::Buffer,
    light_capacity: usize,
    packed: Vec<PointLightData>,
}

impl PointLightPass {
    pub fn add_light(&mut self, light: PointLight) {
        self.lights.push(light);
    }

    /// Mutable alias into the collection; edits show up on the next render.
    pub fn light_ref(&mut self, index: usize) -> Option<&mut PointLight> {
        self.lights.get_mut(index)
    }

    pub fn remove_light(&mut self, index: usize) -> Option<PointLight> {
        (index < self.lights.len()).then(|| self.lights.remove(index))
    }

    pub fn clear(&mut self) {
        self.lights.clear();
    }

    pub fn lights_size(&self) -> usize {
        self.lights.len()
    }

    pub fn lights(&self) -> &[PointLight] {
        &self.lights
    }

    pub fn lights_mut(&mut self) -> &mut Vec<PointLight> {
        &mut self.lights
    }

    /// Camera view matrix captured by the last `update`.
    pub fn view_matrix(&self) -> Mat4 {
        self.view
    }

    fn create_light_buffer(device: &wgpu::Device, capacity: usize) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Point Light Storage"),
            size: (capacity * std::mem::size_of::<PointLightData>()) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Pack and upload lights, growing the storage buffer when needed.
    /// The upload is recorded into `encoder`, ahead of this pass's draw.
    fn upload(&mut self, ctx: RenderContext<'_>, encoder: &mut wgpu::CommandEncoder) {
        self.packed.clear();
        let view = self.view;
        self.packed.extend(self.lights.iter().map(|l| l.to_gpu(&view)));

        if self.packed.len() > self.light_capacity {
            let capacity = self.packed.len().next_power_of_two();
            log::debug!(
                "Growing point light buffer {} -> {}",
                self.light_capacity,
                capacity
            );
            self.light_buffer = Self::create_light_buffer(ctx.device, capacity);
            self.light_capacity = capacity;
        }

        gpu::record_write(
            ctx.device,
            encoder,
            &self.light_buffer,
            bytemuck::cast_slice(&self.packed),
        );

        let params = PointLightParams {
            light_count: self.packed.len() as u32,
            shininess: self.shininess,
            _pad0: 0,
            _pad1: 0,
        };
        gpu::record_write(ctx.device, encoder, &self.params_buffer, bytemuck::bytes_of(&params));
    }
}

impl CreatePass for PointLightPass {
    fn create(device: &wgpu::Device, settings: &ProcessorSettings) -> Result<Self> {
        let bgl = pipeline::create_point_light_bgl(device);
        let pipeline = gpu::validated(device, "Point Light Pipeline", || {
            pipeline::create_fullscreen_effect_pipeline(
                device,
                "Point Light Pipeline",
                shaders::POINT_LIGHT_FRAG,
                "fs_main",
                &bgl,
                HDR_FORMAT,
                None,
            )
        })?;

        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Point Light Params"),
            size: std::mem::size_of::<PointLightParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(Self {
            info: PassInfo::new("PointLightPass", settings.width, settings.height),
            lights: Vec::new(),
            shininess: settings.point_light.shininess,
            view: Mat4::IDENTITY,
            pipeline,
            bgl,
            params_buffer,
            light_buffer: Self::create_light_buffer(device, INITIAL_LIGHT_CAPACITY),
            light_capacity: INITIAL_LIGHT_CAPACITY,
            packed: Vec::with_capacity(INITIAL_LIGHT_CAPACITY),
        })
    }
}

impl RenderPass for PointLightPass {
    impl_pass_info!();

    fn update(&mut self, camera: &Camera) {
        self.view = camera.view;
    }

    fn render(
        &mut self,
        ctx: RenderContext<'_>,
        encoder: &mut wgpu::CommandEncoder,
        read: &RenderTarget,
        write: &RenderTarget,
        gbuffer: &GBuffer,
    ) {
        self.upload(ctx, encoder);

        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Point Light BG"),
            layout: &self.bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: self.light_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&read.color_view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(
                        gbuffer.view(GBufferChannel::Albedo),
                    ),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(
                        gbuffer.view(GBufferChannel::Position),
                    ),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: wgpu::BindingResource::TextureView(
                        gbuffer.view(GBufferChannel::DepthNormal),
                    ),
                },
            ],
        });

        render_fullscreen_effect(encoder, write, &self.pipeline, &bind_group, "Point Light Pass");
    }
}
