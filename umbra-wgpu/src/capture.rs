//! Scoped scene capture.
//!
//! A [`SceneCapture`] wraps an open `wgpu::RenderPass` targeting either the
//! GBuffer or a shadow map. All pipeline state lives inside that pass, so
//! dropping the guard ends the capture and nothing carries over into later
//! passes.

use umbra_gpu_shared::uniforms::ObjectUniforms;
use wgpu::util::DeviceExt;

use crate::backend::GpuMesh;
use crate::pipeline;

/// Layout for per-draw `ObjectUniforms` (group 1 of both capture pipelines).
pub struct ObjectBinder {
    pub layout: wgpu::BindGroupLayout,
}

impl ObjectBinder {
    pub fn new(device: &wgpu::Device) -> Self {
        Self {
            layout: pipeline::create_object_bgl(device),
        }
    }

    // Per-object buffer created per draw call. A staged write_buffer would
    // let every draw see only the last object's data.
    pub fn bind(&self, device: &wgpu::Device, object: &ObjectUniforms) -> wgpu::BindGroup {
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Object Uniforms"),
            contents: bytemuck::bytes_of(object),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Object BG"),
            layout: &self.layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        })
    }
}

/// Built-in pipeline and its group 0 (camera or light matrices).
pub(crate) struct CaptureShader<'a> {
    pub pipeline: &'a wgpu::RenderPipeline,
    pub view_bind_group: &'a wgpu::BindGroup,
}

/// Open scene capture returned by `Processor::begin` and
/// `ShadowLightPass::begin_shadow_map`.
///
/// Draw with [`draw_mesh`](Self::draw_mesh) using the built-in shader, or
/// take [`render_pass`](Self::render_pass) and bind your own pipeline. The
/// attachments are laid out as described by `GBufferChannel` (GBuffer) or
/// as a single `R16Float` linear depth target (shadow map).
pub struct SceneCapture<'a> {
    pass: wgpu::RenderPass<'a>,
    device: &'a wgpu::Device,
    objects: &'a ObjectBinder,
    shader: CaptureShader<'a>,
    shader_bound: bool,
    label: &'static str,
    draws: u32,
}

impl<'a> SceneCapture<'a> {
    pub(crate) fn new(
        pass: wgpu::RenderPass<'a>,
        device: &'a wgpu::Device,
        objects: &'a ObjectBinder,
        shader: CaptureShader<'a>,
        use_own_shader: bool,
        label: &'static str,
    ) -> Self {
        let mut capture = Self {
            pass,
            device,
            objects,
            shader,
            shader_bound: false,
            label,
            draws: 0,
        };
        if !use_own_shader {
            capture.bind_shader();
        }
        capture
    }

    fn bind_shader(&mut self) {
        self.pass.set_pipeline(self.shader.pipeline);
        self.pass.set_bind_group(0, self.shader.view_bind_group, &[]);
        self.shader_bound = true;
    }

    /// Draw a mesh with the built-in capture shader.
    pub fn draw_mesh(&mut self, mesh: &GpuMesh, object: &ObjectUniforms) {
        if !self.shader_bound {
            self.bind_shader();
        }
        let bind_group = self.objects.bind(self.device, object);
        self.pass.set_bind_group(1, &bind_group, &[]);
        self.pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
        self.pass.set_vertex_buffer(1, mesh.normal_buffer.slice(..));
        self.pass
            .set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        self.pass.draw_indexed(0..mesh.index_count, 0, 0..1);
        self.draws += 1;
    }

    /// Raw access for hosts drawing with their own pipeline. The next
    /// `draw_mesh` rebinds the built-in shader.
    pub fn render_pass(&mut self) -> &mut wgpu::RenderPass<'a> {
        self.shader_bound = false;
        &mut self.pass
    }

    /// Built-in pipeline, for hosts that want to reuse it with `render_pass`.
    pub fn builtin_pipeline(&self) -> &'a wgpu::RenderPipeline {
        self.shader.pipeline
    }

    pub fn draw_count(&self) -> u32 {
        self.draws
    }

    /// Close the capture. Equivalent to dropping the guard.
    pub fn end(self) {}
}

impl Drop for SceneCapture<'_> {
    fn drop(&mut self) {
        log::trace!("{} capture closed after {} draws", self.label, self.draws);
    }
}
