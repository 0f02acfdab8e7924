//! Render pass contract and the pass implementations.
//!
//! Every pass reads the previous stage from `read`, may sample any GBuffer
//! channel, and fully overwrites `write`. Pipeline state is scoped to the
//! `wgpu::RenderPass` objects a pass opens, so nothing leaks between passes.

/// Forwards the `RenderPass` boilerplate to a `info: PassInfo` field.
macro_rules! impl_pass_info {
    () => {
        fn info(&self) -> &$crate::passes::PassInfo {
            &self.info
        }

        fn info_mut(&mut self) -> &mut $crate::passes::PassInfo {
            &mut self.info
        }

        fn as_any(&self) -> &dyn ::std::any::Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
            self
        }
    };
}
pub(crate) use impl_pass_info;

pub mod bloom;
pub mod point_light;
pub mod shadow_light;

use std::any::Any;

use crate::backend::{GBuffer, RenderTarget};
use crate::camera::Camera;
use crate::error::Result;
use crate::gpu::RenderContext;
use crate::settings::ProcessorSettings;

/// Identity, enabled flag and resolution shared by all passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassInfo {
    pub name: String,
    pub enabled: bool,
    pub width: u32,
    pub height: u32,
}

impl PassInfo {
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            width,
            height,
        }
    }
}

/// A stage of the post-GBuffer pipeline.
pub trait RenderPass: Any {
    fn info(&self) -> &PassInfo;
    fn info_mut(&mut self) -> &mut PassInfo;

    fn name(&self) -> &str {
        &self.info().name
    }

    fn is_enabled(&self) -> bool {
        self.info().enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.info_mut().enabled = enabled;
    }

    /// Resolution fixed at construction.
    fn size(&self) -> (u32, u32) {
        let info = self.info();
        (info.width, info.height)
    }

    /// Recompute camera-dependent state. Records no GPU work.
    fn update(&mut self, camera: &Camera);

    /// Record this pass: `read` and `gbuffer` in, `write` cleared and filled.
    fn render(
        &mut self,
        ctx: RenderContext<'_>,
        encoder: &mut wgpu::CommandEncoder,
        read: &RenderTarget,
        write: &RenderTarget,
        gbuffer: &GBuffer,
    );

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Construction hook used by `Processor::create_pass`.
pub trait CreatePass: RenderPass + Sized {
    fn create(device: &wgpu::Device, settings: &ProcessorSettings) -> Result<Self>;
}

/// Render a generic fullscreen effect into a cleared target.
pub fn render_fullscreen_effect(
    encoder: &mut wgpu::CommandEncoder,
    target: &RenderTarget,
    pipeline: &wgpu::RenderPipeline,
    bind_group: &wgpu::BindGroup,
    label: &str,
) {
    render_fullscreen_draws(encoder, target, pipeline, &[bind_group], label);
}

/// Clear `target` once, then draw a fullscreen triangle per bind group.
/// With an additive pipeline the draws accumulate.
pub fn render_fullscreen_draws(
    encoder: &mut wgpu::CommandEncoder,
    target: &RenderTarget,
    pipeline: &wgpu::RenderPipeline,
    bind_groups: &[&wgpu::BindGroup],
    label: &str,
) {
    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: &target.color_view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        ..Default::default()
    });

    pass.set_pipeline(pipeline);
    for bind_group in bind_groups {
        pass.set_bind_group(0, *bind_group, &[]);
        pass.draw(0..3, 0..1);
    }
}
