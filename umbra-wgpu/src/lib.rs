//! Umbra: a deferred rendering pass pipeline on wgpu.
//!
//! A [`Processor`] owns a four-channel [`GBuffer`], a ping-pong pair of HDR
//! targets and an ordered list of [`RenderPass`]es. The host opens GBuffer
//! capture with [`Processor::begin`], draws its scene, and calls
//! [`Processor::end`] to run the passes. The host owns the device, queue,
//! surface and command submission.
//!
//! ```rust,ignore
//! let mut processor = Processor::init(&device, ProcessorSettings::new(1280, 720))?;
//! let lights = processor.create_pass::<PointLightPass>(&device)?;
//! let bloom = processor.create_pass::<HdrBloomPass>(&device)?;
//! processor.pass_mut(lights)?.add_light(PointLight::new(Vec3::new(0.0, 2.0, 0.0)));
//!
//! let ctx = RenderContext::new(&device, &queue);
//! let mut encoder = device.create_command_encoder(&Default::default());
//! {
//!     let mut capture = processor.begin(ctx, &mut encoder, &camera, false)?;
//!     capture.draw_mesh(&mesh, &ObjectUniforms::default());
//! }
//! processor.end(ctx, &mut encoder, Some(&frame.texture))?;
//! queue.submit(Some(encoder.finish()));
//! ```

mod backend;
mod camera;
mod capture;
mod error;
mod gpu;
mod logging;
mod pipeline;
mod processor;
mod render_targets;
mod settings;

pub mod passes;

pub use backend::{GBuffer, GBufferChannel, GpuMesh, RenderTarget};
pub use camera::Camera;
pub use capture::SceneCapture;
pub use error::{Result, UmbraError};
pub use gpu::{GpuContext, RenderContext};
pub use logging::init_logging;
pub use passes::bloom::HdrBloomPass;
pub use passes::point_light::{PointLight, PointLightPass};
pub use passes::shadow_light::{ShadowLightPass, ShadowProjection};
pub use passes::{CreatePass, PassInfo, RenderPass};
pub use processor::{read_rgba16f, PassHandle, PassKey, PingPong, Processor, ProcessorState};
pub use render_targets::{DEPTH_FORMAT, HDR_FORMAT, SHADOW_MAP_FORMAT};
pub use settings::{BloomSettings, PointLightSettings, ProcessorSettings, ShadowSettings};

pub use umbra_gpu_shared::uniforms::{BlurTap, ObjectUniforms};
