//! Pipeline orchestrator.
//!
//! Owns the GBuffer, the ping-pong HDR targets and the ordered pass list.
//! Per frame: `begin` opens GBuffer capture, the host draws, `end` seeds the
//! ping-pong pair from the GBuffer HDR channel and runs every enabled pass
//! in insertion order, swapping read and write after each one.

use std::marker::PhantomData;
use std::path::Path;

use slotmap::SlotMap;
use umbra_gpu_shared::shaders;
use umbra_gpu_shared::uniforms::{BlitParams, FrameUniforms};
use wgpu::util::DeviceExt;

use crate::backend::{GBuffer, GBufferChannel, RenderTarget};
use crate::camera::Camera;
use crate::capture::{CaptureShader, ObjectBinder, SceneCapture};
use crate::error::{Result, UmbraError};
use crate::gpu::{self, RenderContext};
use crate::passes::{CreatePass, RenderPass};
use crate::pipeline;
use crate::render_targets;
use crate::settings::ProcessorSettings;

slotmap::new_key_type! {
    /// Stable identifier of a pass inside one processor.
    pub struct PassKey;
}

/// Typed handle returned by [`Processor::create_pass`].
pub struct PassHandle<T> {
    key: PassKey,
    _marker: PhantomData<fn() -> T>,
}

impl<T> PassHandle<T> {
    pub fn key(&self) -> PassKey {
        self.key
    }
}

impl<T> Clone for PassHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for PassHandle<T> {}

impl<T> std::fmt::Debug for PassHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PassHandle").field(&self.key).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    Idle,
    Capturing,
    Processing,
}

impl ProcessorState {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessorState::Idle => "Idle",
            ProcessorState::Capturing => "Capturing",
            ProcessorState::Processing => "Processing",
        }
    }
}

/// Two buffers with one "read" role; the other is "write".
#[derive(Debug)]
pub struct PingPong<T> {
    targets: [T; 2],
    read: usize,
}

impl<T> PingPong<T> {
    pub fn new(targets: [T; 2]) -> Self {
        Self { targets, read: 0 }
    }

    pub fn read(&self) -> &T {
        &self.targets[self.read]
    }

    pub fn write(&self) -> &T {
        &self.targets[1 - self.read]
    }

    pub fn read_index(&self) -> usize {
        self.read
    }

    pub fn write_index(&self) -> usize {
        1 - self.read
    }

    pub fn swap(&mut self) {
        self.read = 1 - self.read;
    }

    pub fn targets(&self) -> &[T; 2] {
        &self.targets
    }
}

/// Run every enabled pass in `order`: `update`, then `render(read, write)`,
/// then swap. Returns the number of passes executed.
pub(crate) fn execute_passes<T>(
    order: &[PassKey],
    passes: &mut SlotMap<PassKey, Box<dyn RenderPass>>,
    ping_pong: &mut PingPong<T>,
    camera: &Camera,
    mut render: impl FnMut(&mut dyn RenderPass, &T, &T),
) -> u32 {
    let mut executed = 0;
    for key in order {
        let Some(pass) = passes.get_mut(*key) else {
            continue;
        };
        if !pass.is_enabled() {
            continue;
        }
        pass.update(camera);
        render(pass.as_mut(), ping_pong.read(), ping_pong.write());
        ping_pong.swap();
        executed += 1;
    }
    executed
}

/// Viewport and source sub-rectangle of a blit after clipping to the target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct BlitRegion {
    /// `x, y, w, h` in target pixels.
    pub viewport: [f32; 4],
    pub params: BlitParams,
}

/// Intersect the `(x, y, w, h)` rectangle with a `target_width` x
/// `target_height` target. `None` when no part of it is visible.
pub(crate) fn clip_blit(
    x: f32,
    y: f32,
    w: f32,
    h: f32,
    target_width: u32,
    target_height: u32,
) -> Option<BlitRegion> {
    if !(w > 0.0 && h > 0.0) {
        return None;
    }
    let x0 = x.max(0.0);
    let y0 = y.max(0.0);
    let x1 = (x + w).min(target_width as f32);
    let y1 = (y + h).min(target_height as f32);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(BlitRegion {
        viewport: [x0, y0, x1 - x0, y1 - y0],
        params: BlitParams {
            uv_offset: [(x0 - x) / w, (y0 - y) / h],
            uv_scale: [(x1 - x0) / w, (y1 - y0) / h],
        },
    })
}

pub struct Processor {
    settings: ProcessorSettings,
    state: ProcessorState,
    camera: Camera,
    num_processed_passes: u32,

    gbuffer: GBuffer,
    ping_pong: PingPong<RenderTarget>,
    passes: SlotMap<PassKey, Box<dyn RenderPass>>,
    order: Vec<PassKey>,

    objects: ObjectBinder,
    gbuffer_pipeline: wgpu::RenderPipeline,
    frame_buffer: wgpu::Buffer,
    frame_bind_group: wgpu::BindGroup,
    blit_pipeline: wgpu::RenderPipeline,
    blit_bgl: wgpu::BindGroupLayout,
}

impl Processor {
    /// Allocate the GBuffer, ping-pong targets and capture/blit pipelines.
    pub fn init(device: &wgpu::Device, settings: ProcessorSettings) -> Result<Self> {
        let (width, height) = (settings.width, settings.height);
        if width == 0 || height == 0 {
            return Err(UmbraError::InvalidSize { width, height });
        }

        let gbuffer = gpu::validated(device, "GBuffer", || {
            render_targets::create_gbuffer(device, width, height)
        })?;
        let ping_pong = PingPong::new(gpu::validated(device, "Ping-Pong Targets", || {
            render_targets::create_ping_pong_targets(device, width, height)
        })?);

        let objects = ObjectBinder::new(device);
        let frame_bgl = pipeline::create_frame_bgl(device);
        let gbuffer_pipeline = gpu::validated(device, "GBuffer Pipeline", || {
            pipeline::create_gbuffer_pipeline(device, &frame_bgl, &objects.layout)
        })?;

        let frame_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Frame Uniforms"),
            contents: bytemuck::bytes_of(&FrameUniforms::new(
                glam::Mat4::IDENTITY,
                glam::Mat4::IDENTITY,
            )),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let frame_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Frame BG"),
            layout: &frame_bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: frame_buffer.as_entire_binding(),
            }],
        });

        let blit_bgl = pipeline::create_blit_bgl(device);
        let blit_pipeline = gpu::validated(device, "Blit Pipeline", || {
            pipeline::create_fullscreen_effect_pipeline(
                device,
                "Blit Pipeline",
                shaders::BLIT_FRAG,
                "fs_main",
                &blit_bgl,
                settings.output_format,
                None,
            )
        })?;
        log::info!("Deferred processor initialized ({}x{})", width, height);

        Ok(Self {
            settings,
            state: ProcessorState::Idle,
            camera: Camera::default(),
            num_processed_passes: 0,
            gbuffer,
            ping_pong,
            passes: SlotMap::with_key(),
            order: Vec::new(),
            objects,
            gbuffer_pipeline,
            frame_buffer,
            frame_bind_group,
            blit_pipeline,
            blit_bgl,
        })
    }

    // ============================================================
    // Pass registry
    // ============================================================

    /// Construct a pass sized to this processor and append it to the list.
    pub fn create_pass<T: CreatePass>(&mut self, device: &wgpu::Device) -> Result<PassHandle<T>> {
        let pass = T::create(device, &self.settings)?;
        log::debug!("Created pass {} at index {}", pass.name(), self.order.len());
        Ok(self.push_pass(pass))
    }

    /// Append an already constructed pass.
    pub fn push_pass<T: RenderPass>(&mut self, pass: T) -> PassHandle<T> {
        let key = self.passes.insert(Box::new(pass));
        self.order.push(key);
        PassHandle {
            key,
            _marker: PhantomData,
        }
    }

    pub fn pass<T: RenderPass>(&self, handle: PassHandle<T>) -> Result<&T> {
        self.passes
            .get(handle.key)
            .and_then(|pass| pass.as_any().downcast_ref::<T>())
            .ok_or(UmbraError::PassNotFound)
    }

    pub fn pass_mut<T: RenderPass>(&mut self, handle: PassHandle<T>) -> Result<&mut T> {
        self.passes
            .get_mut(handle.key)
            .and_then(|pass| pass.as_any_mut().downcast_mut::<T>())
            .ok_or(UmbraError::PassNotFound)
    }

    /// Remove one pass; the remaining passes keep their relative order.
    pub fn remove_pass<T: RenderPass>(&mut self, handle: PassHandle<T>) -> Result<()> {
        let pass = self
            .passes
            .remove(handle.key)
            .ok_or(UmbraError::PassNotFound)?;
        self.order.retain(|key| *key != handle.key);
        log::debug!("Removed pass {}", pass.name());
        Ok(())
    }

    /// Pass at position `index` in execution order.
    pub fn get(&self, index: usize) -> Option<&dyn RenderPass> {
        let key = self.order.get(index)?;
        self.passes.get(*key).map(|pass| pass.as_ref())
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut dyn RenderPass> {
        let key = self.order.get(index)?;
        self.passes.get_mut(*key).map(|pass| pass.as_mut())
    }

    /// Passes in execution order.
    pub fn passes(&self) -> impl Iterator<Item = &dyn RenderPass> + '_ {
        self.order
            .iter()
            .filter_map(|key| self.passes.get(*key).map(|pass| pass.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    // ============================================================
    // Frame
    // ============================================================

    fn expect_state(&self, expected: ProcessorState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(UmbraError::InvalidState {
                expected: expected.as_str(),
                found: self.state.as_str(),
            })
        }
    }

    /// Open GBuffer capture. All channels and depth are cleared.
    ///
    /// With `use_own_shader` the built-in G-Buffer pipeline is not bound and
    /// the host draws through `SceneCapture::render_pass`, writing the four
    /// channels described by `GBufferChannel`.
    pub fn begin<'a>(
        &'a mut self,
        ctx: RenderContext<'a>,
        encoder: &'a mut wgpu::CommandEncoder,
        camera: &Camera,
        use_own_shader: bool,
    ) -> Result<SceneCapture<'a>> {
        self.expect_state(ProcessorState::Idle)?;
        self.camera = *camera;
        gpu::record_write(
            ctx.device,
            encoder,
            &self.frame_buffer,
            bytemuck::bytes_of(&FrameUniforms::new(camera.view, camera.projection)),
        );
        self.state = ProcessorState::Capturing;
        log::trace!("GBuffer capture opened");

        let color_attachments = self.gbuffer.color_attachments();
        let pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("GBuffer Capture"),
            color_attachments: &color_attachments,
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.gbuffer.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            ..Default::default()
        });

        Ok(SceneCapture::new(
            pass,
            ctx.device,
            &self.objects,
            CaptureShader {
                pipeline: &self.gbuffer_pipeline,
                view_bind_group: &self.frame_bind_group,
            },
            use_own_shader,
            "GBuffer",
        ))
    }

    /// Close capture, run the passes and optionally blit the result into
    /// `auto_draw` at the origin.
    pub fn end(
        &mut self,
        ctx: RenderContext<'_>,
        encoder: &mut wgpu::CommandEncoder,
        auto_draw: Option<&wgpu::Texture>,
    ) -> Result<()> {
        self.expect_state(ProcessorState::Capturing)?;
        self.state = ProcessorState::Idle;
        self.process(ctx, encoder)?;
        if let Some(target) = auto_draw {
            self.draw(ctx, encoder, target, 0.0, 0.0);
        }
        Ok(())
    }

    /// Seed the ping-pong pair from the GBuffer HDR channel and run every
    /// enabled pass. `end` calls this; call it directly to re-run the passes
    /// over the last capture.
    pub fn process(&mut self, ctx: RenderContext<'_>, encoder: &mut wgpu::CommandEncoder) -> Result<()> {
        self.expect_state(ProcessorState::Idle)?;
        self.state = ProcessorState::Processing;

        let hdr = self.gbuffer.texture(GBufferChannel::Hdr);
        encoder.copy_texture_to_texture(
            hdr.as_image_copy(),
            self.ping_pong.write().color_texture.as_image_copy(),
            wgpu::Extent3d {
                width: self.gbuffer.width,
                height: self.gbuffer.height,
                depth_or_array_layers: 1,
            },
        );
        self.ping_pong.swap();

        let gbuffer = &self.gbuffer;
        self.num_processed_passes = execute_passes(
            &self.order,
            &mut self.passes,
            &mut self.ping_pong,
            &self.camera,
            |pass, read, write| {
                log::trace!("Render pass {}", pass.name());
                pass.render(ctx, encoder, read, write, gbuffer);
            },
        );

        self.state = ProcessorState::Idle;
        Ok(())
    }

    /// Blit the final buffer at `(x, y)` in its native size.
    pub fn draw(
        &self,
        ctx: RenderContext<'_>,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::Texture,
        x: f32,
        y: f32,
    ) {
        let (w, h) = (self.width() as f32, self.height() as f32);
        self.draw_sized(ctx, encoder, target, x, y, w, h);
    }

    /// Blit the final buffer, scaled to `w` x `h`, with its top-left corner at
    /// `(x, y)` of `target`. Parts falling outside `target` are clipped and
    /// the rest of `target` is left untouched. The target format must match
    /// `ProcessorSettings::output_format`.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_sized(
        &self,
        ctx: RenderContext<'_>,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::Texture,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
    ) {
        let Some(region) = clip_blit(x, y, w, h, target.width(), target.height()) else {
            log::trace!("Blit at ({x}, {y}) size {w}x{h} misses the target");
            return;
        };

        let params = ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Blit Params"),
                contents: bytemuck::bytes_of(&region.params),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Blit BG"),
            layout: &self.blit_bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&self.output().color_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: params.as_entire_binding(),
                },
            ],
        });
        let view = target.create_view(&wgpu::TextureViewDescriptor::default());

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Processor Blit"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            ..Default::default()
        });
        let [vx, vy, vw, vh] = region.viewport;
        pass.set_viewport(vx, vy, vw, vh, 0.0, 1.0);
        pass.set_pipeline(&self.blit_pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.draw(0..3, 0..1);
    }

    // ============================================================
    // Accessors
    // ============================================================

    /// Final buffer of the last `process`.
    pub fn output(&self) -> &RenderTarget {
        self.ping_pong.read()
    }

    pub fn gbuffer(&self) -> &GBuffer {
        &self.gbuffer
    }

    pub fn num_processed_passes(&self) -> u32 {
        self.num_processed_passes
    }

    pub fn state(&self) -> ProcessorState {
        self.state
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn settings(&self) -> &ProcessorSettings {
        &self.settings
    }

    pub fn width(&self) -> u32 {
        self.settings.width
    }

    pub fn height(&self) -> u32 {
        self.settings.height
    }

    // ============================================================
    // Readback
    // ============================================================

    /// Copy the final buffer to host memory as linear RGBA, row-major from
    /// the top-left. Submits its own command buffer and blocks until done.
    pub fn read_output(&self, ctx: RenderContext<'_>) -> Result<Vec<[f32; 4]>> {
        read_rgba16f(ctx, &self.output().color_texture)
    }

    /// Write the final buffer as an 8-bit RGBA PNG, clamping to 0..1.
    pub fn save_output_png(&self, ctx: RenderContext<'_>, path: impl AsRef<Path>) -> Result<()> {
        let pixels = self.read_output(ctx)?;
        let bytes: Vec<u8> = pixels
            .iter()
            .flat_map(|p| p.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8))
            .collect();
        let image = image::RgbaImage::from_raw(self.width(), self.height(), bytes)
            .ok_or_else(|| UmbraError::Readback("pixel buffer size mismatch".into()))?;
        image.save(path.as_ref())?;
        log::info!("Saved processor output to {}", path.as_ref().display());
        Ok(())
    }
}

const RGBA16F_BYTES_PER_PIXEL: u32 = 8;

fn aligned_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * RGBA16F_BYTES_PER_PIXEL;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Read an `Rgba16Float` texture back as `f32` RGBA.
pub fn read_rgba16f(ctx: RenderContext<'_>, texture: &wgpu::Texture) -> Result<Vec<[f32; 4]>> {
    if texture.format() != wgpu::TextureFormat::Rgba16Float {
        return Err(UmbraError::Readback(format!(
            "expected Rgba16Float, found {:?}",
            texture.format()
        )));
    }

    let (width, height) = (texture.width(), texture.height());
    let bytes_per_row = aligned_bytes_per_row(width);

    let buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Readback Buffer"),
        size: (bytes_per_row * height) as u64,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });
    encoder.copy_texture_to_buffer(
        texture.as_image_copy(),
        wgpu::ImageCopyBuffer {
            buffer: &buffer,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    ctx.queue.submit(std::iter::once(encoder.finish()));

    let slice = buffer.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    let _ = ctx.device.poll(wgpu::Maintain::Wait);
    rx.recv()
        .map_err(|e| UmbraError::Readback(e.to_string()))?
        .map_err(|e| UmbraError::Readback(e.to_string()))?;

    let data = slice.get_mapped_range();
    let row_bytes = (width * RGBA16F_BYTES_PER_PIXEL) as usize;
    let mut pixels = Vec::with_capacity((width * height) as usize);
    for row in 0..height as usize {
        let start = row * bytes_per_row as usize;
        for texel in data[start..start + row_bytes].chunks_exact(8) {
            let channel = |i: usize| half::f16::from_le_bytes([texel[i], texel[i + 1]]).to_f32();
            pixels.push([channel(0), channel(2), channel(4), channel(6)]);
        }
    }
    drop(data);
    buffer.unmap();

    Ok(pixels)
}
