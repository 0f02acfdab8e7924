//! Device access.
//!
//! The host owns the device and queue and lends them per call as a
//! [`RenderContext`]. [`GpuContext`] creates its own pair without a surface
//! for tests and offline rendering.

use wgpu::util::DeviceExt;

use crate::error::{Result, UmbraError};

/// Borrowed device and queue for one call.
#[derive(Clone, Copy)]
pub struct RenderContext<'a> {
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
}

impl<'a> RenderContext<'a> {
    pub fn new(device: &'a wgpu::Device, queue: &'a wgpu::Queue) -> Self {
        Self { device, queue }
    }
}

/// Owned device and queue with no surface.
pub struct GpuContext {
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Request any adapter (falling back to a software one) and a default device.
    pub fn headless() -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .or_else(|| {
            pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::LowPower,
                compatible_surface: None,
                force_fallback_adapter: true,
            }))
        })
        .ok_or(UmbraError::AdapterUnavailable)?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Umbra Headless Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
            },
            None,
        ))?;

        log::info!(
            "Headless GPU context: {} ({})",
            adapter.get_info().name,
            adapter.get_info().backend.to_str()
        );

        Ok(Self {
            adapter,
            device,
            queue,
        })
    }

    pub fn render_context(&self) -> RenderContext<'_> {
        RenderContext::new(&self.device, &self.queue)
    }
}

/// Run `f` inside a validation and out-of-memory error scope and turn any
/// captured error into [`UmbraError::ResourceCreation`].
pub fn validated<T>(device: &wgpu::Device, label: &str, f: impl FnOnce() -> T) -> Result<T> {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let value = f();

    let validation = pollster::block_on(device.pop_error_scope());
    let oom = pollster::block_on(device.pop_error_scope());

    match validation.or(oom) {
        Some(err) => {
            log::error!("Failed to create {label}: {err}");
            Err(UmbraError::ResourceCreation {
                label: label.to_string(),
                message: err.to_string(),
            })
        }
        None => Ok(value),
    }
}

/// Record an update of `target` into `encoder`.
///
/// `Queue::write_buffer` lands before every command of the next submission,
/// so two frames recorded into one encoder would both see the last write.
/// Copying from a fresh staging buffer keeps the update in command order.
/// `data.len()` must be a multiple of `wgpu::COPY_BUFFER_ALIGNMENT`.
pub fn record_write(
    device: &wgpu::Device,
    encoder: &mut wgpu::CommandEncoder,
    target: &wgpu::Buffer,
    data: &[u8],
) {
    if data.is_empty() {
        return;
    }
    let staging = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("Upload Staging"),
        contents: data,
        usage: wgpu::BufferUsages::COPY_SRC,
    });
    encoder.copy_buffer_to_buffer(&staging, 0, target, 0, data.len() as u64);
}
