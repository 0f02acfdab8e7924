//! GPU resource containers shared by the processor and the passes.

use wgpu::util::DeviceExt;

/// GPU mesh with separate position and normal streams plus `u32` indices.
pub struct GpuMesh {
    pub vertex_buffer: wgpu::Buffer,
    pub normal_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
}

impl GpuMesh {
    /// Upload flat `[x, y, z, ...]` positions and normals.
    pub fn upload(device: &wgpu::Device, positions: &[f32], normals: &[f32], indices: &[u32]) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Vertex Position Buffer"),
            contents: bytemuck::cast_slice(positions),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let normal_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Vertex Normal Buffer"),
            contents: bytemuck::cast_slice(normals),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Index Buffer"),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        Self {
            vertex_buffer,
            normal_buffer,
            index_buffer,
            index_count: indices.len() as u32,
        }
    }
}

/// Render target (framebuffer equivalent).
pub struct RenderTarget {
    pub color_texture: wgpu::Texture,
    pub color_view: wgpu::TextureView,
    pub depth_texture: Option<wgpu::Texture>,
    pub depth_view: Option<wgpu::TextureView>,
    pub width: u32,
    pub height: u32,
}

impl RenderTarget {
    pub fn format(&self) -> wgpu::TextureFormat {
        self.color_texture.format()
    }
}

/// The four colour channels of the [`GBuffer`], in attachment order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GBufferChannel {
    /// RGBA = object albedo
    Albedo,
    /// XYZ = view-space position, W = 1 where geometry was drawn
    Position,
    /// XYZ = view-space normal, W = linear view depth
    DepthNormal,
    /// RGB = emissive seed, A = 1 where geometry was drawn
    Hdr,
}

impl GBufferChannel {
    pub const ALL: [GBufferChannel; 4] = [
        GBufferChannel::Albedo,
        GBufferChannel::Position,
        GBufferChannel::DepthNormal,
        GBufferChannel::Hdr,
    ];

    pub fn label(self) -> &'static str {
        match self {
            GBufferChannel::Albedo => "GBuffer Albedo",
            GBufferChannel::Position => "GBuffer Position",
            GBufferChannel::DepthNormal => "GBuffer Depth+Normal",
            GBufferChannel::Hdr => "GBuffer HDR",
        }
    }

    fn index(self) -> usize {
        match self {
            GBufferChannel::Albedo => 0,
            GBufferChannel::Position => 1,
            GBufferChannel::DepthNormal => 2,
            GBufferChannel::Hdr => 3,
        }
    }
}

/// G-Buffer with four colour attachments and a depth buffer.
/// Resolution is fixed at creation.
pub struct GBuffer {
    pub(crate) textures: [wgpu::Texture; 4],
    pub(crate) views: [wgpu::TextureView; 4],
    pub depth: wgpu::Texture,
    pub depth_view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl GBuffer {
    pub fn texture(&self, channel: GBufferChannel) -> &wgpu::Texture {
        &self.textures[channel.index()]
    }

    pub fn view(&self, channel: GBufferChannel) -> &wgpu::TextureView {
        &self.views[channel.index()]
    }

    /// Colour attachments for a capture pass, all cleared to transparent black.
    pub(crate) fn color_attachments(&self) -> [Option<wgpu::RenderPassColorAttachment<'_>>; 4] {
        GBufferChannel::ALL.map(|channel| {
            Some(wgpu::RenderPassColorAttachment {
                view: self.view(channel),
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })
        })
    }
}
