//! Render target creation for the deferred pipeline.
//! G-Buffer, ping-pong HDR targets, shadow map, bloom working buffers.

use crate::backend::{GBuffer, GBufferChannel, RenderTarget};

/// HDR color format used for every G-Buffer channel and the ping-pong buffers.
pub const HDR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
/// Depth format.
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
/// Single-channel float format holding normalized linear light depth.
pub const SHADOW_MAP_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R16Float;

const COLOR_USAGE: wgpu::TextureUsages = wgpu::TextureUsages::RENDER_ATTACHMENT
    .union(wgpu::TextureUsages::TEXTURE_BINDING)
    .union(wgpu::TextureUsages::COPY_SRC)
    .union(wgpu::TextureUsages::COPY_DST);

/// Create G-Buffer with 4 color attachments + depth.
pub fn create_gbuffer(device: &wgpu::Device, width: u32, height: u32) -> GBuffer {
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };

    let textures = GBufferChannel::ALL.map(|channel| {
        device.create_texture(&wgpu::TextureDescriptor {
            label: Some(channel.label()),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: HDR_FORMAT,
            usage: COLOR_USAGE,
            view_formats: &[],
        })
    });

    let depth = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("GBuffer Depth"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });

    let view_desc = wgpu::TextureViewDescriptor::default();
    let views = [
        textures[0].create_view(&view_desc),
        textures[1].create_view(&view_desc),
        textures[2].create_view(&view_desc),
        textures[3].create_view(&view_desc),
    ];

    GBuffer {
        textures,
        views,
        depth_view: depth.create_view(&view_desc),
        depth,
        width,
        height,
    }
}

/// Create a single HDR render target with optional depth.
pub fn create_hdr_target(
    device: &wgpu::Device,
    width: u32,
    height: u32,
    label: &str,
    with_depth: bool,
) -> RenderTarget {
    create_render_target(device, width, height, label, HDR_FORMAT, with_depth)
}

/// Create a render target with a specific format.
pub fn create_render_target(
    device: &wgpu::Device,
    width: u32,
    height: u32,
    label: &str,
    format: wgpu::TextureFormat,
    with_depth: bool,
) -> RenderTarget {
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };

    let color_texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: COLOR_USAGE,
        view_formats: &[],
    });
    let color_view = color_texture.create_view(&wgpu::TextureViewDescriptor::default());

    let (depth_texture, depth_view) = if with_depth {
        let dt = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&format!("{label} Depth")),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let dv = dt.create_view(&wgpu::TextureViewDescriptor::default());
        (Some(dt), Some(dv))
    } else {
        (None, None)
    };

    RenderTarget {
        color_texture,
        color_view,
        depth_texture,
        depth_view,
        width,
        height,
    }
}

/// Ping-pong pair: two equally sized HDR targets without depth.
pub fn create_ping_pong_targets(device: &wgpu::Device, width: u32, height: u32) -> [RenderTarget; 2] {
    [
        create_hdr_target(device, width, height, "Ping-Pong 0", false),
        create_hdr_target(device, width, height, "Ping-Pong 1", false),
    ]
}

/// Square shadow map: linear depth in R plus a depth attachment for testing.
pub fn create_shadow_map_target(device: &wgpu::Device, size: u32) -> RenderTarget {
    create_render_target(device, size, size, "Shadow Map", SHADOW_MAP_FORMAT, true)
}

/// Bloom working buffers: [0] holds the vertical blur, [1] the horizontal one.
pub fn create_bloom_targets(
    device: &wgpu::Device,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
) -> [RenderTarget; 2] {
    [
        create_render_target(device, width, height, "Bloom Blur V", format, false),
        create_render_target(device, width, height, "Bloom Blur H", format, false),
    ]
}
