//! Processor configuration.
//!
//! Every fixed resolution and format used by the passes is named here with
//! its default, so deployments can override them before `Processor::init`.

use crate::render_targets::HDR_FORMAT;

/// Top-level configuration for [`Processor::init`](crate::Processor::init).
#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    /// Width of the GBuffer, ping-pong buffers and every pass.
    pub width: u32,
    /// Height of the GBuffer, ping-pong buffers and every pass.
    pub height: u32,
    /// Format of the host target passed to `draw`/`end(.., Some(target))`.
    ///
    /// Defaults to `Bgra8UnormSrgb`.
    pub output_format: wgpu::TextureFormat,
    pub shadow: ShadowSettings,
    pub bloom: BloomSettings,
    pub point_light: PointLightSettings,
}

impl ProcessorSettings {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            output_format: wgpu::TextureFormat::Bgra8UnormSrgb,
            shadow: ShadowSettings::default(),
            bloom: BloomSettings::default(),
            point_light: PointLightSettings::default(),
        }
    }

    pub fn with_output_format(mut self, format: wgpu::TextureFormat) -> Self {
        self.output_format = format;
        self
    }
}

/// Shadow map and light-space projection parameters.
#[derive(Debug, Clone, Copy)]
pub struct ShadowSettings {
    /// Square shadow map resolution in texels.
    ///
    /// Default: `1024`
    pub map_size: u32,
    /// Default: `1.0`
    pub near_clip: f32,
    /// Default: `5000.0`
    pub far_clip: f32,
    /// Half-extent of the orthographic light frustum in world units.
    ///
    /// Default: `1024.0`
    pub view_port_size: f32,
    /// Fraction of diffuse light removed in shadow (0 = no shadow, 1 = black).
    ///
    /// Default: `0.5`
    pub darkness: f32,
    /// Subtracted from the fragment depth before the occlusion test.
    ///
    /// Default: `0.005`
    pub depth_bias: f32,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            map_size: 1024,
            near_clip: 1.0,
            far_clip: 5000.0,
            view_port_size: 1024.0,
            darkness: 0.5,
            depth_bias: 0.005,
        }
    }
}

/// Gaussian kernel and working-buffer format for the bloom pass.
#[derive(Debug, Clone, Copy)]
pub struct BloomSettings {
    /// Kernel half-width; the dense kernel has `2 * radius + 1` taps.
    ///
    /// Default: `16`
    pub radius: usize,
    /// Variance of the Gaussian over the domain [-1, 1].
    ///
    /// Default: `0.2`
    pub variance: f32,
    /// Format of the two blur working buffers.
    ///
    /// Default: `Rgba16Float`
    pub format: wgpu::TextureFormat,
}

impl Default for BloomSettings {
    fn default() -> Self {
        Self {
            radius: 16,
            variance: 0.2,
            format: HDR_FORMAT,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PointLightSettings {
    /// Blinn-Phong specular exponent.
    ///
    /// Default: `32.0`
    pub shininess: f32,
}

impl Default for PointLightSettings {
    fn default() -> Self {
        Self { shininess: 32.0 }
    }
}
