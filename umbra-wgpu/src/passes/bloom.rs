//! HDR bloom: separable Gaussian blur of the GBuffer HDR channel, added on
//! top of the read buffer.
//!
//! The dense `2r + 1` kernel is collapsed into linear-sampling taps: the
//! centre tap stays alone and neighbouring taps on each side are merged into
//! one bilinear fetch at their weighted-average offset.

use umbra_gpu_shared::shaders;
use umbra_gpu_shared::uniforms::{BlurParams, BlurTap};
use wgpu::util::DeviceExt;

use super::{render_fullscreen_draws, render_fullscreen_effect, CreatePass, PassInfo, RenderPass};
use crate::backend::{GBuffer, GBufferChannel, RenderTarget};
use crate::camera::Camera;
use crate::error::Result;
use crate::gpu::{self, RenderContext};
use crate::pipeline::{self, ADDITIVE_BLEND};
use crate::render_targets::{self, HDR_FORMAT};
use crate::settings::{BloomSettings, ProcessorSettings};

/// Normal distribution density with zero mean.
pub fn gaussian(x: f32, variance: f32) -> f32 {
    (-x * x / (2.0 * variance)).exp() / (2.0 * std::f32::consts::PI * variance).sqrt()
}

/// Dense kernel of `2 * radius + 1` weights sampled over [-1, 1], normalized to sum to 1.
pub fn gaussian_weights(radius: usize, variance: f32) -> Vec<f32> {
    let row_size = 2 * radius + 1;
    let mut weights: Vec<f32> = (0..row_size)
        .map(|i| {
            let x = if radius == 0 {
                0.0
            } else {
                -1.0 + 2.0 * i as f32 / (row_size - 1) as f32
            };
            gaussian(x, variance)
        })
        .collect();

    let sum: f32 = weights.iter().sum();
    if sum > 0.0 {
        weights.iter_mut().for_each(|w| *w /= sum);
    }
    weights
}

/// Collapse a dense odd-length kernel into linear-sampling taps.
///
/// Offsets are in texels relative to the centre and ordered from most
/// negative to most positive. Combined weights are `w_a + w_b`, so the
/// total is preserved.
pub fn collapse_kernel(weights: &[f32]) -> Vec<BlurTap> {
    if weights.is_empty() {
        return Vec::new();
    }
    let centre = weights.len() / 2;

    let merge = |a: usize, b: Option<usize>| -> BlurTap {
        let pos_a = a as f32 - centre as f32;
        match b {
            Some(b) => {
                let pos_b = b as f32 - centre as f32;
                let weight = weights[a] + weights[b];
                let offset = if weight > 0.0 {
                    (weights[a] * pos_a + weights[b] * pos_b) / weight
                } else {
                    0.5 * (pos_a + pos_b)
                };
                BlurTap { offset, weight }
            }
            None => BlurTap {
                offset: pos_a,
                weight: weights[a],
            },
        }
    };

    // Right side, walking outward from the centre.
    let right: Vec<BlurTap> = (centre + 1..weights.len())
        .step_by(2)
        .map(|a| merge(a, (a + 1 < weights.len()).then_some(a + 1)))
        .collect();

    // Left side, mirrored so pairing matches the right side.
    let left: Vec<BlurTap> = (1..=centre)
        .step_by(2)
        .map(|d| merge(centre - d, (d < centre).then(|| centre - d - 1)))
        .collect();

    let mut taps = Vec::with_capacity(left.len() + 1 + right.len());
    taps.extend(left.into_iter().rev());
    taps.push(BlurTap {
        offset: 0.0,
        weight: weights[centre],
    });
    taps.extend(right);
    taps
}

/// Collapsed taps for the given settings.
pub fn bloom_kernel(settings: &BloomSettings) -> Vec<BlurTap> {
    collapse_kernel(&gaussian_weights(settings.radius, settings.variance))
}

pub struct HdrBloomPass {
    info: PassInfo,
    taps: Vec<BlurTap>,
    /// [0] vertical result, [1] horizontal result
    blur_targets: [RenderTarget; 2],

    blur_pipeline: wgpu::RenderPipeline,
    blur_bgl: wgpu::BindGroupLayout,
    tap_buffer: wgpu::Buffer,
    vertical_params: wgpu::Buffer,
    horizontal_bind_group: wgpu::BindGroup,
    sampler: wgpu::Sampler,

    composite_pipeline: wgpu::RenderPipeline,
    composite_bgl: wgpu::BindGroupLayout,
    bloom_bind_group: wgpu::BindGroup,
}

impl HdrBloomPass {
    pub fn taps(&self) -> &[BlurTap] {
        &self.taps
    }

    pub fn blur_targets(&self) -> &[RenderTarget; 2] {
        &self.blur_targets
    }

    fn create_params(device: &wgpu::Device, direction: [f32; 2], tap_count: u32) -> wgpu::Buffer {
        let params = BlurParams {
            direction,
            tap_count,
            _pad0: 0,
        };
        device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Bloom Blur Params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        })
    }

    fn blur_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        params: &wgpu::Buffer,
        taps: &wgpu::Buffer,
        source: &wgpu::TextureView,
        sampler: &wgpu::Sampler,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Bloom Blur BG"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: taps.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(source),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        })
    }

    fn texture_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        view: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Bloom Composite BG"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(view),
            }],
        })
    }
}

impl CreatePass for HdrBloomPass {
    fn create(device: &wgpu::Device, settings: &ProcessorSettings) -> Result<Self> {
        let bloom = &settings.bloom;
        let taps = bloom_kernel(bloom);

        let blur_bgl = pipeline::create_blur_bgl(device);
        let composite_bgl = pipeline::create_single_texture_bgl(device, "Bloom Composite BGL");

        let blur_pipeline = gpu::validated(device, "Bloom Blur Pipeline", || {
            pipeline::create_fullscreen_effect_pipeline(
                device,
                "Bloom Blur Pipeline",
                shaders::BLOOM_BLUR_FRAG,
                "fs_main",
                &blur_bgl,
                bloom.format,
                None,
            )
        })?;
        let composite_pipeline = gpu::validated(device, "Bloom Composite Pipeline", || {
            pipeline::create_fullscreen_effect_pipeline(
                device,
                "Bloom Composite Pipeline",
                shaders::COMPOSITE_ADD_FRAG,
                "fs_main",
                &composite_bgl,
                HDR_FORMAT,
                Some(ADDITIVE_BLEND),
            )
        })?;
        let blur_targets = gpu::validated(device, "Bloom Targets", || {
            render_targets::create_bloom_targets(device, settings.width, settings.height, bloom.format)
        })?;

        let tap_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Bloom Blur Taps"),
            contents: bytemuck::cast_slice(&taps),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let vertical_params = Self::create_params(device, [0.0, 1.0], taps.len() as u32);
        let horizontal_params = Self::create_params(device, [1.0, 0.0], taps.len() as u32);
        let sampler = pipeline::create_linear_clamp_sampler(device, "Bloom Sampler");

        let horizontal_bind_group = Self::blur_bind_group(
            device,
            &blur_bgl,
            &horizontal_params,
            &tap_buffer,
            &blur_targets[0].color_view,
            &sampler,
        );
        let bloom_bind_group =
            Self::texture_bind_group(device, &composite_bgl, &blur_targets[1].color_view);

        log::debug!(
            "Bloom kernel: radius {}, variance {}, {} taps",
            bloom.radius,
            bloom.variance,
            taps.len()
        );

        Ok(Self {
            info: PassInfo::new("HdrBloomPass", settings.width, settings.height),
            taps,
            blur_targets,
            blur_pipeline,
            blur_bgl,
            tap_buffer,
            vertical_params,
            horizontal_bind_group,
            sampler,
            composite_pipeline,
            composite_bgl,
            bloom_bind_group,
        })
    }
}

impl RenderPass for HdrBloomPass {
    impl_pass_info!();

    fn update(&mut self, _camera: &Camera) {}

    fn render(
        &mut self,
        ctx: RenderContext<'_>,
        encoder: &mut wgpu::CommandEncoder,
        read: &RenderTarget,
        write: &RenderTarget,
        gbuffer: &GBuffer,
    ) {
        let vertical_bind_group = Self::blur_bind_group(
            ctx.device,
            &self.blur_bgl,
            &self.vertical_params,
            &self.tap_buffer,
            gbuffer.view(GBufferChannel::Hdr),
            &self.sampler,
        );
        render_fullscreen_effect(
            encoder,
            &self.blur_targets[0],
            &self.blur_pipeline,
            &vertical_bind_group,
            "Bloom Blur V",
        );
        render_fullscreen_effect(
            encoder,
            &self.blur_targets[1],
            &self.blur_pipeline,
            &self.horizontal_bind_group,
            "Bloom Blur H",
        );

        let read_bind_group =
            Self::texture_bind_group(ctx.device, &self.composite_bgl, &read.color_view);
        render_fullscreen_draws(
            encoder,
            write,
            &self.composite_pipeline,
            &[&self.bloom_bind_group, &read_bind_group],
            "Bloom Composite",
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-5;

    #[test]
    fn dense_weights_sum_to_one() {
        for &(radius, variance) in &[(16, 0.2), (1, 0.5), (5, 0.05), (0, 0.2)] {
            let weights = gaussian_weights(radius, variance);
            assert_eq!(weights.len(), 2 * radius + 1);
            let sum: f32 = weights.iter().sum();
            assert!((sum - 1.0).abs() < EPSILON, "r={radius} v={variance} sum={sum}");
        }
    }

    #[test]
    fn dense_weights_are_symmetric_and_peak_at_centre() {
        let weights = gaussian_weights(16, 0.2);
        let n = weights.len();
        for i in 0..n {
            assert!((weights[i] - weights[n - 1 - i]).abs() < EPSILON);
            assert!(weights[i] <= weights[16] + EPSILON);
        }
    }

    #[test]
    fn collapsed_offsets_are_antisymmetric() {
        for radius in [1, 2, 3, 8, 16] {
            let taps = collapse_kernel(&gaussian_weights(radius, 0.2));
            let n = taps.len();
            for i in 0..n {
                assert!(
                    (taps[i].offset + taps[n - 1 - i].offset).abs() < EPSILON,
                    "radius {radius}: offset[{i}] = {}, offset[{}] = {}",
                    taps[i].offset,
                    n - 1 - i,
                    taps[n - 1 - i].offset
                );
            }
        }
    }

    #[test]
    fn collapse_preserves_total_weight() {
        let taps = bloom_kernel(&BloomSettings::default());
        let sum: f32 = taps.iter().map(|t| t.weight).sum();
        assert!((sum - 1.0).abs() < EPSILON, "sum={sum}");
    }

    #[test]
    fn default_kernel_halves_side_taps() {
        // 16 taps per side collapse to 8, plus the centre.
        let taps = bloom_kernel(&BloomSettings::default());
        assert_eq!(taps.len(), 17);
        assert_eq!(taps[8].offset, 0.0);
    }

    #[test]
    fn pair_offset_is_weighted_average() {
        let weights = [0.1, 0.2, 0.4, 0.2, 0.1];
        let taps = collapse_kernel(&weights);
        assert_eq!(taps.len(), 3);
        let expected = (0.2 * 1.0 + 0.1 * 2.0) / 0.3;
        assert!((taps[2].offset - expected).abs() < EPSILON);
        assert!((taps[2].weight - 0.3).abs() < EPSILON);
        assert!((taps[0].offset + expected).abs() < EPSILON);
    }

    #[test]
    fn odd_side_keeps_last_tap_single() {
        // radius 3: side taps at 1, 2, 3 -> pair (1, 2) and single 3.
        let weights = gaussian_weights(3, 0.2);
        let taps = collapse_kernel(&weights);
        assert_eq!(taps.len(), 5);
        assert_eq!(taps[4].offset, 3.0);
        assert_eq!(taps[4].weight, weights[6]);
        assert_eq!(taps[0].offset, -3.0);
    }
}
