use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

/// Camera matrices for G-Buffer capture, bind group 0 of `gbuffer.wgsl`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct FrameUniforms {
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
}

impl FrameUniforms {
    pub fn new(view: Mat4, projection: Mat4) -> Self {
        Self {
            view: view.to_cols_array_2d(),
            projection: projection.to_cols_array_2d(),
        }
    }
}

/// Per-draw data, bind group 1 of both scene capture shaders.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ObjectUniforms {
    pub model: [[f32; 4]; 4],
    /// Inverse-transpose of `model`, stored as a full mat4 for alignment.
    pub normal_matrix: [[f32; 4]; 4],
    pub albedo: [f32; 4],
    /// RGB seeds the HDR channel; alpha is ignored.
    pub emissive: [f32; 4],
}

impl ObjectUniforms {
    pub fn new(model: Mat4, albedo: Vec4, emissive: Vec4) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            normal_matrix: model.inverse().transpose().to_cols_array_2d(),
            albedo: albedo.to_array(),
            emissive: emissive.to_array(),
        }
    }
}

impl Default for ObjectUniforms {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Vec4::ONE, Vec4::ZERO)
    }
}

/// Light-space matrices for shadow map capture, bind group 0 of `linear_depth.wgsl`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ShadowCaptureUniforms {
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub near_clip: f32,
    pub linear_depth_scalar: f32,
    pub _pad0: f32,
    pub _pad1: f32,
}

/// One point light as read from the storage buffer in `point_light.wgsl`.
/// `position` is in camera (view) space.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct PointLightData {
    pub ambient: [f32; 4],
    pub diffuse: [f32; 4],
    pub specular: [f32; 4],
    pub position: [f32; 4],
    pub intensity: f32,
    pub radius: f32,
    pub _pad0: f32,
    pub _pad1: f32,
}

/// Point light pass parameters.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct PointLightParams {
    pub light_count: u32,
    pub shininess: f32,
    pub _pad0: u32,
    pub _pad1: u32,
}

/// Shadowed directional light parameters.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ShadowLightParams {
    /// bias * light projection * light view * inverse(camera view)
    pub shadow_trans: [[f32; 4]; 4],
    /// Light direction in camera space, w = 0.
    pub light_dir: [f32; 4],
    pub ambient: [f32; 4],
    pub diffuse: [f32; 4],
    pub darkness: f32,
    pub linear_depth_scalar: f32,
    pub depth_bias: f32,
    pub _pad0: f32,
}

/// Separable blur parameters. `direction` is (0, 1) for vertical, (1, 0) for horizontal.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct BlurParams {
    pub direction: [f32; 2],
    pub tap_count: u32,
    pub _pad0: u32,
}

/// One collapsed blur tap: x = offset in texels, y = weight.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct BlurTap {
    pub offset: f32,
    pub weight: f32,
}

/// Source sub-rectangle for `blit.wgsl`, in uv of the processor output.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct BlitParams {
    pub uv_offset: [f32; 2],
    pub uv_scale: [f32; 2],
}
