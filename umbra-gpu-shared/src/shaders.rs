/// Embedded WGSL shader source strings for the deferred pass pipeline.
/// Every struct declared in these files has a `#[repr(C)]` twin in `uniforms`.

pub const FULLSCREEN_QUAD_VERT: &str = include_str!("../shaders/fullscreen_quad.wgsl");
pub const GBUFFER_SHADER: &str = include_str!("../shaders/gbuffer.wgsl");
pub const LINEAR_DEPTH_SHADER: &str = include_str!("../shaders/linear_depth.wgsl");
pub const POINT_LIGHT_FRAG: &str = include_str!("../shaders/point_light.wgsl");
pub const SHADOW_LIGHT_FRAG: &str = include_str!("../shaders/shadow_light.wgsl");
pub const BLOOM_BLUR_FRAG: &str = include_str!("../shaders/bloom_blur.wgsl");
pub const COMPOSITE_ADD_FRAG: &str = include_str!("../shaders/composite_add.wgsl");
pub const BLIT_FRAG: &str = include_str!("../shaders/blit.wgsl");
