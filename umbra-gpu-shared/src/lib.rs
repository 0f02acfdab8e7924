//! Data shared between the CPU side of the deferred pipeline and its WGSL shaders.

pub mod shaders;
pub mod uniforms;
