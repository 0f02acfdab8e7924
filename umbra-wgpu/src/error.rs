//! Error types for the pass pipeline.
//!
//! Failures are reported at init time (adapter, device, shader and pipeline
//! creation) or as state errors when `begin`/`end` are called out of order.
//! Per-frame recording does not fail otherwise.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum UmbraError {
    // ========================================================================
    // GPU setup
    // ========================================================================
    /// No adapter matched the request (headless contexts only).
    #[error("No compatible GPU adapter found")]
    AdapterUnavailable,

    #[error("Failed to create WGPU device: {0}")]
    DeviceCreateFailed(#[from] wgpu::RequestDeviceError),

    /// Resolution with a zero dimension.
    #[error("Invalid size {width}x{height}: both dimensions must be non-zero")]
    InvalidSize { width: u32, height: u32 },

    /// A shader, pipeline or texture failed validation while being created.
    #[error("Failed to create {label}: {message}")]
    ResourceCreation { label: String, message: String },

    // ========================================================================
    // Frame state
    // ========================================================================
    #[error("Invalid processor state: expected {expected}, found {found}")]
    InvalidState {
        expected: &'static str,
        found: &'static str,
    },

    /// Handle refers to a pass that was removed or has a different type.
    #[error("Render pass not found")]
    PassNotFound,

    // ========================================================================
    // Output
    // ========================================================================
    #[error("Readback failed: {0}")]
    Readback(String),

    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),
}

/// Alias for `std::result::Result<T, UmbraError>`.
pub type Result<T> = std::result::Result<T, UmbraError>;
