//! GPU error types.

use ash::vk;
use thiserror::Error;

/// GPU-related errors.
///
/// Device-level failures are unrecoverable by design: callers propagate them
/// to the top of the render loop, which logs and aborts the process. There is
/// no retry path for any variant.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// No suitable GPU found.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// Memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Swapchain creation failed.
    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// Shader bytecode could not be loaded.
    #[error("Shader load failed: {0}")]
    ShaderLoad(String),

    /// Pipeline creation failed.
    #[error("Pipeline creation failed: {0}")]
    PipelineCreation(String),

    /// A frame fence did not signal within its bounded wait.
    ///
    /// The GPU is considered permanently stuck once this fires.
    #[error("Fence wait timed out after {waited_ns} ns")]
    FenceTimeout {
        /// How long the wait blocked before giving up.
        waited_ns: u64,
    },

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;
