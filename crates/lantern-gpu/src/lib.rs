//! Vulkan abstraction layer for the Lantern renderer.
//!
//! This crate provides:
//! - Vulkan instance and device management
//! - Device limit detection (including uniform offset alignment)
//! - Memory allocation via gpu-allocator
//! - Command buffer and synchronization management
//! - The deletion queue used for ordered resource teardown
//! - Swapchain handling

pub mod command;
pub mod context;
pub mod deletion;
pub mod descriptors;
pub mod error;
pub mod instance;
pub mod limits;
pub mod memory;
pub mod pipeline;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use context::{GpuContext, GpuContextBuilder};
pub use deletion::{DeletionQueue, TrackedBuffer};
pub use descriptors::{
    write_uniform_buffer, write_uniform_buffer_dynamic, DescriptorPool, DescriptorSetLayoutBuilder,
};
pub use error::{GpuError, Result};
pub use limits::{DeviceLimits, GpuVendor};
pub use memory::{GpuAllocator, GpuBuffer, GpuImage};
pub use pipeline::{load_spirv, GraphicsPipeline, GraphicsPipelineConfig};
pub use surface::{SurfaceCapabilities, SurfaceContext};
pub use swapchain::Swapchain;
pub use sync::{create_fence, create_semaphore, FrameSync, FENCE_TIMEOUT_NS};
