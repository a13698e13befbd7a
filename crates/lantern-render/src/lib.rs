//! Frame pipelining and draw submission for the Lantern renderer.
//!
//! This crate provides:
//! - The frame pipeline: ring rotation and the per-frame protocol
//! - The uniform stride allocator for dynamic uniform offsets
//! - Mesh and material registries
//! - The batch submitter that minimizes redundant GPU state changes
//! - Camera and per-frame GPU uniform structs

pub mod batch;
pub mod camera;
pub mod frame;
pub mod material;
pub mod mesh;
pub mod uniform;

pub use batch::{submit_objects, CommandEncoder, DrawEncoder, MeshPushConstants, RenderObject};
pub use camera::{Camera, GpuCameraData};
pub use frame::{FrameBackend, FramePipeline, FRAME_OVERLAP};
pub use material::{Material, MaterialHandle, MaterialRegistry};
pub use mesh::{Mesh, MeshError, MeshHandle, MeshRegistry, Vertex};
pub use uniform::{aligned_stride, GpuSceneData, SceneUniformLayout};
