//! Engine lifecycle, event loop, and Vulkan frame backend for Lantern.
//!
//! [`Engine`] owns every GPU resource and sequences setup, per-frame work,
//! and teardown; [`run`] drives it from a winit event loop. Device errors are
//! unrecoverable by design: the runner logs them and aborts the process.

mod engine;
mod input;
mod runner;

pub use engine::Engine;
pub use input::KeyboardState;
pub use runner::{run, EngineConfig};
