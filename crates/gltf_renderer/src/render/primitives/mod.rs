//! Renderer-agnostic primitives

pub mod camera;

pub use camera::{Camera, CameraPushConstants};
