//! # glTF Renderer
//!
//! A Vulkan renderer for a single static glTF scene.
//!
//! ## Features
//!
//! - **Explicit GPU Lifetimes**: Buffers, images and sync objects are plain
//!   values destroyed by their owner in reverse creation order
//! - **Frames in Flight**: Fence/semaphore ring with swapchain recreation on
//!   resize, minimize and out-of-date surfaces
//! - **Bindless-style Materials**: One partially bound descriptor table holds
//!   every material's uniforms and textures
//! - **Single Draw**: The whole scene is flattened into one vertex buffer and
//!   drawn with one call
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gltf_renderer::prelude::*;
//!
//! fn run(window: &dyn WindowSurface) -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ApplicationConfig::load_or_default("viewer.toml")?;
//!     let scene = SceneLoader::new().load_file(&config.scene.asset_path)?;
//!     let mut renderer = VulkanRenderer::new(&config.renderer, &scene, window)?;
//!     let camera = Camera::from_config(&config.camera);
//!     renderer.render_frame(window, &camera, &mut NoOverlay)?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod foundation;
pub mod input;
pub mod render;
pub mod scene;

/// Common imports for renderer users
pub mod prelude {
    pub use crate::{
        config::{ApplicationConfig, CameraConfig, Config, VulkanRendererConfig},
        foundation::math::{Mat4, Vec3},
        input::{InputEvent, InputState, MouseButton, MoveDirection, WindowEvent},
        render::{
            route_input, Camera, FrameOutcome, NoOverlay, Overlay, OverlayTarget, RendererError, VulkanRenderer,
        },
        render::vulkan::{VulkanError, VulkanResult, WindowSurface},
        scene::{SceneData, SceneError, SceneLoader},
    };
}
