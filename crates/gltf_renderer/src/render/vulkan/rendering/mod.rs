//! Render passes, shaders, pipeline and command recording

pub mod commands;
pub mod pipeline;
pub mod render_pass;
pub mod shader;

pub use commands::{full_scissor, full_viewport, ActiveRenderPass, CommandRecorder};
pub use pipeline::{camera_push_constant_range, ScenePipeline};
pub use render_pass::{RenderPass, RenderPasses};
pub use shader::ShaderModule;
