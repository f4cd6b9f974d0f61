//! Swapchain-dependent state and per-frame synchronization

pub mod framebuffer;
pub mod swapchain;
pub mod swapchain_manager;
pub mod sync;

pub use framebuffer::{create_framebuffers, destroy_framebuffers, find_depth_format, DepthBuffer};
pub use swapchain::{Swapchain, SwapchainPlan};
pub use swapchain_manager::{RecreateOutcome, SwapchainManager};
pub use sync::{
    should_render, Fence, FrameStart, FrameSync, FrameSynchronizer, PresentOutcome, Semaphore,
};
