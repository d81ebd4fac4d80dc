// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]

mod context;
mod device;
mod error;
mod frame;
mod handle;
mod pipeline;
mod render_pass;
mod renderer;
mod swapchain;
mod ui;

#[cfg(test)]
mod fake;

pub use context::{find_memory_type, DeviceContext};
pub use device::{GpuDevice, QueueFamilyIndices, SwapchainSupport};
pub use error::RenderError;
pub use frame::{FramePass, FrameScheduler, FrameSlot, SlotState, MAX_FRAMES_IN_FLIGHT};
pub use handle::{GpuObject, Owned};
pub use pipeline::{PipelineBuilder, PipelineDescriptor};
pub use render_pass::create_render_pass;
pub use renderer::VkRenderer;
pub use swapchain::{
    choose_extent, choose_image_count, choose_present_mode, choose_surface_format,
    SwapchainManager,
};
pub use ui::UiOverlay;

/// SPIR-V compiled by the build script.
pub const DEFAULT_SHADER_DIR: &str = env!("LUMEN_SHADER_DIR");
