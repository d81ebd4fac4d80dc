// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use thiserror::Error;

/// Setup failures that callers may want to tell apart from plain
/// `VkResult` errors.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to find a GPU with Vulkan support")]
    NoVulkanGpu,
    #[error("no GPU offers graphics + present queues, VK_KHR_swapchain and a usable surface")]
    NoSuitableGpu,
    #[error("validation layer {0} requested but not available")]
    MissingValidationLayer(String),
    #[error("surface reports no formats or no present modes")]
    InadequateSurface,
    /// The render pass and pipelines are built for one format only.
    #[error("surface format changed from {old:?} to {new:?} on rebuild")]
    SurfaceFormatChanged { old: vk::Format, new: vk::Format },
    #[error("no memory type matches bits {type_bits:#b} with {flags}")]
    NoMemoryType { type_bits: u32, flags: String },
}
