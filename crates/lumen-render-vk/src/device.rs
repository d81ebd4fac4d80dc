// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::khr::surface;
use ash::prelude::VkResult;
use ash::vk;

/// Graphics and present queue family indices. They may be the same family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilyIndices {
    /// Prefers a single family that can do both; otherwise the first family
    /// of each kind.
    pub fn find(
        families: &[vk::QueueFamilyProperties],
        mut supports_present: impl FnMut(u32) -> bool,
    ) -> Option<Self> {
        let mut graphics = None;
        let mut present = None;
        for (i, family) in families.iter().enumerate() {
            let i = i as u32;
            let is_graphics = family.queue_count > 0
                && family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
            let can_present = family.queue_count > 0 && supports_present(i);
            if is_graphics && can_present {
                return Some(Self {
                    graphics: i,
                    present: i,
                });
            }
            if is_graphics && graphics.is_none() {
                graphics = Some(i);
            }
            if can_present && present.is_none() {
                present = Some(i);
            }
        }
        Some(Self {
            graphics: graphics?,
            present: present?,
        })
    }

    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    pub fn unique(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }

    /// Swapchain image sharing: concurrent across two distinct families,
    /// exclusive when they coincide.
    pub fn sharing(&self) -> (vk::SharingMode, Vec<u32>) {
        if self.is_shared() {
            (vk::SharingMode::EXCLUSIVE, Vec::new())
        } else {
            (vk::SharingMode::CONCURRENT, self.unique())
        }
    }
}

#[derive(Clone, Debug)]
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    /// # Safety
    /// `physical_device` and `surface` must be live handles of the instance
    /// `loader` was created from.
    pub unsafe fn query(
        loader: &surface::Instance,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Self> {
        let capabilities = unsafe {
            loader.get_physical_device_surface_capabilities(physical_device, surface)
        }
        .context("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")?;
        let formats = unsafe { loader.get_physical_device_surface_formats(physical_device, surface) }
            .context("vkGetPhysicalDeviceSurfaceFormatsKHR")?;
        let present_modes = unsafe {
            loader.get_physical_device_surface_present_modes(physical_device, surface)
        }
        .context("vkGetPhysicalDeviceSurfacePresentModesKHR")?;
        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// The slice of a logical device the presentation core talks to.
///
/// [`crate::DeviceContext`] implements it over `ash`; tests swap in a
/// recording double. Every handle passed in must have been created by the
/// same implementor, and objects must not be destroyed while queued GPU work
/// still references them. Those are the safety contracts of the `unsafe`
/// methods below.
pub trait GpuDevice {
    fn queue_families(&self) -> QueueFamilyIndices;
    fn surface(&self) -> vk::SurfaceKHR;
    /// Fresh surface capabilities, formats and present modes for the
    /// selected physical device.
    fn surface_support(&self) -> Result<SwapchainSupport>;

    unsafe fn create_swapchain(
        &self,
        info: &vk::SwapchainCreateInfoKHR<'_>,
    ) -> VkResult<vk::SwapchainKHR>;
    unsafe fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>>;
    unsafe fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);

    unsafe fn create_image_view(
        &self,
        info: &vk::ImageViewCreateInfo<'_>,
    ) -> VkResult<vk::ImageView>;
    unsafe fn destroy_image_view(&self, view: vk::ImageView);

    unsafe fn create_framebuffer(
        &self,
        info: &vk::FramebufferCreateInfo<'_>,
    ) -> VkResult<vk::Framebuffer>;
    unsafe fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);

    unsafe fn create_render_pass(
        &self,
        info: &vk::RenderPassCreateInfo<'_>,
    ) -> VkResult<vk::RenderPass>;
    unsafe fn destroy_render_pass(&self, render_pass: vk::RenderPass);

    unsafe fn create_shader_module(&self, code: &[u32]) -> VkResult<vk::ShaderModule>;
    unsafe fn destroy_shader_module(&self, module: vk::ShaderModule);

    unsafe fn create_pipeline_layout(
        &self,
        info: &vk::PipelineLayoutCreateInfo<'_>,
    ) -> VkResult<vk::PipelineLayout>;
    unsafe fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);

    unsafe fn create_graphics_pipeline(
        &self,
        info: &vk::GraphicsPipelineCreateInfo<'_>,
    ) -> VkResult<vk::Pipeline>;
    unsafe fn destroy_pipeline(&self, pipeline: vk::Pipeline);

    unsafe fn create_semaphore(&self) -> VkResult<vk::Semaphore>;
    unsafe fn destroy_semaphore(&self, semaphore: vk::Semaphore);

    unsafe fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence>;
    unsafe fn destroy_fence(&self, fence: vk::Fence);
    /// Waits with no timeout.
    unsafe fn wait_for_fence(&self, fence: vk::Fence) -> VkResult<()>;
    unsafe fn reset_fence(&self, fence: vk::Fence) -> VkResult<()>;

    /// Host-visible, host-coherent buffer with its own allocation.
    unsafe fn create_host_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> Result<(vk::Buffer, vk::DeviceMemory)>;
    unsafe fn destroy_buffer(&self, buffer: vk::Buffer);
    unsafe fn free_memory(&self, memory: vk::DeviceMemory);
    /// Map, copy `bytes` to offset 0, unmap.
    unsafe fn write_host_memory(&self, memory: vk::DeviceMemory, bytes: &[u8]) -> Result<()>;

    unsafe fn allocate_command_buffers(&self, count: u32) -> VkResult<Vec<vk::CommandBuffer>>;
    unsafe fn free_command_buffers(&self, buffers: &[vk::CommandBuffer]);
    unsafe fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()>;
    unsafe fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()>;
    unsafe fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()>;

    unsafe fn cmd_begin_render_pass(
        &self,
        cmd: vk::CommandBuffer,
        info: &vk::RenderPassBeginInfo<'_>,
    );
    unsafe fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer);
    unsafe fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline);
    unsafe fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, viewport: vk::Viewport);
    unsafe fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, scissor: vk::Rect2D);
    unsafe fn cmd_bind_vertex_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer);
    unsafe fn cmd_draw(&self, cmd: vk::CommandBuffer, vertex_count: u32);

    /// Returns the image index and the suboptimal flag.
    unsafe fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)>;
    unsafe fn queue_submit(
        &self,
        cmd: vk::CommandBuffer,
        wait: vk::Semaphore,
        wait_stage: vk::PipelineStageFlags,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> VkResult<()>;
    /// Returns the suboptimal flag.
    unsafe fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<bool>;
    unsafe fn device_wait_idle(&self) -> VkResult<()>;
}
