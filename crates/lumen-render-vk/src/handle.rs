// SPDX-License-Identifier: CEPL-1.0
use std::fmt;
use std::sync::Arc;

use ash::vk;

use crate::device::GpuDevice;

/// A Vulkan object type with a matching destroy call on [`GpuDevice`].
pub trait GpuObject: Copy + fmt::Debug {
    /// # Safety
    /// `self` must have been created by `device` and be unused by the GPU.
    unsafe fn destroy<D: GpuDevice + ?Sized>(self, device: &D);
}

macro_rules! gpu_object {
    ($($ty:ty => $destroy:ident),* $(,)?) => {
        $(
            impl GpuObject for $ty {
                unsafe fn destroy<D: GpuDevice + ?Sized>(self, device: &D) {
                    unsafe { device.$destroy(self) }
                }
            }
        )*
    };
}

gpu_object! {
    vk::SwapchainKHR => destroy_swapchain,
    vk::ImageView => destroy_image_view,
    vk::Framebuffer => destroy_framebuffer,
    vk::RenderPass => destroy_render_pass,
    vk::ShaderModule => destroy_shader_module,
    vk::PipelineLayout => destroy_pipeline_layout,
    vk::Pipeline => destroy_pipeline,
    vk::Semaphore => destroy_semaphore,
    vk::Fence => destroy_fence,
    vk::Buffer => destroy_buffer,
    vk::DeviceMemory => free_memory,
}

/// Owns one handle and destroys it on drop.
///
/// Destruction order between guards follows Rust drop order, so owners
/// declare dependents before the objects they depend on.
pub struct Owned<D: GpuDevice, H: GpuObject> {
    handle: H,
    device: Arc<D>,
}

impl<D: GpuDevice, H: GpuObject> Owned<D, H> {
    /// `handle` must come from `device` and not be owned anywhere else.
    pub(crate) fn new(device: Arc<D>, handle: H) -> Self {
        Self { handle, device }
    }

    pub fn raw(&self) -> H {
        self.handle
    }
}

impl<D: GpuDevice, H: GpuObject> Drop for Owned<D, H> {
    fn drop(&mut self) {
        unsafe { self.handle.destroy(&*self.device) }
    }
}

impl<D: GpuDevice, H: GpuObject> fmt::Debug for Owned<D, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Owned({:?})", self.handle)
    }
}
