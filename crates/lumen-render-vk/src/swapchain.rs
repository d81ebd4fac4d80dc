// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use ash::vk;
use lumen_render::{PresentPreference, RenderSize, WindowSurface};
use tracing::{debug, info};

use crate::device::{GpuDevice, SwapchainSupport};
use crate::error::RenderError;
use crate::handle::Owned;

pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_UNORM
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first().copied())
        .unwrap_or_default()
}

/// FIFO is the only mode every surface must offer.
pub fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    preference: PresentPreference,
) -> vk::PresentModeKHR {
    match preference {
        PresentPreference::Mailbox if modes.contains(&vk::PresentModeKHR::MAILBOX) => {
            vk::PresentModeKHR::MAILBOX
        }
        _ => vk::PresentModeKHR::FIFO,
    }
}

/// `current_extent.width == u32::MAX` means the surface lets us pick; use
/// the live framebuffer size then.
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, framebuffer: RenderSize) -> vk::Extent2D {
    let want = if caps.current_extent.width == u32::MAX {
        vk::Extent2D {
            width: framebuffer.width,
            height: framebuffer.height,
        }
    } else {
        caps.current_extent
    };
    vk::Extent2D {
        width: want
            .width
            .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: want
            .height
            .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

/// One more than the minimum, capped when the surface has a maximum.
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        desired.min(caps.max_image_count)
    } else {
        desired
    }
}

/// Owns the presentable image chain plus one view and one framebuffer per
/// image. Rebuilt wholesale, never patched.
pub struct SwapchainManager<D: GpuDevice> {
    // Drop order: framebuffers, then views, then the swapchain.
    framebuffers: Vec<Owned<D, vk::Framebuffer>>,
    views: Vec<Owned<D, vk::ImageView>>,
    swapchain: Option<Owned<D, vk::SwapchainKHR>>,
    images: Vec<vk::Image>,

    format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
    preference: PresentPreference,
    generation: u64,
    device: Arc<D>,
}

impl<D: GpuDevice> SwapchainManager<D> {
    pub fn new(device: Arc<D>, preference: PresentPreference) -> Self {
        Self {
            framebuffers: Vec::new(),
            views: Vec::new(),
            swapchain: None,
            images: Vec::new(),
            format: vk::SurfaceFormatKHR::default(),
            present_mode: vk::PresentModeKHR::FIFO,
            extent: vk::Extent2D::default(),
            preference,
            generation: 0,
            device,
        }
    }

    pub fn query_support(&self) -> Result<SwapchainSupport> {
        self.device.surface_support()
    }

    pub fn create(&mut self, framebuffer: RenderSize) -> Result<()> {
        ensure!(
            self.swapchain.is_none(),
            "swapchain already exists; clean up before creating another"
        );
        let support = self.query_support()?;
        if !support.is_adequate() {
            return Err(RenderError::InadequateSurface.into());
        }

        let caps = &support.capabilities;
        let format = choose_surface_format(&support.formats);
        let present_mode = choose_present_mode(&support.present_modes, self.preference);
        let extent = choose_extent(caps, framebuffer);
        let image_count = choose_image_count(caps);
        if self.generation > 0 && format.format != self.format.format {
            return Err(RenderError::SurfaceFormatChanged {
                old: self.format.format,
                new: format.format,
            }
            .into());
        }
        let (sharing, families) = self.device.queue_families().sharing();

        let info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.device.surface())
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing)
            .queue_family_indices(&families)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let swapchain = unsafe { self.device.create_swapchain(&info) }
            .context("vkCreateSwapchainKHR")?;
        let swapchain = Owned::new(Arc::clone(&self.device), swapchain);
        let images = unsafe { self.device.swapchain_images(swapchain.raw()) }
            .context("vkGetSwapchainImagesKHR")?;

        info!(
            "swapchain: {}x{} format={:?} color_space={:?} present={:?} images={} sharing={:?}",
            extent.width,
            extent.height,
            format.format,
            format.color_space,
            present_mode,
            images.len(),
            sharing
        );

        self.swapchain = Some(swapchain);
        self.images = images;
        self.format = format;
        self.present_mode = present_mode;
        self.extent = extent;
        self.generation += 1;
        Ok(())
    }

    pub fn create_image_views(&mut self) -> Result<()> {
        ensure!(self.views.is_empty(), "image views already exist");
        for (i, &image) in self.images.iter().enumerate() {
            let info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.format.format)
                .components(vk::ComponentMapping::default())
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            let view = unsafe { self.device.create_image_view(&info) }
                .with_context(|| format!("vkCreateImageView (image {i})"))?;
            self.views.push(Owned::new(Arc::clone(&self.device), view));
        }
        debug!("created {} image views", self.views.len());
        Ok(())
    }

    pub fn create_framebuffers(&mut self, render_pass: vk::RenderPass) -> Result<()> {
        ensure!(self.framebuffers.is_empty(), "framebuffers already exist");
        for (i, view) in self.views.iter().enumerate() {
            let attachments = [view.raw()];
            let info = vk::FramebufferCreateInfo::default()
                .render_pass(render_pass)
                .attachments(&attachments)
                .width(self.extent.width)
                .height(self.extent.height)
                .layers(1);
            let framebuffer = unsafe { self.device.create_framebuffer(&info) }
                .with_context(|| format!("vkCreateFramebuffer (image {i})"))?;
            self.framebuffers
                .push(Owned::new(Arc::clone(&self.device), framebuffer));
        }
        debug!("created {} framebuffers", self.framebuffers.len());
        Ok(())
    }

    /// Waits out a minimized window, drains the GPU, then rebuilds
    /// everything. Returns `false` if the window closed while minimized; the
    /// old resources stay in place in that case.
    pub fn recreate(
        &mut self,
        window: &mut dyn WindowSurface,
        render_pass: vk::RenderPass,
    ) -> Result<bool> {
        let mut size = window.framebuffer_size();
        while size.is_empty() {
            if window.should_close() {
                info!("window closed while minimized; skipping swapchain rebuild");
                return Ok(false);
            }
            window.wait_events();
            size = window.framebuffer_size();
        }

        unsafe { self.device.device_wait_idle() }.context("vkDeviceWaitIdle")?;

        self.cleanup();
        self.create(size)?;
        self.create_image_views()?;
        self.create_framebuffers(render_pass)?;
        info!("swapchain rebuilt (generation {})", self.generation);
        Ok(true)
    }

    /// Framebuffers, then views, then the swapchain itself.
    pub fn cleanup(&mut self) {
        if self.swapchain.is_some() {
            debug!(
                "destroying {} framebuffers, {} image views and the swapchain",
                self.framebuffers.len(),
                self.views.len()
            );
        }
        self.framebuffers.clear();
        self.views.clear();
        self.images.clear();
        self.swapchain = None;
    }

    pub fn handle(&self) -> Result<vk::SwapchainKHR> {
        self.swapchain
            .as_ref()
            .map(Owned::raw)
            .context("swapchain has not been created")
    }

    pub fn framebuffer(&self, image_index: u32) -> Option<vk::Framebuffer> {
        self.framebuffers
            .get(image_index as usize)
            .map(Owned::raw)
    }

    /// Images, views and framebuffers all exist and line up one to one.
    pub fn is_complete(&self) -> bool {
        self.swapchain.is_some()
            && !self.images.is_empty()
            && self.views.len() == self.images.len()
            && self.framebuffers.len() == self.images.len()
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn view_count(&self) -> usize {
        self.views.len()
    }

    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Bumped on every successful `create`.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}
