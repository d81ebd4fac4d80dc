// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use anyhow::{ensure, Result};
use ash::vk;
use crossbeam_channel::Receiver;
use lumen_render::{
    BatchWriter, FrameOutcome, RenderSettings, RenderSize, Renderer, ResizeEvent, WindowSurface,
};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::info;

use crate::context::DeviceContext;
use crate::device::GpuDevice;
use crate::frame::{FramePass, FrameScheduler};
use crate::handle::Owned;
use crate::pipeline::{PipelineBuilder, PipelineDescriptor};
use crate::render_pass::create_render_pass;
use crate::swapchain::SwapchainManager;
use crate::ui::UiOverlay;

/// Owns every GPU object of the engine.
///
/// Field order is teardown order: the overlay and frame slots go first, the
/// device context (held by everything through `Arc`) goes last.
pub struct VkRenderer<D: GpuDevice = DeviceContext> {
    ui: Option<UiOverlay<D>>,
    scheduler: FrameScheduler<D>,
    pipeline: Owned<D, vk::Pipeline>,
    _layout: Owned<D, vk::PipelineLayout>,
    swapchain: SwapchainManager<D>,
    render_pass: Owned<D, vk::RenderPass>,
    clear_color: [f32; 4],
    device: Arc<D>,
}

impl<D: GpuDevice> VkRenderer<D> {
    /// Everything after device bring-up: swapchain, render pass, pipelines,
    /// framebuffers, frame slots and the optional overlay, in that order.
    pub fn with_device(
        device: Arc<D>,
        size: RenderSize,
        resize_events: Receiver<ResizeEvent>,
        settings: &RenderSettings,
    ) -> Result<Self> {
        let mut swapchain = SwapchainManager::new(Arc::clone(&device), settings.present);
        swapchain.create(size)?;
        swapchain.create_image_views()?;

        let render_pass = create_render_pass(&device, swapchain.format().format)?;

        let builder = PipelineBuilder::new(Arc::clone(&device));
        let layout = builder.create_layout()?;
        let pipeline = builder.create_pipeline(&PipelineDescriptor::triangle(
            &settings.shader_dir,
            layout.raw(),
            render_pass.raw(),
        ))?;

        swapchain.create_framebuffers(render_pass.raw())?;
        ensure!(
            swapchain.is_complete(),
            "swapchain has {} images but {} framebuffers",
            swapchain.image_count(),
            swapchain.framebuffer_count()
        );

        let scheduler = FrameScheduler::new(Arc::clone(&device), resize_events)?;

        let ui = settings
            .ui
            .map(|ui| {
                UiOverlay::new(
                    Arc::clone(&device),
                    &builder,
                    render_pass.raw(),
                    &settings.shader_dir,
                    ui.max_vertices,
                )
            })
            .transpose()?;

        info!(
            "renderer ready ({} swapchain images, ui overlay {})",
            swapchain.image_count(),
            if ui.is_some() { "on" } else { "off" }
        );

        Ok(Self {
            ui,
            scheduler,
            pipeline,
            _layout: layout,
            swapchain,
            render_pass,
            clear_color: settings.clear_color,
            device,
        })
    }

    pub fn draw(&mut self, window: &mut dyn WindowSurface) -> Result<FrameOutcome> {
        let pass = FramePass {
            render_pass: self.render_pass.raw(),
            pipeline: self.pipeline.raw(),
            clear_color: self.clear_color,
        };
        self.scheduler
            .draw_frame(&mut self.swapchain, window, &pass, self.ui.as_ref())
    }

    pub fn set_clear(&mut self, rgba: [f32; 4]) {
        self.clear_color = rgba;
    }

    pub fn swapchain(&self) -> &SwapchainManager<D> {
        &self.swapchain
    }

    pub fn ui_batch(&mut self) -> Option<BatchWriter<'_>> {
        self.ui.as_mut().map(UiOverlay::writer)
    }

    pub fn idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }?;
        Ok(())
    }
}

impl<D: GpuDevice> Drop for VkRenderer<D> {
    fn drop(&mut self) {
        unsafe { self.device.device_wait_idle() }.ok();
        info!("renderer shutting down");
    }
}

impl Renderer for VkRenderer<DeviceContext> {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        resize_events: Receiver<ResizeEvent>,
        settings: &RenderSettings,
    ) -> Result<Self> {
        let device = DeviceContext::new(window, display, settings.validation)?;
        Self::with_device(device, size, resize_events, settings)
    }

    fn draw_frame(&mut self, window: &mut dyn WindowSurface) -> Result<FrameOutcome> {
        self.draw(window)
    }

    fn overlay(&mut self) -> Option<BatchWriter<'_>> {
        self.ui_batch()
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.set_clear(rgba);
    }

    fn wait_idle(&self) -> Result<()> {
        self.idle()
    }
}
