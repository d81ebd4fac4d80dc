// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use anyhow::{Context, Result};
use ash::vk;
use crossbeam_channel::Receiver;
use lumen_render::{FrameOutcome, ResizeEvent, StaleReason, WindowSurface};
use tracing::{debug, info};

use crate::device::GpuDevice;
use crate::handle::Owned;
use crate::swapchain::SwapchainManager;
use crate::ui::UiOverlay;

pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Where a frame slot is in its acquire/record/submit/present cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SlotState {
    #[default]
    Idle,
    WaitFence,
    Acquiring,
    Recording,
    Submitted,
    Presenting,
}

pub struct FrameSlot<D: GpuDevice> {
    image_available: Owned<D, vk::Semaphore>,
    render_finished: Owned<D, vk::Semaphore>,
    /// Created signaled so the first wait returns at once.
    in_flight: Owned<D, vk::Fence>,
    command_buffer: vk::CommandBuffer,
    state: SlotState,
}

impl<D: GpuDevice> FrameSlot<D> {
    fn new(device: &Arc<D>, command_buffer: vk::CommandBuffer) -> Result<Self> {
        let image_available = Owned::new(
            Arc::clone(device),
            unsafe { device.create_semaphore() }.context("vkCreateSemaphore (image available)")?,
        );
        let render_finished = Owned::new(
            Arc::clone(device),
            unsafe { device.create_semaphore() }.context("vkCreateSemaphore (render finished)")?,
        );
        let in_flight = Owned::new(
            Arc::clone(device),
            unsafe { device.create_fence(true) }.context("vkCreateFence")?,
        );
        Ok(Self {
            image_available,
            render_finished,
            in_flight,
            command_buffer,
            state: SlotState::Idle,
        })
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    pub fn image_available(&self) -> vk::Semaphore {
        self.image_available.raw()
    }

    pub fn render_finished(&self) -> vk::Semaphore {
        self.render_finished.raw()
    }

    pub fn in_flight(&self) -> vk::Fence {
        self.in_flight.raw()
    }

    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }
}

/// Per-frame handles the scheduler reads but does not own.
#[derive(Clone, Copy, Debug)]
pub struct FramePass {
    pub render_pass: vk::RenderPass,
    pub pipeline: vk::Pipeline,
    pub clear_color: [f32; 4],
}

/// Drives acquire, record, submit and present over a ring of
/// `MAX_FRAMES_IN_FLIGHT` slots.
pub struct FrameScheduler<D: GpuDevice> {
    slots: Vec<FrameSlot<D>>,
    current: usize,
    resize_events: Receiver<ResizeEvent>,
    frames_presented: u64,
    device: Arc<D>,
}

impl<D: GpuDevice> FrameScheduler<D> {
    pub fn new(device: Arc<D>, resize_events: Receiver<ResizeEvent>) -> Result<Self> {
        let buffers = unsafe { device.allocate_command_buffers(MAX_FRAMES_IN_FLIGHT as u32) }
            .context("vkAllocateCommandBuffers")?;
        let mut slots = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for (i, &cmd) in buffers.iter().enumerate() {
            match FrameSlot::new(&device, cmd) {
                Ok(slot) => slots.push(slot),
                Err(e) => {
                    unsafe { device.free_command_buffers(&buffers) };
                    return Err(e.context(format!("frame slot {i}")));
                }
            }
        }
        debug!("{} frame slots ready", slots.len());
        Ok(Self {
            slots,
            current: 0,
            resize_events,
            frames_presented: 0,
            device,
        })
    }

    pub fn current_slot(&self) -> usize {
        self.current
    }

    pub fn slot(&self, index: usize) -> Option<&FrameSlot<D>> {
        self.slots.get(index)
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// One pass of the frame loop.
    ///
    /// Blocks on the slot's fence, acquires an image, records and submits,
    /// then presents. A stale swapchain or a pending resize at acquire time
    /// drops the frame and rebuilds the swapchain; staleness reported by
    /// present rebuilds it after the frame is queued.
    pub fn draw_frame(
        &mut self,
        swapchain: &mut SwapchainManager<D>,
        window: &mut dyn WindowSurface,
        pass: &FramePass,
        overlay: Option<&UiOverlay<D>>,
    ) -> Result<FrameOutcome> {
        let index = self.current;
        let device = Arc::clone(&self.device);
        let (image_available, render_finished, in_flight, cmd) = {
            let slot = &self.slots[index];
            (
                slot.image_available.raw(),
                slot.render_finished.raw(),
                slot.in_flight.raw(),
                slot.command_buffer,
            )
        };

        self.set_state(index, SlotState::WaitFence);
        unsafe { device.wait_for_fence(in_flight) }.context("vkWaitForFences")?;

        self.set_state(index, SlotState::Acquiring);
        let acquired =
            unsafe { device.acquire_next_image(swapchain.handle()?, image_available) };
        let resized = self.resize_events.try_iter().last();

        let (image_index, stale) = match acquired {
            Ok((image, true)) => (image, Some(StaleReason::Suboptimal)),
            Ok((image, false)) => (image, resized.map(|_| StaleReason::Resized)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.set_state(index, SlotState::Idle);
                self.rebuild(swapchain, window, pass, StaleReason::OutOfDate)?;
                return Ok(FrameOutcome::Dropped(StaleReason::OutOfDate));
            }
            Err(e) => {
                self.set_state(index, SlotState::Idle);
                return Err(e).context("vkAcquireNextImageKHR");
            }
        };

        if let Some(reason) = stale {
            self.set_state(index, SlotState::Idle);
            self.rebuild(swapchain, window, pass, reason)?;
            // The acquire already signaled this semaphore and nothing will
            // wait on it; start the slot over with a fresh one.
            let fresh = unsafe { device.create_semaphore() }
                .context("vkCreateSemaphore (image available)")?;
            self.slots[index].image_available = Owned::new(Arc::clone(&device), fresh);
            return Ok(FrameOutcome::Dropped(reason));
        }

        let framebuffer = swapchain
            .framebuffer(image_index)
            .with_context(|| format!("no framebuffer for swapchain image {image_index}"))?;

        // Only now is a submit guaranteed, so the fence can be unsignaled.
        unsafe { device.reset_fence(in_flight) }.context("vkResetFences")?;

        self.set_state(index, SlotState::Recording);
        record_commands(
            &*device,
            cmd,
            framebuffer,
            swapchain.extent(),
            pass,
            overlay.map(|ui| (ui, index)),
        )?;

        self.set_state(index, SlotState::Submitted);
        unsafe {
            device.queue_submit(
                cmd,
                image_available,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                render_finished,
                in_flight,
            )
        }
        .context("vkQueueSubmit")?;

        self.set_state(index, SlotState::Presenting);
        let presented =
            unsafe { device.queue_present(swapchain.handle()?, image_index, render_finished) };
        self.set_state(index, SlotState::Idle);
        self.current = (self.current + 1) % MAX_FRAMES_IN_FLIGHT;
        self.frames_presented += 1;

        let stale = match presented {
            Ok(false) => None,
            Ok(true) => Some(StaleReason::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Some(StaleReason::OutOfDate),
            Err(e) => return Err(e).context("vkQueuePresentKHR"),
        };
        match stale {
            Some(reason) => {
                self.rebuild(swapchain, window, pass, reason)?;
                Ok(FrameOutcome::PresentedStale(reason))
            }
            None => Ok(FrameOutcome::Presented),
        }
    }

    fn set_state(&mut self, index: usize, state: SlotState) {
        self.slots[index].state = state;
    }

    fn rebuild(
        &mut self,
        swapchain: &mut SwapchainManager<D>,
        window: &mut dyn WindowSurface,
        pass: &FramePass,
        reason: StaleReason,
    ) -> Result<()> {
        info!("swapchain stale ({:?}), rebuilding", reason);
        // Events that arrived during the rebuild are covered by it.
        swapchain.recreate(window, pass.render_pass)?;
        self.resize_events.try_iter().for_each(drop);
        Ok(())
    }
}

impl<D: GpuDevice> Drop for FrameScheduler<D> {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();
            let buffers: Vec<_> = self.slots.iter().map(|s| s.command_buffer).collect();
            if !buffers.is_empty() {
                self.device.free_command_buffers(&buffers);
            }
        }
    }
}

fn record_commands<D: GpuDevice>(
    device: &D,
    cmd: vk::CommandBuffer,
    framebuffer: vk::Framebuffer,
    extent: vk::Extent2D,
    pass: &FramePass,
    overlay: Option<(&UiOverlay<D>, usize)>,
) -> Result<()> {
    unsafe {
        device
            .reset_command_buffer(cmd)
            .context("vkResetCommandBuffer")?;
        device
            .begin_command_buffer(cmd)
            .context("vkBeginCommandBuffer")?;
    }

    let clear_values = [vk::ClearValue {
        color: vk::ClearColorValue {
            float32: pass.clear_color,
        },
    }];
    let area = vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    };
    let begin = vk::RenderPassBeginInfo::default()
        .render_pass(pass.render_pass)
        .framebuffer(framebuffer)
        .render_area(area)
        .clear_values(&clear_values);
    let viewport = vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    };

    unsafe {
        device.cmd_begin_render_pass(cmd, &begin);
        device.cmd_bind_pipeline(cmd, pass.pipeline);
        device.cmd_set_viewport(cmd, viewport);
        device.cmd_set_scissor(cmd, area);
        device.cmd_draw(cmd, 3);
    }
    if let Some((ui, slot)) = overlay {
        ui.render(cmd, slot)?;
    }
    unsafe {
        device.cmd_end_render_pass(cmd);
        device.end_command_buffer(cmd).context("vkEndCommandBuffer")?;
    }
    Ok(())
}
