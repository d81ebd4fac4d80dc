// SPDX-License-Identifier: CEPL-1.0
//! Recording stand-in for a logical device, used by the unit tests.

use std::cell::{RefCell, RefMut};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, ensure, Result};
use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use lumen_render::{RenderSize, WindowSurface};

use crate::device::{GpuDevice, QueueFamilyIndices, SwapchainSupport};
use crate::pipeline::{TRIANGLE_FRAG, TRIANGLE_VERT, UI_FRAG, UI_VERT};

pub(crate) fn raw<H: Handle>(handle: H) -> u64 {
    handle.as_raw()
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Call {
    Create(&'static str, u64),
    Destroy(&'static str, u64),
    CreateSwapchain {
        min_image_count: u32,
        extent: vk::Extent2D,
        sharing: vk::SharingMode,
        present_mode: vk::PresentModeKHR,
    },
    CreatePipeline {
        stages: u32,
        dynamic_states: u32,
    },
    WaitFence(u64),
    ResetFence(u64),
    Acquire {
        semaphore: u64,
    },
    ResetCommandBuffer {
        cmd: u64,
        in_flight: bool,
    },
    BeginCommandBuffer(u64),
    EndCommandBuffer(u64),
    BeginRenderPass {
        framebuffer: u64,
        extent: vk::Extent2D,
        clear: [f32; 4],
    },
    EndRenderPass,
    BindPipeline(u64),
    SetViewport(f32, f32),
    SetScissor(vk::Extent2D),
    BindVertexBuffer(u64),
    Draw(u32),
    Submit {
        cmd: u64,
        wait: u64,
        signal: u64,
        fence: u64,
    },
    Present {
        image: u32,
        wait: u64,
    },
    WriteMemory {
        memory: u64,
        len: usize,
    },
    WaitIdle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FenceState {
    Signaled,
    Unsignaled,
    /// Submitted and not yet observed complete.
    Pending,
}

struct FakeState {
    next: u64,
    live: HashMap<u64, &'static str>,
    calls: Vec<Call>,
    invalid_destroys: usize,
    fences: HashMap<u64, FenceState>,
    in_flight: HashMap<u64, u64>,
    acquire_script: VecDeque<VkResult<(u32, bool)>>,
    present_script: VecDeque<VkResult<bool>>,
    image_count: u32,
    next_image: u32,
    memory: HashMap<u64, Vec<u8>>,
    support: SwapchainSupport,
    families: QueueFamilyIndices,
    /// Injected failures: call name, matching calls to let through first, result.
    failures: Vec<(&'static str, usize, vk::Result)>,
}

pub(crate) struct FakeDevice {
    state: RefCell<FakeState>,
}

pub(crate) fn default_support() -> SwapchainSupport {
    SwapchainSupport {
        capabilities: vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            current_extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            max_image_array_layers: 1,
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        },
        formats: vec![vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }],
        present_modes: vec![vk::PresentModeKHR::FIFO],
    }
}

impl FakeDevice {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: RefCell::new(FakeState {
                next: 0x1000,
                live: HashMap::new(),
                calls: Vec::new(),
                invalid_destroys: 0,
                fences: HashMap::new(),
                in_flight: HashMap::new(),
                acquire_script: VecDeque::new(),
                present_script: VecDeque::new(),
                image_count: 0,
                next_image: 0,
                memory: HashMap::new(),
                support: default_support(),
                families: QueueFamilyIndices {
                    graphics: 0,
                    present: 0,
                },
                failures: Vec::new(),
            }),
        })
    }

    fn state(&self) -> RefMut<'_, FakeState> {
        self.state.borrow_mut()
    }

    fn alloc(&self, kind: &'static str) -> u64 {
        let mut s = self.state();
        s.next += 1;
        let raw = s.next;
        s.live.insert(raw, kind);
        s.calls.push(Call::Create(kind, raw));
        raw
    }

    /// Checks for an injected failure on `call` and consumes it if due.
    fn injected(&self, call: &'static str) -> VkResult<()> {
        let mut s = self.state();
        let Some(i) = s.failures.iter().position(|(c, _, _)| *c == call) else {
            return Ok(());
        };
        if s.failures[i].1 == 0 {
            let (_, _, result) = s.failures.remove(i);
            return Err(result);
        }
        s.failures[i].1 -= 1;
        Ok(())
    }

    fn try_alloc(&self, kind: &'static str) -> VkResult<u64> {
        self.injected(kind)?;
        Ok(self.alloc(kind))
    }

    fn release(&self, kind: &'static str, raw: u64) {
        let mut s = self.state();
        if s.live.remove(&raw) != Some(kind) {
            s.invalid_destroys += 1;
        }
        s.calls.push(Call::Destroy(kind, raw));
    }

    fn record(&self, call: Call) {
        self.state().calls.push(call);
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    pub(crate) fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub(crate) fn destroyed(&self) -> Vec<(&'static str, u64)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Destroy(kind, raw) => Some((kind, raw)),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn live_count(&self) -> usize {
        self.state.borrow().live.len()
    }

    pub(crate) fn live_of(&self, kind: &str) -> usize {
        self.state.borrow().live.values().filter(|k| **k == kind).count()
    }

    pub(crate) fn invalid_destroys(&self) -> usize {
        self.state.borrow().invalid_destroys
    }

    pub(crate) fn memory(&self, memory: u64) -> Vec<u8> {
        self.state.borrow().memory.get(&memory).cloned().unwrap_or_default()
    }

    pub(crate) fn script_acquire(&self, result: VkResult<(u32, bool)>) {
        self.state().acquire_script.push_back(result);
    }

    pub(crate) fn script_present(&self, result: VkResult<bool>) {
        self.state().present_script.push_back(result);
    }

    pub(crate) fn edit_support(&self, edit: impl FnOnce(&mut SwapchainSupport)) {
        edit(&mut self.state().support);
    }

    /// Makes the next `call` fail with `result`. Object creation uses the
    /// object kind ("framebuffer", "fence", ...), command calls their
    /// trait method name.
    pub(crate) fn fail_next(&self, call: &'static str, result: vk::Result) {
        self.fail_nth(call, 0, result);
    }

    /// Lets `skip` matching calls through, then fails one.
    pub(crate) fn fail_nth(&self, call: &'static str, skip: usize, result: vk::Result) {
        self.state().failures.push((call, skip, result));
    }

    pub(crate) fn set_families(&self, families: QueueFamilyIndices) {
        self.state().families = families;
    }
}

impl GpuDevice for FakeDevice {
    fn queue_families(&self) -> QueueFamilyIndices {
        self.state.borrow().families
    }

    fn surface(&self) -> vk::SurfaceKHR {
        vk::SurfaceKHR::from_raw(1)
    }

    fn surface_support(&self) -> Result<SwapchainSupport> {
        Ok(self.state.borrow().support.clone())
    }

    unsafe fn create_swapchain(
        &self,
        info: &vk::SwapchainCreateInfoKHR<'_>,
    ) -> VkResult<vk::SwapchainKHR> {
        let raw = self.try_alloc("swapchain")?;
        let mut s = self.state();
        s.image_count = info.min_image_count;
        s.next_image = 0;
        s.calls.push(Call::CreateSwapchain {
            min_image_count: info.min_image_count,
            extent: info.image_extent,
            sharing: info.image_sharing_mode,
            present_mode: info.present_mode,
        });
        Ok(vk::SwapchainKHR::from_raw(raw))
    }

    unsafe fn swapchain_images(&self, _swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        let mut s = self.state();
        let count = s.image_count;
        let mut images = Vec::new();
        for _ in 0..count {
            s.next += 1;
            images.push(vk::Image::from_raw(s.next));
        }
        Ok(images)
    }

    unsafe fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        self.release("swapchain", swapchain.as_raw());
    }

    unsafe fn create_image_view(
        &self,
        _info: &vk::ImageViewCreateInfo<'_>,
    ) -> VkResult<vk::ImageView> {
        Ok(vk::ImageView::from_raw(self.try_alloc("image_view")?))
    }

    unsafe fn destroy_image_view(&self, view: vk::ImageView) {
        self.release("image_view", view.as_raw());
    }

    unsafe fn create_framebuffer(
        &self,
        _info: &vk::FramebufferCreateInfo<'_>,
    ) -> VkResult<vk::Framebuffer> {
        Ok(vk::Framebuffer::from_raw(self.try_alloc("framebuffer")?))
    }

    unsafe fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.release("framebuffer", framebuffer.as_raw());
    }

    unsafe fn create_render_pass(
        &self,
        _info: &vk::RenderPassCreateInfo<'_>,
    ) -> VkResult<vk::RenderPass> {
        Ok(vk::RenderPass::from_raw(self.alloc("render_pass")))
    }

    unsafe fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.release("render_pass", render_pass.as_raw());
    }

    unsafe fn create_shader_module(&self, code: &[u32]) -> VkResult<vk::ShaderModule> {
        if code.is_empty() {
            return Err(vk::Result::ERROR_INVALID_SHADER_NV);
        }
        Ok(vk::ShaderModule::from_raw(self.alloc("shader_module")))
    }

    unsafe fn destroy_shader_module(&self, module: vk::ShaderModule) {
        self.release("shader_module", module.as_raw());
    }

    unsafe fn create_pipeline_layout(
        &self,
        _info: &vk::PipelineLayoutCreateInfo<'_>,
    ) -> VkResult<vk::PipelineLayout> {
        Ok(vk::PipelineLayout::from_raw(self.alloc("pipeline_layout")))
    }

    unsafe fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        self.release("pipeline_layout", layout.as_raw());
    }

    unsafe fn create_graphics_pipeline(
        &self,
        info: &vk::GraphicsPipelineCreateInfo<'_>,
    ) -> VkResult<vk::Pipeline> {
        let dynamic_states = if info.p_dynamic_state.is_null() {
            0
        } else {
            unsafe { (*info.p_dynamic_state).dynamic_state_count }
        };
        self.record(Call::CreatePipeline {
            stages: info.stage_count,
            dynamic_states,
        });
        Ok(vk::Pipeline::from_raw(self.alloc("pipeline")))
    }

    unsafe fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        self.release("pipeline", pipeline.as_raw());
    }

    unsafe fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        Ok(vk::Semaphore::from_raw(self.try_alloc("semaphore")?))
    }

    unsafe fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.release("semaphore", semaphore.as_raw());
    }

    unsafe fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let raw = self.try_alloc("fence")?;
        let state = if signaled {
            FenceState::Signaled
        } else {
            FenceState::Unsignaled
        };
        self.state().fences.insert(raw, state);
        Ok(vk::Fence::from_raw(raw))
    }

    unsafe fn destroy_fence(&self, fence: vk::Fence) {
        self.state().fences.remove(&fence.as_raw());
        self.release("fence", fence.as_raw());
    }

    unsafe fn wait_for_fence(&self, fence: vk::Fence) -> VkResult<()> {
        let raw = fence.as_raw();
        let mut s = self.state();
        s.calls.push(Call::WaitFence(raw));
        match s.fences.get(&raw).copied() {
            Some(FenceState::Signaled) => Ok(()),
            Some(FenceState::Pending) => {
                s.fences.insert(raw, FenceState::Signaled);
                s.in_flight.retain(|_, f| *f != raw);
                Ok(())
            }
            // Nothing will ever signal it: a real device would hang here.
            Some(FenceState::Unsignaled) => Err(vk::Result::TIMEOUT),
            None => Err(vk::Result::ERROR_UNKNOWN),
        }
    }

    unsafe fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        let raw = fence.as_raw();
        let mut s = self.state();
        s.calls.push(Call::ResetFence(raw));
        if s.fences.get(&raw) == Some(&FenceState::Pending) {
            return Err(vk::Result::ERROR_UNKNOWN);
        }
        s.fences.insert(raw, FenceState::Unsignaled);
        Ok(())
    }

    unsafe fn create_host_buffer(
        &self,
        size: vk::DeviceSize,
        _usage: vk::BufferUsageFlags,
    ) -> Result<(vk::Buffer, vk::DeviceMemory)> {
        let buffer = self.alloc("buffer");
        let memory = self.alloc("memory");
        self.state().memory.insert(memory, vec![0; size as usize]);
        Ok((vk::Buffer::from_raw(buffer), vk::DeviceMemory::from_raw(memory)))
    }

    unsafe fn destroy_buffer(&self, buffer: vk::Buffer) {
        self.release("buffer", buffer.as_raw());
    }

    unsafe fn free_memory(&self, memory: vk::DeviceMemory) {
        self.state().memory.remove(&memory.as_raw());
        self.release("memory", memory.as_raw());
    }

    unsafe fn write_host_memory(&self, memory: vk::DeviceMemory, bytes: &[u8]) -> Result<()> {
        let raw = memory.as_raw();
        let mut s = self.state();
        s.calls.push(Call::WriteMemory {
            memory: raw,
            len: bytes.len(),
        });
        let target = s
            .memory
            .get_mut(&raw)
            .ok_or_else(|| anyhow!("write to unknown memory {raw:#x}"))?;
        ensure!(bytes.len() <= target.len(), "write past end of allocation");
        target[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    unsafe fn allocate_command_buffers(&self, count: u32) -> VkResult<Vec<vk::CommandBuffer>> {
        Ok((0..count)
            .map(|_| vk::CommandBuffer::from_raw(self.alloc("command_buffer")))
            .collect())
    }

    unsafe fn free_command_buffers(&self, buffers: &[vk::CommandBuffer]) {
        for cmd in buffers {
            self.release("command_buffer", cmd.as_raw());
        }
    }

    unsafe fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        let raw = cmd.as_raw();
        let mut s = self.state();
        let in_flight = s.in_flight.contains_key(&raw);
        s.calls.push(Call::ResetCommandBuffer { cmd: raw, in_flight });
        Ok(())
    }

    unsafe fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        self.record(Call::BeginCommandBuffer(cmd.as_raw()));
        self.injected("begin_command_buffer")
    }

    unsafe fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        self.record(Call::EndCommandBuffer(cmd.as_raw()));
        self.injected("end_command_buffer")
    }

    unsafe fn cmd_begin_render_pass(
        &self,
        _cmd: vk::CommandBuffer,
        info: &vk::RenderPassBeginInfo<'_>,
    ) {
        let clear = if info.clear_value_count == 0 {
            [0.0; 4]
        } else {
            unsafe { (*info.p_clear_values).color.float32 }
        };
        self.record(Call::BeginRenderPass {
            framebuffer: info.framebuffer.as_raw(),
            extent: info.render_area.extent,
            clear,
        });
    }

    unsafe fn cmd_end_render_pass(&self, _cmd: vk::CommandBuffer) {
        self.record(Call::EndRenderPass);
    }

    unsafe fn cmd_bind_pipeline(&self, _cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
        self.record(Call::BindPipeline(pipeline.as_raw()));
    }

    unsafe fn cmd_set_viewport(&self, _cmd: vk::CommandBuffer, viewport: vk::Viewport) {
        self.record(Call::SetViewport(viewport.width, viewport.height));
    }

    unsafe fn cmd_set_scissor(&self, _cmd: vk::CommandBuffer, scissor: vk::Rect2D) {
        self.record(Call::SetScissor(scissor.extent));
    }

    unsafe fn cmd_bind_vertex_buffer(&self, _cmd: vk::CommandBuffer, buffer: vk::Buffer) {
        self.record(Call::BindVertexBuffer(buffer.as_raw()));
    }

    unsafe fn cmd_draw(&self, _cmd: vk::CommandBuffer, vertex_count: u32) {
        self.record(Call::Draw(vertex_count));
    }

    unsafe fn acquire_next_image(
        &self,
        _swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        let mut s = self.state();
        s.calls.push(Call::Acquire {
            semaphore: signal.as_raw(),
        });
        if let Some(scripted) = s.acquire_script.pop_front() {
            return scripted;
        }
        let image = s.next_image % s.image_count.max(1);
        s.next_image += 1;
        Ok((image, false))
    }

    unsafe fn queue_submit(
        &self,
        cmd: vk::CommandBuffer,
        wait: vk::Semaphore,
        _wait_stage: vk::PipelineStageFlags,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> VkResult<()> {
        self.injected("queue_submit")?;
        let mut s = self.state();
        s.calls.push(Call::Submit {
            cmd: cmd.as_raw(),
            wait: wait.as_raw(),
            signal: signal.as_raw(),
            fence: fence.as_raw(),
        });
        if s.fences.get(&fence.as_raw()) != Some(&FenceState::Unsignaled) {
            return Err(vk::Result::ERROR_UNKNOWN);
        }
        s.fences.insert(fence.as_raw(), FenceState::Pending);
        s.in_flight.insert(cmd.as_raw(), fence.as_raw());
        Ok(())
    }

    unsafe fn queue_present(
        &self,
        _swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<bool> {
        let mut s = self.state();
        s.calls.push(Call::Present {
            image: image_index,
            wait: wait.as_raw(),
        });
        s.present_script.pop_front().unwrap_or(Ok(false))
    }

    unsafe fn device_wait_idle(&self) -> VkResult<()> {
        let mut s = self.state();
        s.calls.push(Call::WaitIdle);
        for state in s.fences.values_mut() {
            if *state == FenceState::Pending {
                *state = FenceState::Signaled;
            }
        }
        s.in_flight.clear();
        Ok(())
    }
}

/// Scripted window: reports sizes in order, advancing one per wait.
pub(crate) struct FakeWindow {
    sizes: VecDeque<RenderSize>,
    pub waits: usize,
    pub closing: bool,
}

impl FakeWindow {
    pub(crate) fn new(size: RenderSize) -> Self {
        Self::with_sizes([size])
    }

    pub(crate) fn with_sizes(sizes: impl IntoIterator<Item = RenderSize>) -> Self {
        Self {
            sizes: sizes.into_iter().collect(),
            waits: 0,
            closing: false,
        }
    }
}

impl WindowSurface for FakeWindow {
    fn framebuffer_size(&self) -> RenderSize {
        self.sizes.front().copied().unwrap_or_default()
    }

    fn wait_events(&mut self) {
        self.waits += 1;
        if self.sizes.len() > 1 {
            self.sizes.pop_front();
        }
    }

    fn should_close(&self) -> bool {
        self.closing
    }
}

/// Smallest blob `read_spv` accepts: the magic word plus one more.
pub(crate) fn write_spirv(path: &Path) {
    let mut bytes = 0x0723_0203u32.to_le_bytes().to_vec();
    bytes.extend_from_slice(&0x0001_0000u32.to_le_bytes());
    std::fs::write(path, bytes).unwrap();
}

pub(crate) fn shader_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for name in [TRIANGLE_VERT, TRIANGLE_FRAG, UI_VERT, UI_FRAG] {
        write_spirv(&dir.path().join(name));
    }
    dir
}
