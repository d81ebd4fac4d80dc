// SPDX-License-Identifier: CEPL-1.0
use std::mem::size_of;
use std::path::Path;
use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use ash::vk;
use lumen_render::{BatchError, BatchWriter, UiVertex, VertexBatch};
use tracing::info;

use crate::device::GpuDevice;
use crate::frame::MAX_FRAMES_IN_FLIGHT;
use crate::handle::Owned;
use crate::pipeline::{PipelineBuilder, PipelineDescriptor};

struct HostBuffer<D: GpuDevice> {
    buffer: Owned<D, vk::Buffer>,
    memory: Owned<D, vk::DeviceMemory>,
}

/// GPU side of the immediate-mode overlay.
///
/// Each frame slot gets its own fixed-size vertex buffer, so uploading for
/// one frame never touches memory the other frame may still be reading.
pub struct UiOverlay<D: GpuDevice> {
    buffers: Vec<HostBuffer<D>>,
    pipeline: Owned<D, vk::Pipeline>,
    _layout: Owned<D, vk::PipelineLayout>,
    batch: VertexBatch,
    /// Vertices each buffer in `buffers` holds.
    max_vertices: usize,
    device: Arc<D>,
}

impl<D: GpuDevice> UiOverlay<D> {
    pub fn new(
        device: Arc<D>,
        builder: &PipelineBuilder<D>,
        render_pass: vk::RenderPass,
        shader_dir: &Path,
        max_vertices: usize,
    ) -> Result<Self> {
        ensure!(max_vertices > 0, "ui overlay needs room for at least one vertex");

        let layout = builder.create_layout()?;
        let pipeline = builder.create_pipeline(&PipelineDescriptor::ui_overlay(
            shader_dir,
            layout.raw(),
            render_pass,
        ))?;

        let size = (max_vertices * size_of::<UiVertex>()) as vk::DeviceSize;
        let mut buffers = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for slot in 0..MAX_FRAMES_IN_FLIGHT {
            let (buffer, memory) =
                unsafe { device.create_host_buffer(size, vk::BufferUsageFlags::VERTEX_BUFFER) }
                    .with_context(|| format!("ui vertex buffer for slot {slot}"))?;
            buffers.push(HostBuffer {
                buffer: Owned::new(Arc::clone(&device), buffer),
                memory: Owned::new(Arc::clone(&device), memory),
            });
        }
        info!(
            "ui overlay ready: {} vertices x {} buffers",
            max_vertices, MAX_FRAMES_IN_FLIGHT
        );

        Ok(Self {
            buffers,
            pipeline,
            _layout: layout,
            batch: VertexBatch::with_capacity(max_vertices),
            max_vertices,
            device,
        })
    }

    pub fn batch(&self) -> &VertexBatch {
        &self.batch
    }

    pub fn writer(&mut self) -> BatchWriter<'_> {
        BatchWriter::new(&mut self.batch)
    }

    /// Uploads the batch into `slot`'s buffer and draws it. An empty batch
    /// records nothing.
    pub fn render(&self, cmd: vk::CommandBuffer, slot: usize) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        // Bounded by the GPU allocation, not by whatever the batch claims.
        if self.batch.len() > self.max_vertices {
            return Err(BatchError::CapacityExceeded {
                requested: self.batch.len(),
                capacity: self.max_vertices,
            }
            .into());
        }
        let target = self
            .buffers
            .get(slot)
            .with_context(|| format!("no ui buffer for frame slot {slot}"))?;

        unsafe {
            self.device
                .write_host_memory(target.memory.raw(), self.batch.as_bytes())
                .context("upload ui vertices")?;
            self.device.cmd_bind_pipeline(cmd, self.pipeline.raw());
            self.device.cmd_bind_vertex_buffer(cmd, target.buffer.raw());
            self.device.cmd_draw(cmd, self.batch.len() as u32);
        }
        Ok(())
    }
}
