// SPDX-License-Identifier: CEPL-1.0
use bytemuck::{Pod, Zeroable};
use glam::Vec2;

pub const BOX_COLOR: [f32; 3] = [0.0, 1.0, 0.0];

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct UiVertex {
    pub position: [f32; 2],
    pub color: [f32; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BatchError {
    #[error("ui batch full: {requested} vertices requested, capacity is {capacity}")]
    CapacityExceeded { requested: usize, capacity: usize },
}

/// Immediate-mode vertex list, cleared and refilled every frame.
///
/// Capacity matches the GPU buffer it is uploaded into; a draw call that
/// would overflow it is rejected whole.
#[derive(Debug, Clone)]
pub struct VertexBatch {
    vertices: Vec<UiVertex>,
    capacity: usize,
}

impl VertexBatch {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
    }

    /// Axis-aligned box in normalized device coordinates, as two triangles.
    pub fn draw_box(&mut self, origin: Vec2, size: Vec2) -> Result<(), BatchError> {
        let min = origin;
        let max = origin + size;
        let corners = [
            Vec2::new(min.x, min.y),
            Vec2::new(max.x, min.y),
            Vec2::new(max.x, max.y),
            Vec2::new(max.x, max.y),
            Vec2::new(min.x, max.y),
            Vec2::new(min.x, min.y),
        ];
        self.push(&corners.map(|p| UiVertex {
            position: p.to_array(),
            color: BOX_COLOR,
        }))
    }

    pub fn push(&mut self, vertices: &[UiVertex]) -> Result<(), BatchError> {
        let requested = self.vertices.len() + vertices.len();
        if requested > self.capacity {
            return Err(BatchError::CapacityExceeded {
                requested,
                capacity: self.capacity,
            });
        }
        self.vertices.extend_from_slice(vertices);
        Ok(())
    }

    pub fn vertices(&self) -> &[UiVertex] {
        &self.vertices
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Draw access to a batch owned elsewhere.
///
/// The owner sized the batch to match a GPU buffer, so the batch itself can
/// be filled and cleared through this handle but never replaced.
pub struct BatchWriter<'a> {
    batch: &'a mut VertexBatch,
}

impl<'a> BatchWriter<'a> {
    pub fn new(batch: &'a mut VertexBatch) -> Self {
        Self { batch }
    }

    pub fn clear(&mut self) {
        self.batch.clear();
    }

    pub fn draw_box(&mut self, origin: Vec2, size: Vec2) -> Result<(), BatchError> {
        self.batch.draw_box(origin, size)
    }

    pub fn push(&mut self, vertices: &[UiVertex]) -> Result<(), BatchError> {
        self.batch.push(vertices)
    }

    pub fn vertices(&self) -> &[UiVertex] {
        self.batch.vertices()
    }

    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.batch.capacity()
    }
}
