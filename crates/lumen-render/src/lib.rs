// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use crossbeam_channel::{Receiver, Sender};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::path::PathBuf;

pub mod ui;

pub use ui::{BatchError, BatchWriter, UiVertex, VertexBatch};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Minimized windows report a zero-sized framebuffer.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Pushed by the window layer whenever the framebuffer changes size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResizeEvent {
    pub size: RenderSize,
}

pub fn resize_channel() -> (Sender<ResizeEvent>, Receiver<ResizeEvent>) {
    crossbeam_channel::unbounded()
}

/// What a renderer needs from the window while it rebuilds presentation
/// resources.
pub trait WindowSurface {
    fn framebuffer_size(&self) -> RenderSize;
    /// Blocks until at least one window event arrives.
    fn wait_events(&mut self);
    fn should_close(&self) -> bool;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PresentPreference {
    /// Mailbox when the surface offers it, FIFO otherwise.
    #[default]
    Mailbox,
    Fifo,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UiSettings {
    pub max_vertices: usize,
}

impl Default for UiSettings {
    fn default() -> Self {
        Self { max_vertices: 1000 }
    }
}

#[derive(Clone, Debug)]
pub struct RenderSettings {
    pub clear_color: [f32; 4],
    pub present: PresentPreference,
    pub validation: bool,
    /// Directory holding `triangle.{vert,frag}.spv` and `ui.{vert,frag}.spv`.
    pub shader_dir: PathBuf,
    /// `None` disables the overlay entirely.
    pub ui: Option<UiSettings>,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            present: PresentPreference::Mailbox,
            validation: cfg!(debug_assertions),
            shader_dir: PathBuf::from("shaders"),
            ui: Some(UiSettings::default()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StaleReason {
    OutOfDate,
    Suboptimal,
    Resized,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented,
    /// Presented, but the swapchain was rebuilt afterwards.
    PresentedStale(StaleReason),
    /// Nothing was submitted; the swapchain was rebuilt instead.
    Dropped(StaleReason),
}

impl FrameOutcome {
    pub fn presented(&self) -> bool {
        !matches!(self, FrameOutcome::Dropped(_))
    }
}

pub trait Renderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        resize_events: Receiver<ResizeEvent>,
        settings: &RenderSettings,
    ) -> Result<Self>
    where
        Self: Sized;

    fn draw_frame(&mut self, window: &mut dyn WindowSurface) -> Result<FrameOutcome>;
    /// The immediate-mode UI batch, if the overlay is enabled.
    fn overlay(&mut self) -> Option<BatchWriter<'_>> {
        None
    }
    fn set_clear_color(&mut self, rgba: [f32; 4]);
    fn wait_idle(&self) -> Result<()>;
}
