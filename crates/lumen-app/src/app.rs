// SPDX-License-Identifier: CEPL-1.0
use std::time::Instant;

use anyhow::Result;
use glam::Vec2;
use lumen_platform::Window;
use lumen_render::{BatchWriter, Renderer};
use lumen_render_vk::VkRenderer;
use tracing::info;

use crate::config::AppCfg;

pub struct Application {
    // Renderer goes first so the surface dies before the window.
    renderer: VkRenderer,
    window: Window,
    frames: u32,
    last_fps_instant: Instant,
}

impl Application {
    pub fn new(cfg: &AppCfg) -> Result<Self> {
        let mut window = Window::new(cfg.window_config())?;
        let resize_events = window.subscribe_resize();
        let settings = cfg.render_settings();
        info!(
            "present = {:?}, validation = {}, ui = {}",
            settings.present,
            settings.validation,
            settings.ui.is_some()
        );

        let renderer = <VkRenderer as Renderer>::new(
            &window,
            &window,
            window.framebuffer_size(),
            resize_events,
            &settings,
        )?;

        Ok(Self {
            renderer,
            window,
            frames: 0,
            last_fps_instant: Instant::now(),
        })
    }

    pub fn run(&mut self) -> Result<()> {
        loop {
            self.window.poll_events();
            if self.window.should_close() {
                break;
            }

            if let Some(mut batch) = self.renderer.overlay() {
                build_ui(&mut batch)?;
            }

            let outcome = self.renderer.draw_frame(&mut self.window)?;
            if outcome.presented() {
                self.frames = self.frames.saturating_add(1);
            }

            let now = Instant::now();
            if now.duration_since(self.last_fps_instant).as_secs_f32() >= 1.0 {
                info!("fps ~ {}", self.frames);
                self.frames = 0;
                self.last_fps_instant = now;
            }
        }
        self.renderer.wait_idle()
    }
}

/// Immediate mode: the batch is rebuilt from scratch every frame.
fn build_ui(batch: &mut BatchWriter<'_>) -> Result<()> {
    batch.clear();
    batch.draw_box(Vec2::new(-0.95, -0.95), Vec2::new(0.5, 0.15))?;
    batch.draw_box(Vec2::new(-0.95, -0.75), Vec2::new(0.3, 0.15))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_render::VertexBatch;

    #[test]
    fn ui_is_rebuilt_not_accumulated() {
        let mut batch = VertexBatch::with_capacity(64);
        let mut writer = BatchWriter::new(&mut batch);
        build_ui(&mut writer).unwrap();
        build_ui(&mut writer).unwrap();
        assert_eq!(writer.len(), 12);
    }

    #[test]
    fn ui_overflow_is_an_error() {
        let mut batch = VertexBatch::with_capacity(6);
        assert!(build_ui(&mut BatchWriter::new(&mut batch)).is_err());
    }
}
