// SPDX-License-Identifier: CEPL-1.0
//! winit window driven cooperatively from the caller's loop.

use std::time::Duration;

use anyhow::{bail, Result};
use crossbeam_channel::{Receiver, Sender};
use lumen_render::{resize_channel, RenderSize, ResizeEvent, WindowSurface};
use tracing::{debug, info};

pub use winit;

use winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    error::OsError,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{Key, NamedKey},
    platform::pump_events::{EventLoopExtPumpEvents, PumpStatus},
    raw_window_handle::{
        DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle,
    },
    window::WindowId,
};

#[derive(Clone, Debug)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "lumen".into(),
            width: 1280,
            height: 720,
        }
    }
}

struct Handler {
    config: WindowConfig,
    window: Option<winit::window::Window>,
    create_error: Option<OsError>,
    close_requested: bool,
    resize_subscribers: Vec<Sender<ResizeEvent>>,
}

impl Handler {
    fn new(config: WindowConfig) -> Self {
        Self {
            config,
            window: None,
            create_error: None,
            close_requested: false,
            resize_subscribers: Vec::new(),
        }
    }

    fn on_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.close_requested = true;
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key: Key::Named(NamedKey::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                info!("Escape pressed");
                self.close_requested = true;
            }
            WindowEvent::Resized(size) => {
                debug!("Resized → {}x{}", size.width, size.height);
                let event = ResizeEvent {
                    size: RenderSize::new(size.width, size.height),
                };
                // Receivers that went away are forgotten.
                self.resize_subscribers
                    .retain(|tx| tx.send(event).is_ok());
            }
            _ => {}
        }
    }
}

impl ApplicationHandler for Handler {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let attrs = winit::window::Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(LogicalSize::new(self.config.width, self.config.height));
        match event_loop.create_window(attrs) {
            Ok(window) => self.window = Some(window),
            Err(e) => self.create_error = Some(e),
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        self.on_event(&event);
    }
}

/// An OS window plus the event loop that feeds it.
pub struct Window {
    // Drop the window before its event loop.
    window: winit::window::Window,
    handler: Handler,
    event_loop: EventLoop<()>,
}

impl Window {
    pub fn new(config: WindowConfig) -> Result<Self> {
        let mut event_loop = EventLoop::new()?;
        let mut handler = Handler::new(config);

        let window = loop {
            if let Some(window) = handler.window.take() {
                break window;
            }
            if let Some(e) = handler.create_error.take() {
                return Err(e.into());
            }
            if let PumpStatus::Exit(code) =
                event_loop.pump_app_events(Some(Duration::ZERO), &mut handler)
            {
                bail!("event loop exited before the window opened (code {code})");
            }
        };

        let size = window.inner_size();
        info!(
            "window \"{}\" open at {}x{}",
            handler.config.title, size.width, size.height
        );
        Ok(Self {
            window,
            handler,
            event_loop,
        })
    }

    /// Drains pending events without blocking.
    pub fn poll_events(&mut self) {
        self.pump(Some(Duration::ZERO));
    }

    pub fn should_close(&self) -> bool {
        self.handler.close_requested
    }

    pub fn framebuffer_size(&self) -> RenderSize {
        let size = self.window.inner_size();
        RenderSize::new(size.width, size.height)
    }

    /// Every call returns a new receiver that sees all later resizes.
    pub fn subscribe_resize(&mut self) -> Receiver<ResizeEvent> {
        let (tx, rx) = resize_channel();
        self.handler.resize_subscribers.push(tx);
        rx
    }

    fn pump(&mut self, timeout: Option<Duration>) {
        if let PumpStatus::Exit(code) = self.event_loop.pump_app_events(timeout, &mut self.handler)
        {
            debug!("event loop exit ({code})");
            self.handler.close_requested = true;
        }
    }
}

impl WindowSurface for Window {
    fn framebuffer_size(&self) -> RenderSize {
        Window::framebuffer_size(self)
    }

    fn wait_events(&mut self) {
        self.pump(None);
    }

    fn should_close(&self) -> bool {
        Window::should_close(self)
    }
}

impl HasWindowHandle for Window {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        self.window.window_handle()
    }
}

impl HasDisplayHandle for Window {
    fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
        self.window.display_handle()
    }
}
