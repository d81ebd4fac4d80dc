// SPDX-License-Identifier: CEPL-1.0
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use lumen_platform::WindowConfig;
use lumen_render::{PresentPreference, RenderSettings, UiSettings};
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Deserialize, Default, Clone)]
pub struct AppCfg {
    #[serde(default)]
    pub window: WindowCfg,
    #[serde(default)]
    pub render: RenderCfg,
    #[serde(default)]
    pub ui: UiCfg,
    #[serde(default)]
    pub shaders: ShaderCfg,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WindowCfg {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct RenderCfg {
    #[serde(default = "default_clear")]
    pub clear_color: [f32; 4],
    #[serde(default)]
    pub present_mode: PresentMode,
    /// Unset means "on in debug builds".
    #[serde(default)]
    pub validation: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PresentMode {
    #[default]
    Mailbox,
    Fifo,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct UiCfg {
    #[serde(default = "default_ui_enabled")]
    pub enabled: bool,
    #[serde(default = "default_max_vertices")]
    pub max_vertices: usize,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ShaderCfg {
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            title: default_title(),
            width: default_width(),
            height: default_height(),
        }
    }
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            clear_color: default_clear(),
            present_mode: PresentMode::Mailbox,
            validation: None,
        }
    }
}

impl Default for UiCfg {
    fn default() -> Self {
        UiCfg {
            enabled: default_ui_enabled(),
            max_vertices: default_max_vertices(),
        }
    }
}

fn default_title() -> String {
    "lumen".into()
}
fn default_width() -> u32 {
    1280
}
fn default_height() -> u32 {
    720
}
fn default_clear() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}
fn default_ui_enabled() -> bool {
    true
}
fn default_max_vertices() -> usize {
    1000
}

impl From<PresentMode> for PresentPreference {
    fn from(mode: PresentMode) -> Self {
        match mode {
            PresentMode::Mailbox => PresentPreference::Mailbox,
            PresentMode::Fifo => PresentPreference::Fifo,
        }
    }
}

impl AppCfg {
    pub fn window_config(&self) -> WindowConfig {
        WindowConfig {
            title: self.window.title.clone(),
            width: self.window.width,
            height: self.window.height,
        }
    }

    pub fn render_settings(&self) -> RenderSettings {
        RenderSettings {
            clear_color: self.render.clear_color,
            present: self.render.present_mode.into(),
            validation: self.render.validation.unwrap_or(cfg!(debug_assertions)),
            shader_dir: self
                .shaders
                .dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(lumen_render_vk::DEFAULT_SHADER_DIR)),
            ui: self.ui.enabled.then_some(UiSettings {
                max_vertices: self.ui.max_vertices,
            }),
        }
    }
}

/// Reads `path`; anything short of a valid file falls back to defaults.
pub fn load_cfg(path: &Path) -> AppCfg {
    let bytes = match lumen_core::read_file(path) {
        Ok(bytes) => bytes,
        Err(e) if e.source.kind() == ErrorKind::NotFound => {
            info!("no config at {}, using defaults", path.display());
            return AppCfg::default();
        }
        Err(e) => {
            warn!("{e}; using defaults");
            return AppCfg::default();
        }
    };
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            warn!("{} is not UTF-8 ({e}); using defaults", path.display());
            return AppCfg::default();
        }
    };
    match toml::from_str::<AppCfg>(&text) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("bad config {}: {e}; using defaults", path.display());
            AppCfg::default()
        }
    }
}
