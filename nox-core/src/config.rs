//! Runtime configuration (`nox.toml`).
//!
//! Every field has a default, so an empty file (or no file at all) is valid.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Initial window title (default: "Nox Window")
    #[serde(default = "default_title")]
    pub title: String,
    /// Screen surface width in pixels (default: 1280)
    #[serde(default = "default_width")]
    pub width: u32,
    /// Screen surface height in pixels (default: 720)
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default)]
    pub fullscreen: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Open an output device. When false the mixer is driven by the frame loop.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Mixing rate when no device is open (default: 44100)
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Initial global gain (default: 1.0, range: 0.0-1.0)
    #[serde(default = "default_volume")]
    pub master_volume: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Frame loop rate (default: 60)
    #[serde(default = "default_fps")]
    pub target_fps: u32,
}

fn default_title() -> String {
    "Nox Window".to_string()
}
fn default_width() -> u32 {
    1280
}
fn default_height() -> u32 {
    720
}

fn default_true() -> bool {
    true
}
fn default_sample_rate() -> u32 {
    44100
}
fn default_volume() -> f32 {
    1.0
}

fn default_fps() -> u32 {
    60
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            width: default_width(),
            height: default_height(),
            fullscreen: false,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            sample_rate: default_sample_rate(),
            master_volume: default_volume(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            target_fps: default_fps(),
        }
    }
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Configuration for tests and tools: no audio device, a small screen.
    pub fn headless() -> Self {
        let mut config = Self::default();
        config.audio.enabled = false;
        config.window.width = 320;
        config.window.height = 240;
        config
    }
}
