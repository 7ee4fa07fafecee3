// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// This module handles loading and parsing configuration from config.toml.
// Provides sensible defaults if config file is missing or has errors.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub camera: CameraConfig,
    pub shaders: ShaderConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Ray Tracing Triangle".to_string(),
            width: 1200,
            height: 720,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: String,
    /// Budget for swapchain acquire and fence waits, in milliseconds.
    /// A stalled driver fails the frame instead of blocking forever.
    pub frame_timeout_ms: u64,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "fifo".to_string(),
            frame_timeout_ms: 5000,
        }
    }
}

/// Camera settings for the ray-tracing demo
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub near: f32,
    pub far: f32,
    pub fov_degrees: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            near: 1.0,
            far: 100.0,
            fov_degrees: 65.0,
        }
    }
}

/// Shader locations, shared by the renderer and the watcher
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    pub dir: String,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            dir: "shaders".to_string(),
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_to_file: bool,
    pub log_file: String,
    pub show_fps: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            log_to_file: false,
            log_file: "vulkan_debug.log".to_string(),
            show_fps: true,
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("config.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load config.toml: {}. Using defaults.", e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Get present mode as Vulkan enum
    pub fn get_present_mode(&self) -> ash::vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => ash::vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => ash::vk::PresentModeKHR::MAILBOX,
            "fifo" => ash::vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => ash::vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to FIFO",
                    self.graphics.present_mode
                );
                ash::vk::PresentModeKHR::FIFO
            }
        }
    }

    /// Frame wait budget in nanoseconds, as Vulkan timeouts expect
    pub fn frame_timeout_ns(&self) -> u64 {
        self.graphics.frame_timeout_ms.saturating_mul(1_000_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_file_missing() {
        let config = Config::load_from_path("does/not/exist.toml").unwrap();
        assert_eq!(config.window.width, 1200);
        assert_eq!(config.camera.far, 100.0);
        assert_eq!(config.shaders.dir, "shaders");
    }

    #[test]
    fn parses_partial_config() {
        let config: Config = toml::from_str(
            r#"
            [graphics]
            present_mode = "mailbox"
            frame_timeout_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.get_present_mode(), ash::vk::PresentModeKHR::MAILBOX);
        assert_eq!(config.frame_timeout_ns(), 250_000_000);
        // untouched sections keep their defaults
        assert_eq!(config.window.height, 720);
    }

    #[test]
    fn unknown_present_mode_falls_back_to_fifo() {
        let config: Config = toml::from_str(
            r#"
            [graphics]
            present_mode = "warp-speed"
            "#,
        )
        .unwrap();
        assert_eq!(config.get_present_mode(), ash::vk::PresentModeKHR::FIFO);
    }
}
