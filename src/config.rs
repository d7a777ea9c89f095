//! Configuration parsing and management for vrm-viewer

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, ViewerError};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: ModelConfig,
    pub window: WindowConfig,
    pub camera: CameraConfig,
    pub lights: LightsConfig,
    pub controls: ControlsConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ViewerError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::ReadFile(format!("{}: {}", path.as_ref().display(), e))
        })?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, ViewerError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()).into())
    }

    /// Load configuration from default paths
    pub fn load() -> Result<Self, ViewerError> {
        let paths = [
            PathBuf::from("vrm-viewer.toml"),
            PathBuf::from("config/default.toml"),
            dirs_path().join("config.toml"),
        ];

        for path in &paths {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ViewerError> {
        if self.model.path.as_os_str().is_empty() {
            return Err(invalid("model.path", "Model path must not be empty"));
        }

        if self.window.width == 0 || self.window.height == 0 {
            return Err(invalid(
                "window.width/window.height",
                "Window size must be greater than 0",
            ));
        }

        if !(self.camera.fov_deg > 0.0 && self.camera.fov_deg < 180.0) {
            return Err(invalid(
                "camera.fov_deg",
                "Field of view must be between 0 and 180 degrees",
            ));
        }

        if self.camera.near <= 0.0 {
            return Err(invalid("camera.near", "Near plane must be greater than 0"));
        }

        if self.camera.far <= self.camera.near {
            return Err(invalid(
                "camera.far",
                "Far plane must be greater than the near plane",
            ));
        }

        if self.controls.enable_damping
            && !(self.controls.damping_factor > 0.0 && self.controls.damping_factor <= 1.0)
        {
            return Err(invalid(
                "controls.damping_factor",
                "Damping factor must be in (0.0, 1.0]",
            ));
        }

        if self.controls.min_distance < 0.0
            || self.controls.min_distance > self.controls.max_distance
        {
            return Err(invalid(
                "controls.min_distance",
                "Distance limits must satisfy 0 <= min_distance <= max_distance",
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> ViewerError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
    .into()
}

/// Which recentering rule the normalizer applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecenterMode {
    /// Scale about the box center so it lands on the origin
    #[default]
    Origin,
    /// `position += position - center` with an absolute scale; only centers
    /// models whose root starts at the origin
    Legacy,
}

/// Model source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Path to the .vrm / .glb file
    pub path: PathBuf,
    /// Recentering rule used by the normalizer
    pub recenter: RecenterMode,
    /// Play the first animation clip after loading
    pub autoplay: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("model/aili.vrm"),
            recenter: RecenterMode::Origin,
            autoplay: true,
        }
    }
}

/// Native window configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    /// Clear the viewport with a transparent background
    pub transparent: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "vrm-viewer".to_string(),
            width: 1280,
            height: 720,
            transparent: true,
        }
    }
}

/// Perspective camera configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Vertical field of view in degrees
    pub fov_deg: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_deg: 75.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

/// Ambient + directional light configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LightsConfig {
    /// RGB, 0.0 - 1.0
    pub ambient_color: [f32; 3],
    pub ambient_intensity: f32,
    pub directional_color: [f32; 3],
    pub directional_intensity: f32,
    /// Light position; normalized when the light is created
    pub directional_position: [f32; 3],
}

impl Default for LightsConfig {
    fn default() -> Self {
        Self {
            ambient_color: [1.0, 1.0, 1.0],
            ambient_intensity: 0.5,
            directional_color: [1.0, 1.0, 1.0],
            directional_intensity: 1.0,
            directional_position: [0.0, 1.0, 1.0],
        }
    }
}

/// Orbit controls configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    /// Radians per pixel of drag
    pub rotate_speed: f32,
    /// Dolly factor per scroll step
    pub zoom_speed: f32,
    /// Scene units per pixel, scaled by distance
    pub pan_speed: f32,
    pub enable_damping: bool,
    /// Fraction of the remaining motion applied per update
    pub damping_factor: f32,
    pub min_distance: f32,
    pub max_distance: f32,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            rotate_speed: 0.005,
            zoom_speed: 0.95,
            pan_speed: 0.002,
            enable_damping: false,
            damping_factor: 0.05,
            min_distance: 0.0,
            max_distance: f32::MAX,
        }
    }
}

/// Get the platform-specific configuration directory
fn dirs_path() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        if let Some(config_dir) = std::env::var_os("XDG_CONFIG_HOME") {
            return PathBuf::from(config_dir).join("vrm-viewer");
        }
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(".config/vrm-viewer");
        }
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join("Library/Application Support/vrm-viewer");
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("vrm-viewer");
        }
    }

    PathBuf::from(".")
}
