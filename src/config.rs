//! Recorder configuration
//!
//! Construction parameters fixed for the recorder's lifetime.

use crate::encoder::EncoderSettings;
use crate::utils::error::{CamcorderError, CamcorderResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for a camera recorder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderConfig {
    /// Camera device ID
    pub camera_id: String,

    /// Target width in pixels
    pub width: u32,

    /// Target height in pixels
    pub height: u32,

    /// Target frame rate; zero leaves it unconstrained
    #[serde(default)]
    pub fps: u32,

    /// Shortest take that will be written
    #[serde(default = "default_min_duration_ms")]
    pub min_duration_ms: u64,

    /// Catalog category for saved takes
    #[serde(default = "default_relative_path")]
    pub relative_path: String,

    #[serde(default = "default_file_extension")]
    pub file_extension: String,

    #[serde(default = "default_mime_type")]
    pub mime_type: String,
}

fn default_min_duration_ms() -> u64 {
    1000
}

fn default_relative_path() -> String {
    "Movies/Camcorder".to_string()
}

fn default_file_extension() -> String {
    "mp4".to_string()
}

fn default_mime_type() -> String {
    "video/mp4".to_string()
}

impl RecorderConfig {
    pub fn new(camera_id: &str, width: u32, height: u32, fps: u32) -> Self {
        Self {
            camera_id: camera_id.to_string(),
            width,
            height,
            fps,
            min_duration_ms: default_min_duration_ms(),
            relative_path: default_relative_path(),
            file_extension: default_file_extension(),
            mime_type: default_mime_type(),
        }
    }

    /// Load a configuration from a JSON file
    pub fn load(path: &Path) -> CamcorderResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            CamcorderError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CamcorderResult<()> {
        if self.camera_id.trim().is_empty() {
            return Err(CamcorderError::Config("Camera ID must not be empty".to_string()));
        }
        if self.width == 0 || self.height == 0 {
            return Err(CamcorderError::Config(format!(
                "Invalid video size {}x{}",
                self.width, self.height
            )));
        }
        if self.file_extension.trim_start_matches('.').is_empty() {
            return Err(CamcorderError::Config("File extension must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn min_duration(&self) -> Duration {
        Duration::from_millis(self.min_duration_ms)
    }

    pub fn encoder_settings(&self) -> EncoderSettings {
        EncoderSettings::new(self.width, self.height, self.fps)
    }
}
