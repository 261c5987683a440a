//! Video/audio encoder interfaces
//!
//! An encoder instance lives for exactly one take. It reads video from the
//! persistent input surface, captures microphone audio itself and writes an
//! MP4 into the file handle it is configured with.

pub mod ffmpeg;
pub mod surface;

pub use ffmpeg::{AudioInput, FfmpegEncoder, FfmpegEncoderFactory, FrameQueueSurface};
pub use surface::PersistentSurface;

use crate::capture::{Surface, VideoFrame};
use async_trait::async_trait;
use crossbeam_channel::Receiver;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::sync::Arc;
use thiserror::Error;

/// Video bitrate in bits per second
pub const VIDEO_BIT_RATE: u32 = 5_000_000;
/// Audio bitrate in bits per second
pub const AUDIO_BIT_RATE: u32 = 64_000;
/// Audio sample rate in Hz
pub const AUDIO_SAMPLE_RATE: u32 = 44_100;
/// Mono
pub const AUDIO_CHANNELS: u16 = 1;

/// Errors that can occur while encoding
#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Prepare failed: {0}")]
    Prepare(String),

    #[error("Start failed: {0}")]
    Start(String),

    #[error("Stop failed: {0}")]
    Stop(String),

    #[error("Cannot {op} encoder in state {stage:?}")]
    IllegalState { op: &'static str, stage: EncoderStage },

    #[error("Input surface has been released")]
    SurfaceReleased,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Lifecycle of a single encoder instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderStage {
    Created,
    Configured,
    Prepared,
    Started,
    Stopped,
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoCodec {
    H264,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioCodec {
    HeAac,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    Mpeg4,
}

/// Encoder parameters for a take
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncoderSettings {
    pub width: u32,
    pub height: u32,
    /// Requested frame rate; zero leaves it to the encoder
    pub fps: u32,
    pub video_codec: VideoCodec,
    pub video_bit_rate: u32,
    pub audio_codec: AudioCodec,
    pub audio_bit_rate: u32,
    pub audio_sample_rate: u32,
    pub audio_channels: u16,
    pub output_format: OutputFormat,
}

impl EncoderSettings {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width,
            height,
            fps,
            video_codec: VideoCodec::H264,
            video_bit_rate: VIDEO_BIT_RATE,
            audio_codec: AudioCodec::HeAac,
            audio_bit_rate: AUDIO_BIT_RATE,
            audio_sample_rate: AUDIO_SAMPLE_RATE,
            audio_channels: AUDIO_CHANNELS,
            output_format: OutputFormat::Mpeg4,
        }
    }

    /// Frame rate to request, only when positive
    pub fn frame_rate(&self) -> Option<u32> {
        (self.fps > 0).then_some(self.fps)
    }
}

/// Long-lived encoder input surface, reused across takes
pub trait InputSurface: Surface {
    fn release(&self);

    fn is_released(&self) -> bool;

    /// Queue of frames submitted to the surface, when it exposes one
    fn frames(&self) -> Option<Receiver<VideoFrame>> {
        None
    }

    /// View as a capture output target
    fn as_surface(self: Arc<Self>) -> Arc<dyn Surface>;
}

/// A single-take encoder
#[async_trait]
pub trait MediaEncoder: Send {
    /// Bind sources, formats, bitrates and the destination file
    fn configure(
        &mut self,
        settings: &EncoderSettings,
        surface: Arc<dyn InputSurface>,
        output: File,
    ) -> Result<(), EncoderError>;

    /// Rotation in degrees applied at playback
    fn set_orientation_hint(&mut self, degrees: i32) -> Result<(), EncoderError>;

    async fn prepare(&mut self) -> Result<(), EncoderError>;

    async fn start(&mut self) -> Result<(), EncoderError>;

    async fn stop(&mut self) -> Result<(), EncoderError>;

    /// Free all resources. Safe to call in any stage.
    async fn release(&mut self);

    fn stage(&self) -> EncoderStage;
}

/// Creates encoder instances and the persistent input surface
pub trait EncoderFactory: Send + Sync {
    fn create_input_surface(&self) -> Result<Arc<dyn InputSurface>, EncoderError>;

    fn create_encoder(&self) -> Box<dyn MediaEncoder>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_settings() {
        let settings = EncoderSettings::new(1920, 1080, 30);
        assert_eq!(settings.video_bit_rate, 5_000_000);
        assert_eq!(settings.audio_bit_rate, 64_000);
        assert_eq!(settings.audio_sample_rate, 44_100);
        assert_eq!(settings.audio_channels, 1);
        assert_eq!(settings.audio_codec, AudioCodec::HeAac);
        assert_eq!(settings.video_codec, VideoCodec::H264);
        assert_eq!(settings.frame_rate(), Some(30));
    }

    #[test]
    fn test_frame_rate_only_when_positive() {
        assert_eq!(EncoderSettings::new(640, 480, 0).frame_rate(), None);
    }
}
