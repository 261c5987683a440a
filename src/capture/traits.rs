//! Capture trait definitions
//!
//! Platform-agnostic interfaces for the camera subsystem. Opening a device
//! and configuring a session complete through callbacks that the subsystem
//! posts onto a [`CallbackExecutor`].

use super::device::DeviceErrorKind;
use crate::utils::CallbackExecutor;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by the camera subsystem and the session manager
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Camera device error: {0}")]
    Device(DeviceErrorKind),

    #[error("Camera disconnected")]
    Disconnected,

    #[error("Capture session configuration failed")]
    SessionConfigureFailed,

    #[error("Preview surface is no longer available")]
    SurfaceUnavailable,

    #[error("No camera device is open")]
    NoDevice,

    #[error("No capture session is configured")]
    NoSession,

    #[error("Camera subsystem error: {0}")]
    Subsystem(String),

    #[error("Camera callback was abandoned before completing")]
    Abandoned,
}

/// Information about a camera
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraInfo {
    /// Unique device ID
    pub id: String,

    /// Device name
    pub name: String,

    /// Supported resolutions
    pub supported_resolutions: Vec<Resolution>,
}

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Pixel layout of a raw frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Rgb24,
    Rgba,
    Yuyv422,
    Nv12,
}

impl PixelFormat {
    /// FFmpeg `-pixel_format` name
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            PixelFormat::Rgb24 => "rgb24",
            PixelFormat::Rgba => "rgba",
            PixelFormat::Yuyv422 => "yuyv422",
            PixelFormat::Nv12 => "nv12",
        }
    }

    /// Expected buffer size for one frame
    pub fn frame_size(&self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            PixelFormat::Rgb24 => pixels * 3,
            PixelFormat::Rgba => pixels * 4,
            PixelFormat::Yuyv422 => pixels * 2,
            PixelFormat::Nv12 => pixels * 3 / 2,
        }
    }
}

/// A raw frame produced by the camera
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Capture time in milliseconds since the stream started
    pub timestamp_ms: u64,
}

/// An output target bound into a capture session
pub trait Surface: Send + Sync {
    /// Short name used in logs
    fn label(&self) -> &str;

    /// Hand a frame to the target. Returns `false` if the frame was dropped.
    fn submit_frame(&self, frame: &VideoFrame) -> bool;

    /// Whether the target can still accept frames
    fn is_valid(&self) -> bool {
        true
    }
}

/// Which of the session's outputs a request targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TargetKind {
    Preview,
    Record,
}

/// The two standing requests a session switches between
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestKind {
    PreviewOnly,
    PreviewAndRecord,
}

/// A repeating capture request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub kind: RequestKind,
    pub targets: Vec<TargetKind>,
    /// Target frame-rate range (min, max)
    pub fps_range: Option<(u32, u32)>,
}

impl CaptureRequest {
    /// Request that feeds only the preview surface
    pub fn preview_only() -> Self {
        Self {
            kind: RequestKind::PreviewOnly,
            targets: vec![TargetKind::Preview],
            fps_range: None,
        }
    }

    /// Request that feeds preview and encoder, pinned to `fps` when positive
    pub fn preview_and_record(fps: u32) -> Self {
        Self {
            kind: RequestKind::PreviewAndRecord,
            targets: vec![TargetKind::Preview, TargetKind::Record],
            fps_range: (fps > 0).then_some((fps, fps)),
        }
    }

    pub fn targets(&self, kind: TargetKind) -> bool {
        self.targets.contains(&kind)
    }
}

/// The fixed output set of a capture session
#[derive(Clone)]
pub struct SessionOutputs {
    pub preview: Arc<dyn Surface>,
    pub record: Arc<dyn Surface>,
}

impl SessionOutputs {
    pub fn get(&self, kind: TargetKind) -> &Arc<dyn Surface> {
        match kind {
            TargetKind::Preview => &self.preview,
            TargetKind::Record => &self.record,
        }
    }
}

/// Device state reported by the camera subsystem
pub enum DeviceEvent {
    Opened(Arc<dyn CameraDevice>),
    Disconnected,
    /// Raw subsystem error code, see [`DeviceErrorKind::from_code`]
    Error(i32),
}

/// Session state reported by the camera subsystem
pub enum SessionEvent {
    Configured(Arc<dyn CaptureSession>),
    ConfigureFailed,
}

pub type DeviceCallback = Arc<dyn Fn(DeviceEvent) + Send + Sync>;
pub type SessionCallback = Arc<dyn Fn(SessionEvent) + Send + Sync>;

/// Entry point into the camera subsystem
pub trait CameraProvider: Send + Sync {
    /// Enumerate available cameras
    fn cameras(&self) -> Vec<CameraInfo>;

    /// Begin opening a camera. The outcome arrives through `callback`,
    /// invoked on `executor`. An `Err` here means the request was never
    /// issued and no callback will follow.
    fn open_camera(
        &self,
        camera_id: &str,
        callback: DeviceCallback,
        executor: Arc<CallbackExecutor>,
    ) -> Result<(), CameraError>;
}

/// An opened camera
pub trait CameraDevice: Send + Sync {
    fn id(&self) -> &str;

    /// Begin configuring a session over `outputs`. The outcome arrives
    /// through `callback`, invoked on `executor`.
    fn create_capture_session(
        &self,
        outputs: SessionOutputs,
        callback: SessionCallback,
        executor: Arc<CallbackExecutor>,
    ) -> Result<(), CameraError>;

    /// Close the device
    fn close(&self) -> std::io::Result<()>;
}

/// A configured capture session
pub trait CaptureSession: Send + Sync {
    /// Replace the current repeating request
    fn set_repeating_request(&self, request: &CaptureRequest) -> Result<(), CameraError>;

    /// Stop repeating and drop the session
    fn close(&self);
}

/// List cameras known to a provider
pub fn camera_infos(provider: &dyn CameraProvider) -> Vec<CameraInfo> {
    let cameras = provider.cameras();
    tracing::debug!("Found {} cameras", cameras.len());
    cameras
}
