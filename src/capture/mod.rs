//! Camera capture
//!
//! This module provides the camera subsystem interfaces, device error
//! classification and the session manager that drives preview and record
//! targets.

pub mod device;
pub mod preview;
pub mod session;
pub mod traits;

#[cfg(feature = "native-camera")]
pub mod native;

#[cfg(feature = "native-camera")]
pub use native::NokhwaCameraProvider;

pub use device::DeviceErrorKind;
pub use preview::PreviewSurface;
pub use session::DeviceSessionManager;
pub use traits::{
    camera_infos, CameraDevice, CameraError, CameraInfo, CameraProvider, CaptureRequest,
    CaptureSession, DeviceCallback, DeviceEvent, PixelFormat, RequestKind, Resolution,
    SessionCallback, SessionEvent, SessionOutputs, Surface, TargetKind, VideoFrame,
};
