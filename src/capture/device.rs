//! Device open error classification

use serde::{Deserialize, Serialize};
use std::fmt;

/// Camera already opened by a higher-priority client
pub const ERROR_CAMERA_IN_USE: i32 = 1;
/// Too many cameras open system-wide
pub const ERROR_MAX_CAMERAS_IN_USE: i32 = 2;
/// Camera disabled by device policy
pub const ERROR_CAMERA_DISABLED: i32 = 3;
/// Fatal error in the camera device
pub const ERROR_CAMERA_DEVICE: i32 = 4;
/// Fatal error in the camera service
pub const ERROR_CAMERA_SERVICE: i32 = 5;

/// Classified device error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceErrorKind {
    DeviceFatal,
    DisabledByPolicy,
    InUse,
    ServiceFatal,
    MaxDevicesInUse,
    Unknown(i32),
}

impl DeviceErrorKind {
    pub fn from_code(code: i32) -> Self {
        match code {
            ERROR_CAMERA_DEVICE => DeviceErrorKind::DeviceFatal,
            ERROR_CAMERA_DISABLED => DeviceErrorKind::DisabledByPolicy,
            ERROR_CAMERA_IN_USE => DeviceErrorKind::InUse,
            ERROR_CAMERA_SERVICE => DeviceErrorKind::ServiceFatal,
            ERROR_MAX_CAMERAS_IN_USE => DeviceErrorKind::MaxDevicesInUse,
            other => DeviceErrorKind::Unknown(other),
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            DeviceErrorKind::DeviceFatal => "Fatal (device)",
            DeviceErrorKind::DisabledByPolicy => "Device policy",
            DeviceErrorKind::InUse => "Camera in use",
            DeviceErrorKind::ServiceFatal => "Fatal (service)",
            DeviceErrorKind::MaxDevicesInUse => "Maximum cameras in use",
            DeviceErrorKind::Unknown(_) => "Unknown",
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            DeviceErrorKind::DeviceFatal => ERROR_CAMERA_DEVICE,
            DeviceErrorKind::DisabledByPolicy => ERROR_CAMERA_DISABLED,
            DeviceErrorKind::InUse => ERROR_CAMERA_IN_USE,
            DeviceErrorKind::ServiceFatal => ERROR_CAMERA_SERVICE,
            DeviceErrorKind::MaxDevicesInUse => ERROR_MAX_CAMERAS_IN_USE,
            DeviceErrorKind::Unknown(code) => *code,
        }
    }
}

impl fmt::Display for DeviceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message(), self.code())
    }
}
