//! Error types and handling
//!
//! Top-level error type returned by the recorder's public operations.

use crate::capture::CameraError;
use crate::encoder::EncoderError;
use crate::recorder::state::RecorderState;
use crate::storage::StorageError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Recorder-wide error type
#[derive(Error, Debug)]
pub enum CamcorderError {
    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Encoder error: {0}")]
    Encoder(#[from] EncoderError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cannot {op} while {state}")]
    InvalidState {
        op: &'static str,
        state: RecorderState,
    },

    #[error("Operation cancelled by release")]
    Cancelled,

    #[error("Recorder has been released")]
    Released,
}

/// Error response for callers that surface failures as data
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<CamcorderError> for ErrorResponse {
    fn from(error: CamcorderError) -> Self {
        let code = match &error {
            CamcorderError::Camera(CameraError::Device(_)) => "DEVICE_ERROR",
            CamcorderError::Camera(CameraError::Disconnected) => "DISCONNECTED",
            CamcorderError::Camera(CameraError::SessionConfigureFailed) => {
                "SESSION_CONFIGURE_FAILED"
            }
            CamcorderError::Camera(_) => "CAMERA_ERROR",
            CamcorderError::Encoder(_) => "ENCODER_ERROR",
            CamcorderError::Storage(_) => "STORAGE_ERROR",
            CamcorderError::Io(_) => "IO_ERROR",
            CamcorderError::Config(_) => "CONFIG_ERROR",
            CamcorderError::InvalidState { .. } => "INVALID_STATE",
            CamcorderError::Cancelled => "CANCELLED",
            CamcorderError::Released => "RELEASED",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using CamcorderError
pub type CamcorderResult<T> = Result<T, CamcorderError>;
