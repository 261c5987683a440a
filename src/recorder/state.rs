//! Recorder state management
//!
//! Defines the controller state machine and the summary of a finished take.

use crate::storage::MediaUri;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Current state of the recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderState {
    /// No camera open
    Idle,
    /// Opening the camera and configuring the session
    Initializing,
    /// Preview running, no take in progress
    Previewing,
    /// A take is being set up
    Starting,
    /// Currently recording
    Recording,
    /// A take is being finished and saved
    Stopping,
    /// Torn down for good
    Released,
}

impl Default for RecorderState {
    fn default() -> Self {
        Self::Idle
    }
}

impl fmt::Display for RecorderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecorderState::Idle => "idle",
            RecorderState::Initializing => "initializing",
            RecorderState::Previewing => "previewing",
            RecorderState::Starting => "starting",
            RecorderState::Recording => "recording",
            RecorderState::Stopping => "stopping",
            RecorderState::Released => "released",
        };
        f.write_str(name)
    }
}

/// Information about a finished take
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingTake {
    pub id: Uuid,

    /// Published catalog entry
    pub location: Option<MediaUri>,

    /// Orientation hint in degrees
    pub orientation: i32,

    /// Wall-clock start of the take
    pub started_at: DateTime<Utc>,

    /// Time between encoder start and stop, including any minimum-duration wait
    pub duration_ms: u64,
}

impl RecordingTake {
    pub fn new(orientation: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            location: None,
            orientation,
            started_at: Utc::now(),
            duration_ms: 0,
        }
    }
}
