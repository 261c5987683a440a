//! Recording system module
//!
//! - `CameraRecorder` drives initialization, takes and teardown
//! - `RecordingLifecycle` owns the per-take encoder sequence
//! - `RecorderState` is the controller state machine

pub mod controller;
pub mod lifecycle;
pub mod state;

pub use controller::{CameraRecorder, Collaborators};
pub use lifecycle::RecordingLifecycle;
pub use state::{RecorderState, RecordingTake};
