//! Camcorder - camera preview and MP4 recording, made simple.
//!
//! This is the main library crate. It opens a camera, keeps a live preview
//! running and, on demand, records preview frames plus microphone audio into
//! an H.264/AAC MP4 that is published to a media catalog.

pub mod capture;
pub mod config;
pub mod encoder;
pub mod notify;
pub mod recorder;
pub mod storage;
pub mod utils;

#[cfg(test)]
mod testing;

pub use config::RecorderConfig;
pub use notify::{RecorderEvent, StateListener};
pub use recorder::{CameraRecorder, Collaborators, RecorderState};
pub use utils::error::{CamcorderError, CamcorderResult};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging
///
/// Reads `RUST_LOG`, falling back to `camcorder=debug`. Safe to call more
/// than once; later calls leave the first subscriber in place.
pub fn init_tracing() {
    let installed = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "camcorder=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    if installed.is_ok() {
        tracing::info!("Starting camcorder v{}", env!("CARGO_PKG_VERSION"));
    }
}
