//! In-memory preview surface
//!
//! Keeps the most recent frame for a UI layer to draw.

use super::traits::{Surface, VideoFrame};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Preview target holding the latest frame
pub struct PreviewSurface {
    label: String,
    latest: Mutex<Option<VideoFrame>>,
    frame_count: AtomicU64,
    valid: AtomicBool,
}

impl PreviewSurface {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            latest: Mutex::new(None),
            frame_count: AtomicU64::new(0),
            valid: AtomicBool::new(true),
        }
    }

    /// Take the most recent frame, if any arrived since the last call
    pub fn take_latest(&self) -> Option<VideoFrame> {
        self.latest.lock().take()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count.load(Ordering::Relaxed)
    }

    /// Mark the surface as destroyed; later frames are dropped
    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::SeqCst);
        self.latest.lock().take();
    }
}

impl Surface for PreviewSurface {
    fn label(&self) -> &str {
        &self.label
    }

    fn submit_frame(&self, frame: &VideoFrame) -> bool {
        if !self.is_valid() {
            return false;
        }
        *self.latest.lock() = Some(frame.clone());
        self.frame_count.fetch_add(1, Ordering::Relaxed);
        true
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }
}
