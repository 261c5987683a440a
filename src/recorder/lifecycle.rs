//! Recording lifecycle
//!
//! Creates one encoder per take against the persistent surface, switches the
//! session between preview-only and preview+record, and enforces the
//! minimum take duration before stopping.

use super::state::RecordingTake;
use crate::capture::{DeviceSessionManager, RequestKind};
use crate::encoder::{
    EncoderError, EncoderFactory, EncoderSettings, MediaEncoder, PersistentSurface,
};
use crate::notify::Notifier;
use crate::storage::OutputSink;
use crate::utils::error::CamcorderResult;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Time still owed before a take of length `elapsed` reaches `min`
pub fn remaining_min_duration(elapsed: Duration, min: Duration) -> Option<Duration> {
    (elapsed < min).then(|| min - elapsed)
}

struct ActiveTake {
    encoder: Box<dyn MediaEncoder>,
    started_at: Instant,
    take: RecordingTake,
}

/// Start/stop sequencing for recording takes
pub struct RecordingLifecycle {
    factory: Arc<dyn EncoderFactory>,
    surface: Arc<PersistentSurface>,
    settings: EncoderSettings,
    min_duration: Duration,
    active: Option<ActiveTake>,
}

impl RecordingLifecycle {
    pub fn new(
        factory: Arc<dyn EncoderFactory>,
        surface: Arc<PersistentSurface>,
        settings: EncoderSettings,
        min_duration: Duration,
    ) -> Self {
        Self {
            factory,
            surface,
            settings,
            min_duration,
            active: None,
        }
    }

    /// Time since the current take started
    pub fn elapsed(&self) -> Option<Duration> {
        self.active.as_ref().map(|a| a.started_at.elapsed())
    }

    /// Begin a take.
    ///
    /// On any failure the session is returned to preview-only, the encoder
    /// is released and the pending destination is dropped.
    pub async fn start(
        &mut self,
        session: &mut DeviceSessionManager,
        sink: &mut OutputSink,
        orientation: i32,
    ) -> CamcorderResult<()> {
        let surface = self.surface.get()?;
        let (location, file) = sink.allocate()?;

        let mut encoder = self.factory.create_encoder();
        if let Err(e) = encoder.configure(&self.settings, surface, file) {
            tracing::error!("Failed to configure encoder: {}", e);
            encoder.release().await;
            sink.discard();
            return Err(e.into());
        }

        if let Err(e) = session.set_repeating(RequestKind::PreviewAndRecord) {
            tracing::error!("Failed to switch to record request: {}", e);
            encoder.release().await;
            sink.discard();
            return Err(e.into());
        }

        if let Err(e) = launch(encoder.as_mut(), orientation).await {
            tracing::error!("Failed to start encoder: {}", e);
            encoder.release().await;
            revert_to_preview(session);
            sink.discard();
            return Err(e.into());
        }

        tracing::info!("Recording to {} (orientation {})", location, orientation);

        self.active = Some(ActiveTake {
            encoder,
            started_at: Instant::now(),
            take: RecordingTake::new(orientation),
        });
        Ok(())
    }

    /// Finish the current take. `Ok(None)` when nothing is recording.
    pub async fn stop(
        &mut self,
        session: &mut DeviceSessionManager,
        sink: &mut OutputSink,
        notifier: &Notifier,
    ) -> CamcorderResult<Option<RecordingTake>> {
        let Some(elapsed) = self.elapsed() else {
            return Ok(None);
        };

        if let Some(remaining) = remaining_min_duration(elapsed, self.min_duration) {
            tracing::info!(
                "Take is {}ms long, waiting {}ms to reach the minimum",
                elapsed.as_millis(),
                remaining.as_millis()
            );
            tokio::time::sleep(remaining).await;
        }

        let Some(mut active) = self.active.take() else {
            return Ok(None);
        };

        let stopped = active.encoder.stop().await;
        active.encoder.release().await;
        let duration = active.started_at.elapsed();
        drop(active.encoder);

        revert_to_preview(session);

        if let Err(e) = stopped {
            tracing::error!("Failed to stop encoder: {}", e);
            sink.discard();
            return Err(e.into());
        }

        let mut take = active.take;
        take.duration_ms = duration.as_millis() as u64;
        take.location = sink.finalize(notifier)?;

        tracing::info!("Recording stopped. Duration: {}ms", take.duration_ms);
        Ok(Some(take))
    }

    /// Release an unfinished take's encoder, if any
    pub async fn release(&mut self) {
        if let Some(mut active) = self.active.take() {
            tracing::warn!("Releasing encoder of an unfinished take");
            active.encoder.release().await;
        }
    }
}

async fn launch(encoder: &mut dyn MediaEncoder, orientation: i32) -> Result<(), EncoderError> {
    encoder.set_orientation_hint(orientation)?;
    encoder.prepare().await?;
    encoder.start().await
}

fn revert_to_preview(session: &mut DeviceSessionManager) {
    if let Err(e) = session.set_repeating(RequestKind::PreviewOnly) {
        tracing::warn!("Failed to restore preview request: {}", e);
    }
}
