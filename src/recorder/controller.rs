//! Camera recorder
//!
//! Public entry point. Sequences the session manager, the recording
//! lifecycle and the output sink inside one cancelable orchestration scope.

use super::lifecycle::RecordingLifecycle;
use super::state::{RecorderState, RecordingTake};
use crate::capture::{CameraProvider, DeviceSessionManager, RequestKind, Surface};
use crate::config::RecorderConfig;
use crate::encoder::{EncoderFactory, PersistentSurface};
use crate::notify::{Notifier, RecorderEvent, StateListener};
use crate::storage::{MediaCatalog, OutputSink};
use crate::utils::error::{CamcorderError, CamcorderResult};
use crate::utils::CallbackExecutor;
use parking_lot::RwLock;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Subsystems the recorder drives
#[derive(Clone)]
pub struct Collaborators {
    pub camera: Arc<dyn CameraProvider>,
    pub encoder: Arc<dyn EncoderFactory>,
    pub catalog: Arc<dyn MediaCatalog>,
}

struct Inner {
    session: DeviceSessionManager,
    lifecycle: RecordingLifecycle,
    sink: OutputSink,
}

/// Camera preview and recording controller
pub struct CameraRecorder {
    config: RecorderConfig,

    /// Current state
    state: Arc<RwLock<RecorderState>>,

    /// Session, encoder and sink; only touched from inside the scope
    inner: tokio::sync::Mutex<Inner>,

    /// Orchestration scope, cancelled by `release`
    scope: CancellationToken,

    released: AtomicBool,

    executor: Arc<CallbackExecutor>,
    notifier: Arc<Notifier>,
    surface: Arc<PersistentSurface>,
}

impl CameraRecorder {
    /// Create a recorder. Nothing is opened until [`init`](Self::init).
    ///
    /// Only a weak handle to `preview` is kept; the caller owns it.
    pub fn new(
        config: RecorderConfig,
        preview: &Arc<dyn Surface>,
        collaborators: Collaborators,
    ) -> CamcorderResult<Self> {
        config.validate()?;

        let executor = Arc::new(CallbackExecutor::new("camcorder-callback")?);
        let notifier = Arc::new(Notifier::new());
        let surface = Arc::new(PersistentSurface::new(Arc::clone(&collaborators.encoder)));

        let state = Arc::new(RwLock::new(RecorderState::Idle));

        let mut session = DeviceSessionManager::new(
            &config.camera_id,
            config.fps,
            collaborators.camera,
            Arc::clone(&executor),
            Arc::clone(&notifier),
            Arc::downgrade(preview),
        );
        let hook_state = Arc::clone(&state);
        session.set_disconnect_hook(Arc::new(move || {
            let mut state = hook_state.write();
            if *state == RecorderState::Previewing {
                *state = RecorderState::Idle;
            }
        }));

        let lifecycle = RecordingLifecycle::new(
            collaborators.encoder,
            Arc::clone(&surface),
            config.encoder_settings(),
            config.min_duration(),
        );
        let sink = OutputSink::new(
            collaborators.catalog,
            &config.relative_path,
            &config.mime_type,
            &config.file_extension,
        );

        tracing::info!(
            "Created recorder for camera {} at {}x{}@{}",
            config.camera_id,
            config.width,
            config.height,
            config.fps
        );

        Ok(Self {
            config,
            state,
            inner: tokio::sync::Mutex::new(Inner {
                session,
                lifecycle,
                sink,
            }),
            scope: CancellationToken::new(),
            released: AtomicBool::new(false),
            executor,
            notifier,
            surface,
        })
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Get the current state
    pub fn state(&self) -> RecorderState {
        *self.state.read()
    }

    /// Subscribe to recorder events
    pub fn subscribe(&self) -> broadcast::Receiver<RecorderEvent> {
        self.notifier.subscribe()
    }

    /// Replace the state listener. `None` removes it.
    pub fn set_state_listener(&self, listener: Option<Arc<dyn StateListener>>) {
        self.notifier.set_listener(listener);
    }

    /// Elapsed time of the active take
    pub async fn recording_duration(&self) -> Option<Duration> {
        self.inner.lock().await.lifecycle.elapsed()
    }

    /// The session's active repeating request
    pub async fn current_request(&self) -> Option<RequestKind> {
        self.inner.lock().await.session.current_request()
    }

    /// Open the camera, configure the session and start preview
    pub async fn init(&self) -> CamcorderResult<()> {
        self.enter("initialize", &[RecorderState::Idle], RecorderState::Initializing)?;

        match self.scoped(self.run_init()).await {
            Ok(()) => {
                self.settle(RecorderState::Previewing);
                self.notifier.emit(RecorderEvent::PreviewStarted);
                tracing::info!("Preview started");
                Ok(())
            }
            Err(e) => {
                self.settle(RecorderState::Idle);
                self.report(&e);
                Err(e)
            }
        }
    }

    async fn run_init(&self) -> CamcorderResult<()> {
        let mut inner = self.inner.lock().await;
        let record = self.surface.get()?.as_surface();

        if let Err(e) = inner.session.initialize(record).await {
            inner.session.stop();
            return Err(e.into());
        }
        Ok(())
    }

    /// Start a take with the given orientation hint in degrees
    pub async fn start_recording(&self, orientation: i32) -> CamcorderResult<()> {
        self.enter(
            "start recording",
            &[RecorderState::Previewing],
            RecorderState::Starting,
        )?;

        match self.scoped(self.run_start(orientation)).await {
            Ok(()) => {
                self.settle(RecorderState::Recording);
                self.notifier
                    .emit(RecorderEvent::RecordingStarted { orientation });
                Ok(())
            }
            Err(e) => {
                if !matches!(e, CamcorderError::Cancelled) {
                    self.settle(self.resting_state().await);
                }
                self.report(&e);
                Err(e)
            }
        }
    }

    async fn run_start(&self, orientation: i32) -> CamcorderResult<()> {
        let mut inner = self.inner.lock().await;
        let Inner {
            session,
            lifecycle,
            sink,
        } = &mut *inner;
        lifecycle.start(session, sink, orientation).await
    }

    /// Finish the current take and publish it.
    ///
    /// Returns `Ok(None)` without side effects when nothing is recording.
    pub async fn stop_recording(&self) -> CamcorderResult<Option<RecordingTake>> {
        {
            let mut state = self.state.write();
            match *state {
                RecorderState::Released => return Err(CamcorderError::Released),
                RecorderState::Idle | RecorderState::Previewing => {
                    tracing::debug!("Stop requested with no recording in progress");
                    return Ok(None);
                }
                RecorderState::Recording => *state = RecorderState::Stopping,
                current => {
                    return Err(CamcorderError::InvalidState {
                        op: "stop recording",
                        state: current,
                    })
                }
            }
        }

        let result = self.scoped(self.run_stop()).await;
        if !matches!(result, Err(CamcorderError::Cancelled)) {
            self.settle(self.resting_state().await);
        }
        if let Err(e) = &result {
            self.report(e);
        }
        result
    }

    async fn run_stop(&self) -> CamcorderResult<Option<RecordingTake>> {
        let mut inner = self.inner.lock().await;
        let Inner {
            session,
            lifecycle,
            sink,
        } = &mut *inner;
        lifecycle.stop(session, sink, &self.notifier).await
    }

    /// Close the session and the camera. Preview stops; the recorder can be
    /// initialized again.
    pub async fn stop(&self) -> CamcorderResult<()> {
        {
            let mut state = self.state.write();
            match *state {
                RecorderState::Released => return Err(CamcorderError::Released),
                RecorderState::Idle => return Ok(()),
                RecorderState::Previewing => *state = RecorderState::Stopping,
                current => {
                    return Err(CamcorderError::InvalidState {
                        op: "stop",
                        state: current,
                    })
                }
            }
        }

        let result = self
            .scoped(async {
                self.inner.lock().await.session.stop();
                Ok(())
            })
            .await;

        if result.is_ok() {
            self.settle(RecorderState::Idle);
            tracing::info!("Camera {} stopped", self.config.camera_id);
        }
        result
    }

    /// Tear everything down and cancel in-flight operations.
    ///
    /// Only the first call does any work.
    pub async fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            tracing::debug!("Recorder already released");
            return;
        }

        tracing::info!("Releasing recorder for camera {}", self.config.camera_id);

        *self.state.write() = RecorderState::Released;
        self.scope.cancel();

        {
            let mut inner = self.inner.lock().await;
            inner.lifecycle.release().await;
            inner.sink.discard();
            self.surface.release();
            inner.session.stop();
        }

        let executor = Arc::clone(&self.executor);
        if let Err(e) = tokio::task::spawn_blocking(move || executor.shutdown()).await {
            tracing::warn!("Failed to shut down callback workers: {}", e);
        }

        tracing::info!("Recorder released");
    }

    /// Run `operation` unless the scope is cancelled first
    async fn scoped<T>(
        &self,
        operation: impl Future<Output = CamcorderResult<T>>,
    ) -> CamcorderResult<T> {
        tokio::select! {
            biased;
            _ = self.scope.cancelled() => Err(CamcorderError::Cancelled),
            result = operation => result,
        }
    }

    /// Move from one of `allowed` to `next`, or reject the call
    fn enter(
        &self,
        op: &'static str,
        allowed: &[RecorderState],
        next: RecorderState,
    ) -> CamcorderResult<()> {
        let mut state = self.state.write();
        match *state {
            RecorderState::Released => Err(CamcorderError::Released),
            current if allowed.contains(&current) => {
                *state = next;
                Ok(())
            }
            current => Err(CamcorderError::InvalidState { op, state: current }),
        }
    }

    /// `Previewing` while the camera is still open, `Idle` once it went away
    async fn resting_state(&self) -> RecorderState {
        if self.inner.lock().await.session.is_open() {
            RecorderState::Previewing
        } else {
            RecorderState::Idle
        }
    }

    /// Set the state unless released in the meantime
    fn settle(&self, next: RecorderState) {
        let mut state = self.state.write();
        if *state != RecorderState::Released {
            *state = next;
        }
    }

    fn report(&self, error: &CamcorderError) {
        if !matches!(error, CamcorderError::Cancelled) {
            self.notifier.emit(RecorderEvent::Error(error.to_string()));
        }
    }
}

impl Drop for CameraRecorder {
    fn drop(&mut self) {
        self.scope.cancel();
    }
}
