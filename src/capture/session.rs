//! Device session manager
//!
//! Owns the open camera and its capture session. The session is configured
//! once with both outputs (preview and persistent encoder surface); after
//! that only the active repeating request changes.

use super::device::DeviceErrorKind;
use super::traits::{
    CameraDevice, CameraError, CameraProvider, CaptureRequest, CaptureSession, DeviceEvent,
    RequestKind, SessionEvent, SessionOutputs, Surface,
};
use crate::notify::Notifier;
use crate::utils::{CallbackExecutor, Completion};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

type DeviceSlot = Arc<Mutex<Option<Arc<dyn CameraDevice>>>>;

/// Called on a callback worker after the camera reports a disconnect
pub type DisconnectHook = Arc<dyn Fn() + Send + Sync>;

/// Both repeating requests, built once per session
struct RequestSet {
    preview: CaptureRequest,
    record: CaptureRequest,
}

impl RequestSet {
    fn new(fps: u32) -> Self {
        Self {
            preview: CaptureRequest::preview_only(),
            record: CaptureRequest::preview_and_record(fps),
        }
    }

    fn get(&self, kind: RequestKind) -> &CaptureRequest {
        match kind {
            RequestKind::PreviewOnly => &self.preview,
            RequestKind::PreviewAndRecord => &self.record,
        }
    }
}

/// Manages one camera device and its capture session
pub struct DeviceSessionManager {
    camera_id: String,
    fps: u32,
    provider: Arc<dyn CameraProvider>,
    executor: Arc<CallbackExecutor>,
    notifier: Arc<Notifier>,
    /// Owned by the application; may be gone by the time we need it
    preview: Weak<dyn Surface>,
    device: DeviceSlot,
    on_disconnect: Option<DisconnectHook>,
    session: Option<Arc<dyn CaptureSession>>,
    requests: Option<RequestSet>,
    current: Option<RequestKind>,
}

impl DeviceSessionManager {
    pub fn new(
        camera_id: &str,
        fps: u32,
        provider: Arc<dyn CameraProvider>,
        executor: Arc<CallbackExecutor>,
        notifier: Arc<Notifier>,
        preview: Weak<dyn Surface>,
    ) -> Self {
        Self {
            camera_id: camera_id.to_string(),
            fps,
            provider,
            executor,
            notifier,
            preview,
            device: Arc::new(Mutex::new(None)),
            on_disconnect: None,
            session: None,
            requests: None,
            current: None,
        }
    }

    /// Run `hook` whenever an opened camera goes away
    pub fn set_disconnect_hook(&mut self, hook: DisconnectHook) {
        self.on_disconnect = Some(hook);
    }

    /// Open the camera, configure the dual-output session and start preview.
    pub async fn initialize(&mut self, record: Arc<dyn Surface>) -> Result<(), CameraError> {
        self.open().await?;
        self.configure(record).await?;
        self.set_repeating(RequestKind::PreviewOnly)
    }

    /// Open the camera and wait for the subsystem to report back
    pub async fn open(&mut self) -> Result<(), CameraError> {
        let (completion, rx) = Completion::<Result<(), CameraError>>::new();
        let slot = Arc::clone(&self.device);
        let notifier = Arc::clone(&self.notifier);
        let camera_id = self.camera_id.clone();
        let on_disconnect = self.on_disconnect.clone();

        tracing::info!("Opening camera {}", self.camera_id);

        let callback = Arc::new(move |event: DeviceEvent| match event {
            DeviceEvent::Opened(device) => {
                *slot.lock() = Some(Arc::clone(&device));
                if !completion.complete(Ok(())) {
                    tracing::warn!("Camera {} opened after the request was abandoned", camera_id);
                    slot.lock().take();
                    close_device(&camera_id, device.as_ref());
                } else {
                    tracing::info!("Camera {} opened", camera_id);
                }
            }
            DeviceEvent::Disconnected => {
                tracing::warn!("Camera {} disconnected", camera_id);
                let was_open = slot.lock().take();
                if let Some(device) = was_open {
                    close_device(&camera_id, device.as_ref());
                    if let Some(hook) = &on_disconnect {
                        hook();
                    }
                }
                notifier.disconnected();
                completion.complete(Err(CameraError::Disconnected));
            }
            DeviceEvent::Error(code) => {
                let kind = DeviceErrorKind::from_code(code);
                tracing::error!("Camera {} error: {}", camera_id, kind);
                if let Some(device) = slot.lock().take() {
                    close_device(&camera_id, device.as_ref());
                }
                completion.complete(Err(CameraError::Device(kind)));
            }
        });

        self.provider
            .open_camera(&self.camera_id, callback, Arc::clone(&self.executor))?;

        rx.await.map_err(|_| CameraError::Abandoned)?
    }

    /// Configure a session binding the preview and `record` surfaces
    pub async fn configure(&mut self, record: Arc<dyn Surface>) -> Result<(), CameraError> {
        let preview = self.preview.upgrade().ok_or(CameraError::SurfaceUnavailable)?;
        let device = self.device.lock().clone().ok_or(CameraError::NoDevice)?;

        if let Some(stale) = self.session.take() {
            stale.close();
        }
        self.current = None;

        let (completion, rx) = Completion::<Result<Arc<dyn CaptureSession>, CameraError>>::new();
        let notifier = Arc::clone(&self.notifier);
        let camera_id = self.camera_id.clone();

        let callback = Arc::new(move |event: SessionEvent| match event {
            SessionEvent::Configured(session) => {
                if !completion.complete(Ok(Arc::clone(&session))) {
                    tracing::warn!(
                        "Session for camera {} configured after the request was abandoned",
                        camera_id
                    );
                    session.close();
                }
            }
            SessionEvent::ConfigureFailed => {
                tracing::error!("Failed to configure capture session for camera {}", camera_id);
                notifier.create_session_failed();
                completion.complete(Err(CameraError::SessionConfigureFailed));
            }
        });

        tracing::debug!(
            "Configuring session for camera {}: outputs [{}, {}]",
            self.camera_id,
            preview.label(),
            record.label()
        );

        device.create_capture_session(
            SessionOutputs { preview, record },
            callback,
            Arc::clone(&self.executor),
        )?;

        let session = rx.await.map_err(|_| CameraError::Abandoned)??;
        self.session = Some(session);
        self.current = None;

        tracing::info!("Capture session configured for camera {}", self.camera_id);
        Ok(())
    }

    /// Replace the session's repeating request
    pub fn set_repeating(&mut self, kind: RequestKind) -> Result<(), CameraError> {
        if !self.is_open() {
            self.drop_session();
            return Err(CameraError::NoDevice);
        }
        let session = self.session.as_ref().ok_or(CameraError::NoSession)?;
        let fps = self.fps;
        let request = self.requests.get_or_insert_with(|| RequestSet::new(fps)).get(kind);

        session.set_repeating_request(request)?;
        self.current = Some(kind);

        tracing::info!("Repeating request for camera {} is now {:?}", self.camera_id, kind);
        Ok(())
    }

    /// The active repeating request, if a session is running on an open camera
    pub fn current_request(&self) -> Option<RequestKind> {
        if self.is_open() {
            self.current
        } else {
            None
        }
    }

    pub fn is_open(&self) -> bool {
        self.device.lock().is_some()
    }

    fn drop_session(&mut self) {
        if let Some(session) = self.session.take() {
            session.close();
        }
        self.current = None;
    }

    /// Close the session and the device. Close failures are logged only.
    pub fn stop(&mut self) {
        self.drop_session();

        if let Some(device) = self.device.lock().take() {
            close_device(&self.camera_id, device.as_ref());
        }
    }
}

fn close_device(camera_id: &str, device: &dyn CameraDevice) {
    match device.close() {
        Ok(()) => tracing::info!("Camera {} closed", camera_id),
        Err(e) => tracing::warn!("Failed to close camera {}: {}", camera_id, e),
    }
}
