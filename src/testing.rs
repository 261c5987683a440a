//! Scripted camera and encoder fakes for unit tests

use crate::capture::{
    CameraDevice, CameraError, CameraInfo, CameraProvider, CaptureRequest, CaptureSession,
    DeviceCallback, DeviceEvent, RequestKind, Resolution, SessionCallback, SessionEvent,
    SessionOutputs, Surface, VideoFrame,
};
use crate::encoder::{
    EncoderError, EncoderFactory, EncoderSettings, EncoderStage, InputSurface, MediaEncoder,
};
use crate::utils::CallbackExecutor;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::fs::File;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// How the fake camera answers an open request
#[derive(Debug, Clone, Copy)]
pub enum OpenScript {
    Open,
    Error(i32),
    Disconnect,
    /// Never calls back
    Never,
}

/// How the fake camera answers a session request
#[derive(Debug, Clone, Copy)]
pub enum SessionScript {
    Configure,
    Fail,
}

#[derive(Default)]
struct CameraLog {
    requests: Mutex<Vec<RequestKind>>,
    sessions: AtomicUsize,
    closes: AtomicUsize,
    fail_close: AtomicBool,
}

/// Camera provider that answers from a script
pub struct FakeCamera {
    open: OpenScript,
    session: SessionScript,
    log: Arc<CameraLog>,
    callback: Mutex<Option<(DeviceCallback, Arc<CallbackExecutor>)>>,
}

impl FakeCamera {
    pub fn new() -> Arc<Self> {
        Self::with_scripts(OpenScript::Open, SessionScript::Configure)
    }

    pub fn with_scripts(open: OpenScript, session: SessionScript) -> Arc<Self> {
        Arc::new(Self {
            open,
            session,
            log: Arc::new(CameraLog::default()),
            callback: Mutex::new(None),
        })
    }

    /// Every repeating request submitted, in order
    pub fn requests(&self) -> Vec<RequestKind> {
        self.log.requests.lock().clone()
    }

    pub fn session_count(&self) -> usize {
        self.log.sessions.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.log.closes.load(Ordering::SeqCst)
    }

    /// Make device close report an I/O error
    pub fn fail_close(&self) {
        self.log.fail_close.store(true, Ordering::SeqCst);
    }

    /// Report a disconnect through the last open callback
    pub fn disconnect(&self) {
        if let Some((callback, executor)) = self.callback.lock().clone() {
            executor.execute(move || callback(DeviceEvent::Disconnected));
        }
    }
}

impl CameraProvider for FakeCamera {
    fn cameras(&self) -> Vec<CameraInfo> {
        vec![CameraInfo {
            id: "0".to_string(),
            name: "Fake Camera".to_string(),
            supported_resolutions: vec![Resolution {
                width: 1920,
                height: 1080,
            }],
        }]
    }

    fn open_camera(
        &self,
        _camera_id: &str,
        callback: DeviceCallback,
        executor: Arc<CallbackExecutor>,
    ) -> Result<(), CameraError> {
        *self.callback.lock() = Some((Arc::clone(&callback), Arc::clone(&executor)));

        let event = match self.open {
            OpenScript::Open => DeviceEvent::Opened(Arc::new(FakeDevice {
                session: self.session,
                log: Arc::clone(&self.log),
            })),
            OpenScript::Error(code) => DeviceEvent::Error(code),
            OpenScript::Disconnect => DeviceEvent::Disconnected,
            OpenScript::Never => return Ok(()),
        };
        executor.execute(move || callback(event));
        Ok(())
    }
}

struct FakeDevice {
    session: SessionScript,
    log: Arc<CameraLog>,
}

impl CameraDevice for FakeDevice {
    fn id(&self) -> &str {
        "0"
    }

    fn create_capture_session(
        &self,
        _outputs: SessionOutputs,
        callback: SessionCallback,
        executor: Arc<CallbackExecutor>,
    ) -> Result<(), CameraError> {
        self.log.sessions.fetch_add(1, Ordering::SeqCst);

        let event = match self.session {
            SessionScript::Configure => SessionEvent::Configured(Arc::new(FakeSession {
                log: Arc::clone(&self.log),
            })),
            SessionScript::Fail => SessionEvent::ConfigureFailed,
        };
        executor.execute(move || callback(event));
        Ok(())
    }

    fn close(&self) -> std::io::Result<()> {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
        if self.log.fail_close.load(Ordering::SeqCst) {
            return Err(std::io::Error::new(std::io::ErrorKind::Other, "close failed"));
        }
        Ok(())
    }
}

struct FakeSession {
    log: Arc<CameraLog>,
}

impl CaptureSession for FakeSession {
    fn set_repeating_request(&self, request: &CaptureRequest) -> Result<(), CameraError> {
        self.log.requests.lock().push(request.kind);
        Ok(())
    }

    fn close(&self) {}
}

/// Surface that counts the frames it receives
#[derive(Default)]
pub struct RecordingSurface {
    frames: AtomicU64,
}

impl RecordingSurface {
    pub fn new() -> Arc<dyn Surface> {
        Arc::new(Self::default())
    }
}

impl Surface for RecordingSurface {
    fn label(&self) -> &str {
        "recording"
    }

    fn submit_frame(&self, _frame: &VideoFrame) -> bool {
        self.frames.fetch_add(1, Ordering::SeqCst);
        true
    }
}

/// One call made on a fake encoder
#[derive(Debug, Clone, PartialEq)]
pub enum EncoderCall {
    Configure(EncoderSettings),
    Orientation(i32),
    Prepare,
    Start(Instant),
    Stop(Instant),
    Release,
}

struct FakeInputSurface {
    released: AtomicBool,
    releases: Arc<AtomicUsize>,
}

impl Surface for FakeInputSurface {
    fn label(&self) -> &str {
        "fake-encoder-input"
    }

    fn submit_frame(&self, _frame: &VideoFrame) -> bool {
        !self.released.load(Ordering::SeqCst)
    }

    fn is_valid(&self) -> bool {
        !self.released.load(Ordering::SeqCst)
    }
}

impl InputSurface for FakeInputSurface {
    fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    fn as_surface(self: Arc<Self>) -> Arc<dyn Surface> {
        self
    }
}

/// Encoder factory whose encoders only log what they are asked to do
#[derive(Default)]
pub struct FakeEncoderFactory {
    surfaces_created: AtomicUsize,
    surface_releases: Arc<AtomicUsize>,
    encoders_created: AtomicUsize,
    fail_prepare: AtomicBool,
    fail_stop: AtomicBool,
    calls: Arc<Mutex<Vec<EncoderCall>>>,
}

impl FakeEncoderFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn surfaces_created(&self) -> usize {
        self.surfaces_created.load(Ordering::SeqCst)
    }

    pub fn surface_releases(&self) -> usize {
        self.surface_releases.load(Ordering::SeqCst)
    }

    pub fn encoders_created(&self) -> usize {
        self.encoders_created.load(Ordering::SeqCst)
    }

    /// Make `prepare` fail on encoders created from now on
    pub fn set_fail_prepare(&self, fail: bool) {
        self.fail_prepare.store(fail, Ordering::SeqCst);
    }

    /// Make `stop` fail on encoders created from now on
    pub fn set_fail_stop(&self, fail: bool) {
        self.fail_stop.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<EncoderCall> {
        self.calls.lock().clone()
    }

    /// Time between the most recent start and the stop after it
    pub fn take_span(&self) -> Option<Duration> {
        let calls = self.calls.lock();
        let started = calls.iter().rev().find_map(|c| match c {
            EncoderCall::Start(at) => Some(*at),
            _ => None,
        })?;
        let stopped = calls.iter().rev().find_map(|c| match c {
            EncoderCall::Stop(at) => Some(*at),
            _ => None,
        })?;
        stopped.checked_duration_since(started)
    }
}

impl EncoderFactory for FakeEncoderFactory {
    fn create_input_surface(&self) -> Result<Arc<dyn InputSurface>, EncoderError> {
        self.surfaces_created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeInputSurface {
            released: AtomicBool::new(false),
            releases: Arc::clone(&self.surface_releases),
        }))
    }

    fn create_encoder(&self) -> Box<dyn MediaEncoder> {
        self.encoders_created.fetch_add(1, Ordering::SeqCst);
        Box::new(FakeEncoder {
            stage: EncoderStage::Created,
            fail_prepare: self.fail_prepare.load(Ordering::SeqCst),
            fail_stop: self.fail_stop.load(Ordering::SeqCst),
            output: None,
            calls: Arc::clone(&self.calls),
        })
    }
}

struct FakeEncoder {
    stage: EncoderStage,
    fail_prepare: bool,
    fail_stop: bool,
    output: Option<File>,
    calls: Arc<Mutex<Vec<EncoderCall>>>,
}

impl FakeEncoder {
    fn expect(&self, op: &'static str, stage: EncoderStage) -> Result<(), EncoderError> {
        if self.stage != stage {
            return Err(EncoderError::IllegalState {
                op,
                stage: self.stage,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MediaEncoder for FakeEncoder {
    fn configure(
        &mut self,
        settings: &EncoderSettings,
        _surface: Arc<dyn InputSurface>,
        output: File,
    ) -> Result<(), EncoderError> {
        self.expect("configure", EncoderStage::Created)?;
        self.calls.lock().push(EncoderCall::Configure(settings.clone()));
        self.output = Some(output);
        self.stage = EncoderStage::Configured;
        Ok(())
    }

    fn set_orientation_hint(&mut self, degrees: i32) -> Result<(), EncoderError> {
        self.expect("set orientation on", EncoderStage::Configured)?;
        self.calls.lock().push(EncoderCall::Orientation(degrees));
        Ok(())
    }

    async fn prepare(&mut self) -> Result<(), EncoderError> {
        self.expect("prepare", EncoderStage::Configured)?;
        self.calls.lock().push(EncoderCall::Prepare);
        if self.fail_prepare {
            return Err(EncoderError::Prepare("scripted failure".to_string()));
        }
        self.stage = EncoderStage::Prepared;
        Ok(())
    }

    async fn start(&mut self) -> Result<(), EncoderError> {
        self.expect("start", EncoderStage::Prepared)?;
        self.calls.lock().push(EncoderCall::Start(Instant::now()));
        self.stage = EncoderStage::Started;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), EncoderError> {
        self.expect("stop", EncoderStage::Started)?;
        self.calls.lock().push(EncoderCall::Stop(Instant::now()));
        if self.fail_stop {
            self.stage = EncoderStage::Stopped;
            return Err(EncoderError::Stop("scripted failure".to_string()));
        }
        if let Some(output) = self.output.as_mut() {
            output.write_all(b"fake mp4")?;
        }
        self.stage = EncoderStage::Stopped;
        Ok(())
    }

    async fn release(&mut self) {
        self.output = None;
        self.stage = EncoderStage::Released;
        self.calls.lock().push(EncoderCall::Release);
    }

    fn stage(&self) -> EncoderStage {
        self.stage
    }
}
