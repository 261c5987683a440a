//! Native camera provider using nokhwa
//!
//! Each opened camera runs its own capture thread. Frames are decoded to
//! RGB and handed to whichever outputs the current repeating request targets.

use super::device::{ERROR_CAMERA_DEVICE, ERROR_CAMERA_IN_USE};
use super::traits::{
    CameraDevice, CameraError, CameraInfo, CameraProvider, CaptureRequest, CaptureSession,
    DeviceCallback, DeviceEvent, PixelFormat, Resolution, SessionCallback, SessionEvent,
    SessionOutputs, VideoFrame,
};
use crate::utils::CallbackExecutor;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
};
use nokhwa::Camera;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

/// Consecutive frame failures treated as a disconnect
const MAX_FRAME_FAILURES: u32 = 30;

/// Camera provider backed by the platform camera API
pub struct NokhwaCameraProvider {
    width: u32,
    height: u32,
    fps: u32,
}

impl NokhwaCameraProvider {
    /// `width`, `height` and `fps` are the closest format to request on open
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self { width, height, fps }
    }

    fn requested_format(&self) -> RequestedFormat<'static> {
        let fps = if self.fps > 0 { self.fps } else { 30 };
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(CameraFormat::new_from(
            self.width,
            self.height,
            FrameFormat::MJPEG,
            fps,
        )))
    }
}

fn camera_index(id: &str) -> CameraIndex {
    match id.parse::<u32>() {
        Ok(index) => CameraIndex::Index(index),
        Err(_) => CameraIndex::String(id.to_string()),
    }
}

impl CameraProvider for NokhwaCameraProvider {
    fn cameras(&self) -> Vec<CameraInfo> {
        match nokhwa::query(ApiBackend::Auto) {
            Ok(cameras) => cameras
                .into_iter()
                .map(|info| {
                    let id = match info.index() {
                        CameraIndex::Index(i) => i.to_string(),
                        CameraIndex::String(s) => s.to_string(),
                    };

                    CameraInfo {
                        id,
                        name: info.human_name().to_string(),
                        supported_resolutions: vec![
                            Resolution {
                                width: 1920,
                                height: 1080,
                            },
                            Resolution {
                                width: 1280,
                                height: 720,
                            },
                            Resolution {
                                width: 640,
                                height: 480,
                            },
                        ],
                    }
                })
                .collect(),
            Err(e) => {
                tracing::warn!("Failed to enumerate cameras: {:?}", e);
                Vec::new()
            }
        }
    }

    fn open_camera(
        &self,
        camera_id: &str,
        callback: DeviceCallback,
        executor: Arc<CallbackExecutor>,
    ) -> Result<(), CameraError> {
        let shared = Arc::new(DeviceShared::new(camera_id));
        let format = self.requested_format();
        let index = camera_index(camera_id);
        let (width, height) = (self.width, self.height);

        let thread_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name(format!("camera-{camera_id}"))
            .spawn(move || {
                let post = |event: DeviceEvent| {
                    let callback = Arc::clone(&callback);
                    executor.execute(move || callback(event));
                };

                let mut camera = match Camera::new(index.clone(), format) {
                    Ok(camera) => camera,
                    Err(e) => {
                        tracing::error!("Failed to open camera {:?}: {:?}", index, e);
                        post(DeviceEvent::Error(ERROR_CAMERA_DEVICE));
                        return;
                    }
                };

                if let Err(e) = camera.open_stream() {
                    tracing::error!("Failed to open camera stream: {:?}", e);
                    post(DeviceEvent::Error(ERROR_CAMERA_IN_USE));
                    return;
                }

                let camera_format = camera.camera_format();
                tracing::info!(
                    "Camera {} streaming {}x{} @ {}fps ({:?})",
                    thread_shared.id,
                    camera_format.resolution().width(),
                    camera_format.resolution().height(),
                    camera_format.frame_rate(),
                    camera_format.format()
                );
                let actual = camera_format.resolution();
                if actual.width() != width || actual.height() != height {
                    tracing::warn!(
                        "Camera {} ignored requested {}x{}; recordings at that size will fail",
                        thread_shared.id,
                        width,
                        height
                    );
                }

                post(DeviceEvent::Opened(Arc::new(NativeDevice {
                    shared: Arc::clone(&thread_shared),
                })));

                if !capture_loop(&mut camera, &thread_shared) {
                    post(DeviceEvent::Disconnected);
                }

                if let Err(e) = camera.stop_stream() {
                    tracing::warn!("Error stopping camera stream: {:?}", e);
                }
                tracing::info!("Camera {} capture thread stopped", thread_shared.id);
            })
            .map_err(|e| CameraError::Subsystem(e.to_string()))?;

        *shared.thread.lock() = Some(handle);
        Ok(())
    }
}

/// Runs until the device is closed (`true`) or the camera stops delivering (`false`)
fn capture_loop(camera: &mut Camera, shared: &DeviceShared) -> bool {
    let started = Instant::now();
    let mut failures = 0u32;
    let mut frame_count = 0u64;

    while shared.running.load(Ordering::SeqCst) {
        let buffer = match camera.frame() {
            Ok(buffer) => buffer,
            Err(e) => {
                failures += 1;
                tracing::debug!("Failed to capture frame: {:?}", e);
                if failures >= MAX_FRAME_FAILURES {
                    tracing::warn!("Camera {} stopped delivering frames", shared.id);
                    shared.running.store(false, Ordering::SeqCst);
                    return false;
                }
                continue;
            }
        };
        failures = 0;

        let image = match buffer.decode_image::<RgbFormat>() {
            Ok(image) => image,
            Err(e) => {
                tracing::debug!("Failed to decode frame: {:?}", e);
                continue;
            }
        };

        let frame = VideoFrame {
            width: image.width(),
            height: image.height(),
            data: image.into_raw(),
            format: PixelFormat::Rgb24,
            timestamp_ms: started.elapsed().as_millis() as u64,
        };

        let Some(request) = shared.request.lock().clone() else {
            continue;
        };
        let Some(outputs) = shared.outputs.lock().clone() else {
            continue;
        };

        for target in &request.targets {
            outputs.get(*target).submit_frame(&frame);
        }
        frame_count += 1;
    }

    tracing::info!(
        "Camera {} delivered {} frames in {:.2}s",
        shared.id,
        frame_count,
        started.elapsed().as_secs_f64()
    );
    true
}

/// State shared between a device handle, its session and the capture thread
struct DeviceShared {
    id: String,
    running: AtomicBool,
    outputs: Mutex<Option<SessionOutputs>>,
    request: Mutex<Option<CaptureRequest>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl DeviceShared {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            running: AtomicBool::new(true),
            outputs: Mutex::new(None),
            request: Mutex::new(None),
            thread: Mutex::new(None),
        }
    }
}

/// An opened native camera
pub struct NativeDevice {
    shared: Arc<DeviceShared>,
}

impl CameraDevice for NativeDevice {
    fn id(&self) -> &str {
        &self.shared.id
    }

    fn create_capture_session(
        &self,
        outputs: SessionOutputs,
        callback: SessionCallback,
        executor: Arc<CallbackExecutor>,
    ) -> Result<(), CameraError> {
        if !self.shared.running.load(Ordering::SeqCst) {
            return Err(CameraError::Disconnected);
        }

        let event = if outputs.preview.is_valid() && outputs.record.is_valid() {
            *self.shared.request.lock() = None;
            *self.shared.outputs.lock() = Some(outputs);
            SessionEvent::Configured(Arc::new(NativeSession {
                shared: Arc::clone(&self.shared),
            }))
        } else {
            tracing::warn!("Session outputs for camera {} are not valid", self.shared.id);
            SessionEvent::ConfigureFailed
        };

        executor.execute(move || callback(event));
        Ok(())
    }

    fn close(&self) -> std::io::Result<()> {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.request.lock().take();
        self.shared.outputs.lock().take();

        if let Some(handle) = self.shared.thread.lock().take() {
            if handle.thread().id() == std::thread::current().id() {
                return Ok(());
            }
            handle.join().map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("capture thread for camera {} panicked", self.shared.id),
                )
            })?;
        }
        Ok(())
    }
}

/// Capture session over a native camera
struct NativeSession {
    shared: Arc<DeviceShared>,
}

impl CaptureSession for NativeSession {
    fn set_repeating_request(&self, request: &CaptureRequest) -> Result<(), CameraError> {
        if !self.shared.running.load(Ordering::SeqCst) {
            return Err(CameraError::Disconnected);
        }
        *self.shared.request.lock() = Some(request.clone());
        Ok(())
    }

    fn close(&self) {
        self.shared.request.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_index_parsing() {
        assert!(matches!(camera_index("0"), CameraIndex::Index(0)));
        assert!(matches!(camera_index("usb-cam"), CameraIndex::String(_)));
    }

    #[test]
    fn test_session_rejects_requests_after_close() {
        let shared = Arc::new(DeviceShared::new("0"));
        let device = NativeDevice {
            shared: Arc::clone(&shared),
        };
        let session = NativeSession { shared };

        session
            .set_repeating_request(&CaptureRequest::preview_only())
            .unwrap();
        device.close().unwrap();

        assert!(matches!(
            session.set_repeating_request(&CaptureRequest::preview_only()),
            Err(CameraError::Disconnected)
        ));
    }
}
