//! FFmpeg-backed encoder
//!
//! The persistent input surface is a bounded frame queue. Each take spawns
//! an FFmpeg process that reads raw frames from stdin, captures the
//! microphone through an FFmpeg input device and writes fragmented MP4 to
//! the destination file descriptor.

use super::{
    EncoderError, EncoderFactory, EncoderSettings, EncoderStage, InputSurface, MediaEncoder,
};
use crate::capture::{PixelFormat, Surface, VideoFrame};
use async_trait::async_trait;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Frames buffered between the camera and the encoder
pub const DEFAULT_QUEUE_DEPTH: usize = 8;

/// FFmpeg input device used for the microphone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioInput {
    /// FFmpeg demuxer (`pulse`, `alsa`, `avfoundation`, `dshow`)
    pub format: String,
    /// Device name for that demuxer
    pub device: String,
}

impl Default for AudioInput {
    fn default() -> Self {
        #[cfg(target_os = "macos")]
        {
            Self {
                format: "avfoundation".to_string(),
                device: ":0".to_string(),
            }
        }

        #[cfg(target_os = "windows")]
        {
            Self {
                format: "dshow".to_string(),
                device: "audio=default".to_string(),
            }
        }

        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        {
            Self {
                format: "pulse".to_string(),
                device: "default".to_string(),
            }
        }
    }
}

/// Encoder input surface backed by a bounded frame queue
pub struct FrameQueueSurface {
    label: String,
    tx: Sender<VideoFrame>,
    rx: Receiver<VideoFrame>,
    released: AtomicBool,
    dropped: AtomicU64,
}

impl FrameQueueSurface {
    pub fn new(label: &str, depth: usize) -> Self {
        let (tx, rx) = bounded(depth.max(1));
        Self {
            label: label.to_string(),
            tx,
            rx,
            released: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    /// Receiver for the encoder's writer thread
    pub fn receiver(&self) -> Receiver<VideoFrame> {
        self.rx.clone()
    }

    /// Discard frames left over from a previous take
    pub fn drain(&self) -> usize {
        self.rx.try_iter().count()
    }

    /// Frames dropped because the encoder fell behind
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Surface for FrameQueueSurface {
    fn label(&self) -> &str {
        &self.label
    }

    fn submit_frame(&self, frame: &VideoFrame) -> bool {
        if self.is_released() {
            return false;
        }
        match self.tx.try_send(frame.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    fn is_valid(&self) -> bool {
        !self.is_released()
    }
}

impl InputSurface for FrameQueueSurface {
    fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
        self.drain();
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    fn frames(&self) -> Option<Receiver<VideoFrame>> {
        Some(self.receiver())
    }

    fn as_surface(self: Arc<Self>) -> Arc<dyn Surface> {
        self
    }
}

/// Copy frames from the queue to FFmpeg until `running` clears or the queue closes
///
/// FFmpeg reads a raw stream of fixed-size frames, so the first frame whose
/// format or size differs from the configured one ends the take with
/// `InvalidData`.
pub fn pump_frames<W: Write>(
    rx: &Receiver<VideoFrame>,
    out: &mut W,
    format: PixelFormat,
    width: u32,
    height: u32,
    running: &AtomicBool,
) -> io::Result<u64> {
    let expected_size = format.frame_size(width, height);
    let mut written = 0u64;
    loop {
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(frame) => {
                if frame.format != format || frame.data.len() != expected_size {
                    tracing::error!(
                        "Camera delivered {}x{} {:?} frames, encoder expects {}x{} {:?}",
                        frame.width,
                        frame.height,
                        frame.format,
                        width,
                        height,
                        format
                    );
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!(
                            "frame {}x{} {:?} does not match {}x{} {:?}",
                            frame.width, frame.height, frame.format, width, height, format
                        ),
                    ));
                }
                out.write_all(&frame.data)?;
                written += 1;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        if !running.load(Ordering::SeqCst) {
            break;
        }
    }
    Ok(written)
}

/// Build the FFmpeg command line for one take
pub fn build_ffmpeg_args(
    settings: &EncoderSettings,
    pixel_format: PixelFormat,
    audio: Option<&AudioInput>,
    orientation: i32,
) -> Vec<String> {
    let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-nostats", "-y"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let mut push = |values: &[&str]| args.extend(values.iter().map(|s| s.to_string()));

    let video_size = format!("{}x{}", settings.width, settings.height);
    let fps = settings.frame_rate().map(|fps| fps.to_string());
    let video_bit_rate = format!("{}k", settings.video_bit_rate / 1000);
    let audio_bit_rate = format!("{}k", settings.audio_bit_rate / 1000);
    let sample_rate = settings.audio_sample_rate.to_string();
    let channels = settings.audio_channels.to_string();
    let rotate = format!("rotate={orientation}");

    // Video from the frame queue on stdin
    push(&["-f", "rawvideo", "-pixel_format", pixel_format.ffmpeg_name()]);
    push(&["-video_size", video_size.as_str()]);
    if let Some(fps) = fps.as_deref() {
        push(&["-framerate", fps]);
    }
    push(&["-i", "pipe:0"]);

    if let Some(audio) = audio {
        push(&["-f", audio.format.as_str(), "-i", audio.device.as_str()]);
        push(&["-map", "0:v:0", "-map", "1:a:0"]);
    }

    push(&["-c:v", "libx264", "-pix_fmt", "yuv420p"]);
    push(&["-b:v", video_bit_rate.as_str()]);
    if let Some(fps) = fps.as_deref() {
        push(&["-r", fps]);
    }

    if audio.is_some() {
        push(&["-c:a", "libfdk_aac", "-profile:a", "aac_he"]);
        push(&["-b:a", audio_bit_rate.as_str()]);
        push(&["-ar", sample_rate.as_str()]);
        push(&["-ac", channels.as_str()]);
    }

    if orientation != 0 {
        push(&["-metadata:s:v:0", rotate.as_str()]);
    }

    // Stop when the video pipe closes; the mic would run forever otherwise
    push(&["-shortest"]);
    // stdout is not seekable, so write fragmented MP4
    push(&["-movflags", "frag_keyframe+empty_moov+default_base_moof"]);
    push(&["-f", "mp4", "pipe:1"]);

    args
}

/// Creates FFmpeg encoders and the frame queue they read from
pub struct FfmpegEncoderFactory {
    ffmpeg_path: PathBuf,
    audio: Option<AudioInput>,
    pixel_format: PixelFormat,
    queue_depth: usize,
}

impl FfmpegEncoderFactory {
    pub fn new() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            audio: Some(AudioInput::default()),
            pixel_format: PixelFormat::Rgb24,
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }

    pub fn with_ffmpeg_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffmpeg_path = path.into();
        self
    }

    /// Microphone device, or `None` to record video only
    pub fn with_audio_input(mut self, audio: Option<AudioInput>) -> Self {
        self.audio = audio;
        self
    }

    pub fn with_pixel_format(mut self, format: PixelFormat) -> Self {
        self.pixel_format = format;
        self
    }

    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }

    /// Check if FFmpeg can be executed
    pub fn is_available(&self) -> bool {
        Command::new(&self.ffmpeg_path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

impl Default for FfmpegEncoderFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl EncoderFactory for FfmpegEncoderFactory {
    fn create_input_surface(&self) -> Result<Arc<dyn InputSurface>, EncoderError> {
        Ok(Arc::new(FrameQueueSurface::new(
            "encoder-input",
            self.queue_depth,
        )))
    }

    fn create_encoder(&self) -> Box<dyn MediaEncoder> {
        Box::new(self.build_encoder())
    }
}

impl FfmpegEncoderFactory {
    fn build_encoder(&self) -> FfmpegEncoder {
        FfmpegEncoder {
            ffmpeg_path: self.ffmpeg_path.clone(),
            audio: self.audio.clone(),
            pixel_format: self.pixel_format,
            frames: None,
            stage: EncoderStage::Created,
            settings: None,
            output: None,
            orientation: 0,
            process: None,
            writer: None,
            running: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// One take's FFmpeg process
pub struct FfmpegEncoder {
    ffmpeg_path: PathBuf,
    audio: Option<AudioInput>,
    pixel_format: PixelFormat,
    frames: Option<Receiver<VideoFrame>>,
    stage: EncoderStage,
    settings: Option<EncoderSettings>,
    output: Option<File>,
    orientation: i32,
    process: Option<Child>,
    writer: Option<JoinHandle<std::io::Result<u64>>>,
    running: Arc<AtomicBool>,
}

impl FfmpegEncoder {
    fn expect_stage(&self, op: &'static str, expected: EncoderStage) -> Result<(), EncoderError> {
        if self.stage == expected {
            Ok(())
        } else {
            Err(EncoderError::IllegalState {
                op,
                stage: self.stage,
            })
        }
    }

    /// Wait for the writer thread, returning why it failed if it did
    async fn join_writer(&mut self) -> Result<u64, String> {
        let Some(handle) = self.writer.take() else {
            return Ok(0);
        };
        match tokio::task::spawn_blocking(move || handle.join()).await {
            Ok(Ok(Ok(frames))) => {
                tracing::debug!("Encoder writer finished after {} frames", frames);
                Ok(frames)
            }
            Ok(Ok(Err(e))) => {
                tracing::warn!("Encoder writer stopped early: {}", e);
                Err(e.to_string())
            }
            Ok(Err(_)) => {
                tracing::error!("Encoder writer thread panicked");
                Err("writer thread panicked".to_string())
            }
            Err(e) => {
                tracing::error!("Failed to join encoder writer: {}", e);
                Err(e.to_string())
            }
        }
    }
}

#[async_trait]
impl MediaEncoder for FfmpegEncoder {
    fn configure(
        &mut self,
        settings: &EncoderSettings,
        surface: Arc<dyn InputSurface>,
        output: File,
    ) -> Result<(), EncoderError> {
        self.expect_stage("configure", EncoderStage::Created)?;

        if surface.is_released() {
            return Err(EncoderError::SurfaceReleased);
        }
        let Some(frames) = surface.frames() else {
            return Err(EncoderError::Configuration(format!(
                "Input surface {} does not expose frames",
                surface.label()
            )));
        };
        if settings.width == 0 || settings.height == 0 {
            return Err(EncoderError::Configuration(format!(
                "Invalid video size {}x{}",
                settings.width, settings.height
            )));
        }

        self.frames = Some(frames);
        self.settings = Some(settings.clone());
        self.output = Some(output);
        self.stage = EncoderStage::Configured;
        Ok(())
    }

    fn set_orientation_hint(&mut self, degrees: i32) -> Result<(), EncoderError> {
        self.expect_stage("set orientation on", EncoderStage::Configured)?;
        if !matches!(degrees, 0 | 90 | 180 | 270) {
            return Err(EncoderError::Configuration(format!(
                "Unsupported orientation hint: {degrees}"
            )));
        }
        self.orientation = degrees;
        Ok(())
    }

    async fn prepare(&mut self) -> Result<(), EncoderError> {
        self.expect_stage("prepare", EncoderStage::Configured)?;

        let settings = self
            .settings
            .as_ref()
            .ok_or_else(|| EncoderError::Prepare("Encoder was not configured".to_string()))?;
        let output = self
            .output
            .take()
            .ok_or_else(|| EncoderError::Prepare("No output file".to_string()))?;

        let args = build_ffmpeg_args(
            settings,
            self.pixel_format,
            self.audio.as_ref(),
            self.orientation,
        );

        let process = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::from(output))
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EncoderError::Prepare(format!("Failed to start FFmpeg: {}", e)))?;

        tracing::info!(
            "Started FFmpeg encoder: {}x{} @ {:?}fps, {} bps video, rotate={}",
            settings.width,
            settings.height,
            settings.frame_rate(),
            settings.video_bit_rate,
            self.orientation
        );

        self.process = Some(process);
        self.stage = EncoderStage::Prepared;
        Ok(())
    }

    async fn start(&mut self) -> Result<(), EncoderError> {
        self.expect_stage("start", EncoderStage::Prepared)?;

        let rx = self
            .frames
            .clone()
            .ok_or_else(|| EncoderError::Start("No frame queue".to_string()))?;
        let settings = self
            .settings
            .as_ref()
            .ok_or_else(|| EncoderError::Start("Encoder was not configured".to_string()))?;
        let mut stdin = self
            .process
            .as_mut()
            .and_then(|p| p.stdin.take())
            .ok_or_else(|| EncoderError::Start("FFmpeg stdin unavailable".to_string()))?;

        let stale = rx.try_iter().count();
        if stale > 0 {
            tracing::debug!("Discarded {} stale frames before start", stale);
        }

        let running = Arc::clone(&self.running);
        let format = self.pixel_format;
        let (width, height) = (settings.width, settings.height);
        running.store(true, Ordering::SeqCst);

        let handle = std::thread::Builder::new()
            .name("ffmpeg-writer".to_string())
            .spawn(move || -> io::Result<u64> {
                let written = pump_frames(&rx, &mut stdin, format, width, height, &running);
                // Dropping stdin signals EOF to FFmpeg
                drop(stdin);
                written
            })
            .map_err(|e| EncoderError::Start(format!("Failed to spawn writer: {}", e)))?;

        self.writer = Some(handle);
        self.stage = EncoderStage::Started;
        tracing::info!("FFmpeg encoder started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), EncoderError> {
        self.expect_stage("stop", EncoderStage::Started)?;

        self.running.store(false, Ordering::SeqCst);
        let writer = self.join_writer().await;
        self.stage = EncoderStage::Stopped;

        let Some(process) = self.process.take() else {
            return Err(EncoderError::Stop("FFmpeg process missing".to_string()));
        };

        let output = tokio::task::spawn_blocking(move || process.wait_with_output())
            .await
            .map_err(|e| EncoderError::Stop(format!("Failed to wait for FFmpeg: {}", e)))??;

        if let Err(reason) = writer {
            return Err(EncoderError::Stop(format!("Frame writer failed: {}", reason)));
        }
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EncoderError::Stop(format!(
                "FFmpeg exited with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        tracing::info!("FFmpeg encoder stopped");
        Ok(())
    }

    async fn release(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Err(reason) = self.join_writer().await {
            tracing::debug!("Released encoder after writer failure: {}", reason);
        }

        if let Some(mut process) = self.process.take() {
            if let Err(e) = process.kill() {
                tracing::debug!("FFmpeg already exited: {}", e);
            }
            match tokio::task::spawn_blocking(move || process.wait()).await {
                Ok(Ok(status)) => tracing::debug!("FFmpeg exited with {}", status),
                Ok(Err(e)) => tracing::warn!("Failed to reap FFmpeg: {}", e),
                Err(e) => tracing::error!("Failed to join FFmpeg reaper: {}", e),
            }
        }

        self.output = None;
        self.stage = EncoderStage::Released;
    }

    fn stage(&self) -> EncoderStage {
        self.stage
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(mut process) = self.process.take() {
            tracing::warn!("FFmpeg encoder dropped without release");
            let _ = process.kill();
            let _ = process.try_wait();
        }
    }
}
