use crate::config::CameraConfig;
use crate::error::{DeviceAccessError, Result};
use crate::media::MediaPayload;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::device::{CaptureMode, DeviceStream, MediaDevice, StreamRequest};

/// Lifecycle of the capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No stream held
    Idle,
    /// A stream request is in flight
    Acquiring,
    /// A stream is live
    Active,
    /// Acquisition failed; the caller should close the session
    Error,
}

/// Owns the single active camera stream. The camera is an exclusive
/// resource: any existing stream is stopped before a new one is
/// requested, and teardown always lands back in `Idle`.
pub struct CaptureSessionManager {
    device: Arc<dyn MediaDevice>,
    config: CameraConfig,
    state: SessionState,
    stream: Option<Box<dyn DeviceStream>>,
    mode: CaptureMode,
}

impl CaptureSessionManager {
    pub fn new(device: Arc<dyn MediaDevice>, config: CameraConfig) -> Self {
        Self {
            device,
            config,
            state: SessionState::Idle,
            stream: None,
            mode: CaptureMode::Image,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Acquire a stream, stopping any existing one first. On failure the
    /// manager holds no stream and reports `Error`; the caller must close
    /// the session.
    pub async fn start(&mut self, device_id: Option<&str>, mode: CaptureMode) -> Result<()> {
        // Never two concurrent streams
        self.stop();

        self.state = SessionState::Acquiring;
        self.mode = mode;

        let request = StreamRequest {
            device_id: device_id
                .map(str::to_string)
                .or_else(|| self.config.device_id.clone()),
            resolution: self.config.resolution,
            fps: self.config.fps,
            with_audio: mode.requires_audio(),
        };

        info!(
            "Acquiring camera stream (device: {:?}, {}x{} @ {}fps, audio: {})",
            request.device_id,
            request.resolution.0,
            request.resolution.1,
            request.fps,
            request.with_audio
        );

        match self.device.open(request).await {
            Ok(stream) => {
                info!("Camera stream active on device '{}'", stream.device_id());
                self.stream = Some(stream);
                self.state = SessionState::Active;
                Ok(())
            }
            Err(e) => {
                warn!("Camera acquisition failed: {}", e);
                self.stream = None;
                self.state = SessionState::Error;
                Err(e.into())
            }
        }
    }

    /// Release all tracks. Idempotent; always lands in `Idle`.
    pub fn stop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            debug!("Releasing camera stream on device '{}'", stream.device_id());
            stream.release();
        }
        self.state = SessionState::Idle;
    }

    /// Stop and restart on a different device. Used for front/back flips.
    pub async fn switch_device(&mut self, device_id: &str) -> Result<()> {
        info!("Switching capture device to '{}'", device_id);
        self.start(Some(device_id), self.mode).await
    }

    /// Change the capture mode. The stream is restarted only when the
    /// audio requirement changes; Image <-> Barcode switches keep it.
    pub async fn switch_mode(&mut self, mode: CaptureMode) -> Result<()> {
        if mode == self.mode {
            return Ok(());
        }

        let audio_change = mode.requires_audio() != self.mode.requires_audio();
        let device_id = self
            .stream
            .as_ref()
            .map(|s| s.device_id().to_string());

        if self.is_active() && audio_change {
            debug!(
                "Mode switch {:?} -> {:?} changes the audio requirement; restarting stream",
                self.mode, mode
            );
            return self.start(device_id.as_deref(), mode).await;
        }

        debug!("Mode switch {:?} -> {:?} keeps the current stream", self.mode, mode);
        self.mode = mode;
        Ok(())
    }

    /// Pull the next frame off the active stream
    pub async fn grab_frame(&mut self) -> Result<MediaPayload> {
        let stream = self
            .stream
            .as_mut()
            .ok_or(DeviceAccessError::Backend {
                details: "no active stream".to_string(),
            })?;
        Ok(stream.read_frame().await?)
    }

    /// Whether the current stream carries an audio track
    pub fn has_audio(&self) -> bool {
        self.stream.as_ref().map(|s| s.has_audio()).unwrap_or(false)
    }
}

impl Drop for CaptureSessionManager {
    fn drop(&mut self) {
        self.stop();
    }
}
