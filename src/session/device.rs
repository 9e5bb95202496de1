use crate::error::DeviceAccessError;
use crate::media::MediaPayload;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What the session is currently capturing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureMode {
    /// Still photos and documents
    Image,
    /// Barcode scanning (same video track, different consumer)
    Barcode,
    /// Video recording; the only mode that needs an audio track
    Video,
}

impl CaptureMode {
    /// Audio tracks are requested only for video recording
    pub fn requires_audio(&self) -> bool {
        matches!(self, CaptureMode::Video)
    }
}

/// A device stream request
#[derive(Debug, Clone)]
pub struct StreamRequest {
    /// Specific device to open; None lets the backend pick
    pub device_id: Option<String>,
    /// Target resolution (width, height)
    pub resolution: (u32, u32),
    /// Target frame rate
    pub fps: u32,
    /// Whether to acquire an audio track alongside video
    pub with_audio: bool,
}

/// An enumerated capture device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: String,
    pub label: String,
}

/// A camera/device backend. Exactly one stream may be open per logical
/// owner; the session manager enforces that by releasing any held stream
/// before requesting another.
#[async_trait]
pub trait MediaDevice: Send + Sync {
    /// List available capture devices
    async fn enumerate(&self) -> Result<Vec<DeviceInfo>, DeviceAccessError>;

    /// Acquire a new stream. Fails with `PermissionDenied`, `NotFound`,
    /// or `Busy` without leaving anything half-open.
    async fn open(&self, request: StreamRequest)
        -> Result<Box<dyn DeviceStream>, DeviceAccessError>;
}

/// An open device stream holding camera (and possibly audio) tracks.
/// Implementations release their tracks on `release()` and again on drop,
/// so an abandoned handle can never leak the camera.
#[async_trait]
pub trait DeviceStream: Send {
    /// Pull the next encoded frame off the stream
    async fn read_frame(&mut self) -> Result<MediaPayload, DeviceAccessError>;

    /// Whether an audio track was acquired with this stream
    fn has_audio(&self) -> bool;

    /// The device this stream was opened on
    fn device_id(&self) -> &str;

    /// Release all tracks. Idempotent.
    fn release(&mut self);
}
