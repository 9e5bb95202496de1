use crate::error::DeviceAccessError;
use crate::media::MediaPayload;
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

use super::device::{DeviceInfo, DeviceStream, MediaDevice, StreamRequest};

/// Failure the mock should simulate on `open`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    PermissionDenied,
    NoDevice,
}

/// Mock capture device for testing and dry runs without real hardware.
/// Streams synthesize flat JPEG frames at the requested resolution, and
/// an open-stream counter lets tests verify that the camera is held by
/// at most one owner at a time.
pub struct MockMediaDevice {
    devices: Vec<DeviceInfo>,
    failure: Option<MockFailure>,
    open_streams: Arc<AtomicUsize>,
}

impl MockMediaDevice {
    /// Create a mock with one front and one back camera
    pub fn new() -> Self {
        Self {
            devices: vec![
                DeviceInfo {
                    id: "mock-back".to_string(),
                    label: "Mock back camera".to_string(),
                },
                DeviceInfo {
                    id: "mock-front".to_string(),
                    label: "Mock front camera".to_string(),
                },
            ],
            failure: None,
            open_streams: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A device that refuses every `open`
    pub fn failing(failure: MockFailure) -> Self {
        Self {
            devices: Vec::new(),
            failure: Some(failure),
            open_streams: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of streams currently held open against this device
    pub fn open_stream_count(&self) -> usize {
        self.open_streams.load(Ordering::Relaxed)
    }

    /// Shared handle to the open-stream counter
    pub fn open_stream_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.open_streams)
    }
}

impl Default for MockMediaDevice {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaDevice for MockMediaDevice {
    async fn enumerate(&self) -> Result<Vec<DeviceInfo>, DeviceAccessError> {
        Ok(self.devices.clone())
    }

    async fn open(
        &self,
        request: StreamRequest,
    ) -> Result<Box<dyn DeviceStream>, DeviceAccessError> {
        match self.failure {
            Some(MockFailure::PermissionDenied) => {
                return Err(DeviceAccessError::PermissionDenied)
            }
            Some(MockFailure::NoDevice) => {
                return Err(DeviceAccessError::NotFound {
                    device: request.device_id.unwrap_or_else(|| "default".to_string()),
                })
            }
            None => {}
        }

        let device_id = match request.device_id {
            Some(id) => {
                if !self.devices.iter().any(|d| d.id == id) {
                    return Err(DeviceAccessError::NotFound { device: id });
                }
                id
            }
            None => self
                .devices
                .first()
                .map(|d| d.id.clone())
                .ok_or(DeviceAccessError::NotFound {
                    device: "default".to_string(),
                })?,
        };

        debug!(
            "Mock stream opened on '{}' ({}x{}, audio: {})",
            device_id, request.resolution.0, request.resolution.1, request.with_audio
        );

        self.open_streams.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(MockDeviceStream {
            device_id,
            resolution: request.resolution,
            with_audio: request.with_audio,
            released: false,
            frame_counter: 0,
            open_streams: Arc::clone(&self.open_streams),
        }))
    }
}

/// Stream handle produced by [`MockMediaDevice`]
pub struct MockDeviceStream {
    device_id: String,
    resolution: (u32, u32),
    with_audio: bool,
    released: bool,
    frame_counter: u64,
    open_streams: Arc<AtomicUsize>,
}

#[async_trait]
impl DeviceStream for MockDeviceStream {
    async fn read_frame(&mut self) -> Result<MediaPayload, DeviceAccessError> {
        if self.released {
            return Err(DeviceAccessError::Backend {
                details: "stream released".to_string(),
            });
        }

        self.frame_counter += 1;
        let (width, height) = self.resolution;
        // A slowly shifting gray so consecutive frames differ
        let shade = 80 + (self.frame_counter % 64) as u8;
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([shade, shade, shade]));

        let mut buf = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut buf, 85);
        encoder
            .encode_image(&img)
            .map_err(|e| DeviceAccessError::Backend {
                details: e.to_string(),
            })?;

        Ok(MediaPayload::new(buf, width, height))
    }

    fn has_audio(&self) -> bool {
        self.with_audio && !self.released
    }

    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.open_streams.fetch_sub(1, Ordering::Relaxed);
            debug!("Mock stream on '{}' released", self.device_id);
        }
    }
}

impl Drop for MockDeviceStream {
    fn drop(&mut self) {
        self.release();
    }
}
