use crate::error::DeviceAccessError;
use crate::media::MediaPayload;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use gstreamer::prelude::*;
use gstreamer::Pipeline;
use gstreamer_app::AppSink;

use super::device::{DeviceInfo, DeviceStream, MediaDevice, StreamRequest};

/// GStreamer-backed V4L2 capture device
pub struct GstMediaDevice;

impl GstMediaDevice {
    pub fn new() -> Result<Self, DeviceAccessError> {
        gstreamer::init().map_err(|e| DeviceAccessError::Backend {
            details: format!("Failed to initialize GStreamer: {}", e),
        })?;
        Ok(Self)
    }

    fn build_pipeline_string(request: &StreamRequest, device_path: &str) -> String {
        let (width, height) = request.resolution;
        let mut pipeline = format!(
            "v4l2src device={} io-mode=mmap do-timestamp=true ! \
             image/jpeg,width={},height={},framerate={}/1 ! \
             queue max-size-buffers=4 leaky=downstream ! \
             appsink name=sink sync=false max-buffers=10 drop=true emit-signals=false",
            device_path, width, height, request.fps
        );

        // Audio tracks are only acquired for video mode; the samples are
        // consumed by the recorder, not this sink
        if request.with_audio {
            pipeline.push_str(" autoaudiosrc name=mic ! queue ! fakesink sync=false");
        }

        pipeline
    }
}

#[async_trait]
impl MediaDevice for GstMediaDevice {
    async fn enumerate(&self) -> Result<Vec<DeviceInfo>, DeviceAccessError> {
        let mut devices = Vec::new();
        for index in 0..8u32 {
            let path = format!("/dev/video{}", index);
            if std::path::Path::new(&path).exists() {
                devices.push(DeviceInfo {
                    id: path.clone(),
                    label: format!("V4L2 camera {}", index),
                });
            }
        }
        Ok(devices)
    }

    async fn open(
        &self,
        request: StreamRequest,
    ) -> Result<Box<dyn DeviceStream>, DeviceAccessError> {
        let device_path = match &request.device_id {
            Some(id) => {
                if !std::path::Path::new(id).exists() {
                    return Err(DeviceAccessError::NotFound { device: id.clone() });
                }
                id.clone()
            }
            None => self
                .enumerate()
                .await?
                .into_iter()
                .next()
                .map(|d| d.id)
                .ok_or(DeviceAccessError::NotFound {
                    device: "/dev/video*".to_string(),
                })?,
        };

        let pipeline_desc = Self::build_pipeline_string(&request, &device_path);
        info!("Creating GStreamer capture pipeline: {}", pipeline_desc);

        let pipeline = gstreamer::parse::launch(&pipeline_desc)
            .map_err(|e| DeviceAccessError::Backend {
                details: format!("Failed to create pipeline: {}", e),
            })?
            .downcast::<Pipeline>()
            .map_err(|_| DeviceAccessError::Backend {
                details: "Failed to downcast to Pipeline".to_string(),
            })?;

        let appsink = pipeline
            .by_name("sink")
            .and_then(|e| e.downcast::<AppSink>().ok())
            .ok_or(DeviceAccessError::Backend {
                details: "Failed to get appsink element".to_string(),
            })?;

        let (tx, rx) = mpsc::channel::<Vec<u8>>(8);
        appsink.set_callbacks(
            gstreamer_app::AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    let sample = appsink
                        .pull_sample()
                        .map_err(|_| gstreamer::FlowError::Eos)?;
                    if let Some(buffer) = sample.buffer() {
                        if let Ok(map) = buffer.map_readable() {
                            let _ = tx.try_send(map.as_slice().to_vec());
                        }
                    }
                    Ok(gstreamer::FlowSuccess::Ok)
                })
                .build(),
        );

        if let Err(e) = pipeline.set_state(gstreamer::State::Playing) {
            let _ = pipeline.set_state(gstreamer::State::Null);
            // A device already held elsewhere refuses the state change
            return Err(DeviceAccessError::Busy {
                device: format!("{} ({})", device_path, e),
            });
        }

        debug!("GStreamer capture pipeline playing on {}", device_path);

        Ok(Box::new(GstDeviceStream {
            pipeline: Some(pipeline),
            frames: rx,
            device_id: device_path,
            resolution: request.resolution,
            with_audio: request.with_audio,
        }))
    }
}

/// Stream handle over a playing GStreamer pipeline
pub struct GstDeviceStream {
    pipeline: Option<Pipeline>,
    frames: mpsc::Receiver<Vec<u8>>,
    device_id: String,
    resolution: (u32, u32),
    with_audio: bool,
}

#[async_trait]
impl DeviceStream for GstDeviceStream {
    async fn read_frame(&mut self) -> Result<MediaPayload, DeviceAccessError> {
        if self.pipeline.is_none() {
            return Err(DeviceAccessError::Backend {
                details: "stream released".to_string(),
            });
        }

        let data = self
            .frames
            .recv()
            .await
            .ok_or(DeviceAccessError::Backend {
                details: "capture pipeline stopped producing frames".to_string(),
            })?;

        Ok(MediaPayload::new(data, self.resolution.0, self.resolution.1))
    }

    fn has_audio(&self) -> bool {
        self.with_audio && self.pipeline.is_some()
    }

    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn release(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            if let Err(e) = pipeline.set_state(gstreamer::State::Null) {
                warn!("Failed to stop capture pipeline: {}", e);
            }
            debug!("GStreamer stream on {} released", self.device_id);
        }
    }
}

impl Drop for GstDeviceStream {
    fn drop(&mut self) {
        self.release();
    }
}
