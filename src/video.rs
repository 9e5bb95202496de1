use crate::error::FrameExtractionError;
use crate::media::MediaPayload;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// A decode element that can seek a loaded clip and hand back the frame
/// under the playhead. There is exactly one of these per extractor; seeks
/// are inherently stateful, so overlapping seeks are not supported and the
/// extractor serializes all access.
#[async_trait]
pub trait FrameDecoder: Send {
    /// Load a recorded clip, replacing any previously loaded one.
    /// Returns the clip duration.
    async fn load(&mut self, video: &[u8]) -> Result<Duration, FrameExtractionError>;

    /// Seek to `position` and decode the frame there, encoded as JPEG.
    /// Completes only once the seek has landed.
    async fn seek_to(&mut self, position: Duration) -> Result<MediaPayload, FrameExtractionError>;
}

/// Pulls representative still frames out of recorded video using a single
/// shared decode element.
pub struct FrameExtractor {
    decoder: Mutex<Box<dyn FrameDecoder>>,
}

impl FrameExtractor {
    pub fn new(decoder: Box<dyn FrameDecoder>) -> Self {
        Self {
            decoder: Mutex::new(decoder),
        }
    }

    /// Extract `frame_count` frames at evenly spaced positions
    /// `0, D/N, 2D/N, ...`, strictly in that order. Each seek completes
    /// before the next one is issued.
    ///
    /// Extraction is all-or-nothing: a load or seek failure yields an
    /// empty list, never a partially-ordered one. Failure here does not
    /// fail the capture; the caller keeps the item with whatever
    /// thumbnail it already has.
    pub async fn extract_frames(&self, video: &[u8], frame_count: u32) -> Vec<MediaPayload> {
        if frame_count == 0 {
            return Vec::new();
        }

        let mut decoder = self.decoder.lock().await;

        let duration = match decoder.load(video).await {
            Ok(d) => d,
            Err(e) => {
                warn!("Video load failed; skipping frame extraction: {}", e);
                return Vec::new();
            }
        };

        let interval = duration / frame_count;
        debug!(
            "Extracting {} frames at {:?} intervals from a {:?} clip",
            frame_count, interval, duration
        );

        let mut frames = Vec::with_capacity(frame_count as usize);
        for i in 0..frame_count {
            let position = interval * i;
            match decoder.seek_to(position).await {
                Ok(frame) => frames.push(frame),
                Err(e) => {
                    warn!(
                        "Seek to {:?} failed; discarding partial extraction: {}",
                        position, e
                    );
                    return Vec::new();
                }
            }
        }

        frames
    }

    /// The frame at the midpoint of the clip, used as the item preview.
    pub async fn thumbnail(&self, video: &[u8]) -> Result<MediaPayload, FrameExtractionError> {
        let mut decoder = self.decoder.lock().await;
        let duration = decoder.load(video).await?;
        decoder.seek_to(duration / 2).await
    }
}

/// In-memory decoder used by tests and dry runs. Pretends every clip has
/// a fixed duration and fabricates single-color frames. The seek log is
/// shared so callers can verify ordering after handing the decoder to an
/// extractor.
pub struct MockFrameDecoder {
    duration: Duration,
    loaded: bool,
    fail_load: bool,
    seek_log: std::sync::Arc<std::sync::Mutex<Vec<Duration>>>,
}

impl MockFrameDecoder {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            loaded: false,
            fail_load: false,
            seek_log: std::sync::Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    /// A decoder whose load always fails, for exercising the
    /// all-or-nothing path.
    pub fn failing() -> Self {
        Self {
            duration: Duration::ZERO,
            loaded: false,
            fail_load: true,
            seek_log: std::sync::Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    /// Handle onto the log of seek positions, in issue order.
    pub fn seek_log(&self) -> std::sync::Arc<std::sync::Mutex<Vec<Duration>>> {
        std::sync::Arc::clone(&self.seek_log)
    }
}

#[async_trait]
impl FrameDecoder for MockFrameDecoder {
    async fn load(&mut self, video: &[u8]) -> Result<Duration, FrameExtractionError> {
        if self.fail_load || video.is_empty() {
            return Err(FrameExtractionError::Load {
                details: "unreadable clip".to_string(),
            });
        }
        self.loaded = true;
        self.seek_log.lock().unwrap().clear();
        Ok(self.duration)
    }

    async fn seek_to(&mut self, position: Duration) -> Result<MediaPayload, FrameExtractionError> {
        if !self.loaded {
            return Err(FrameExtractionError::Seek {
                position_ms: position.as_millis() as u64,
                details: "no clip loaded".to_string(),
            });
        }
        self.seek_log.lock().unwrap().push(position);

        let img = image::RgbImage::from_pixel(64, 48, image::Rgb([90, 90, 90]));
        let mut buf = Vec::new();
        let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, 70);
        encoder
            .encode_image(&img)
            .map_err(|e| FrameExtractionError::Seek {
                position_ms: position.as_millis() as u64,
                details: e.to_string(),
            })?;
        Ok(MediaPayload::new(buf, 64, 48))
    }
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub use gst::GstFrameDecoder;

#[cfg(all(feature = "hardware", target_os = "linux"))]
mod gst {
    use super::*;
    use gstreamer::prelude::*;
    use gstreamer::{Pipeline, SeekFlags, State};
    use gstreamer_app::AppSink;
    use std::path::PathBuf;

    /// GStreamer-backed decoder. The clip is spooled to a temp file and
    /// decoded through a paused pipeline; each seek is flushing and the
    /// frame is pulled from the appsink preroll.
    pub struct GstFrameDecoder {
        pipeline: Option<Pipeline>,
        spool_path: Option<PathBuf>,
        duration: Duration,
    }

    impl GstFrameDecoder {
        pub fn new() -> Result<Self, FrameExtractionError> {
            gstreamer::init().map_err(|e| FrameExtractionError::Load {
                details: format!("Failed to initialize GStreamer: {}", e),
            })?;
            Ok(Self {
                pipeline: None,
                spool_path: None,
                duration: Duration::ZERO,
            })
        }

        fn teardown(&mut self) {
            if let Some(pipeline) = self.pipeline.take() {
                let _ = pipeline.set_state(State::Null);
            }
            if let Some(path) = self.spool_path.take() {
                let _ = std::fs::remove_file(path);
            }
        }

        fn appsink(&self) -> Result<AppSink, FrameExtractionError> {
            self.pipeline
                .as_ref()
                .and_then(|p| p.by_name("sink"))
                .and_then(|e| e.downcast::<AppSink>().ok())
                .ok_or_else(|| FrameExtractionError::Load {
                    details: "appsink not available".to_string(),
                })
        }
    }

    impl Drop for GstFrameDecoder {
        fn drop(&mut self) {
            self.teardown();
        }
    }

    #[async_trait]
    impl FrameDecoder for GstFrameDecoder {
        async fn load(&mut self, video: &[u8]) -> Result<Duration, FrameExtractionError> {
            self.teardown();

            let path = std::env::temp_dir().join(format!("valuescan-{}.clip", uuid::Uuid::new_v4()));
            tokio::fs::write(&path, video)
                .await
                .map_err(|e| FrameExtractionError::Load {
                    details: format!("Failed to spool clip: {}", e),
                })?;

            let pipeline_desc = format!(
                "filesrc location={} ! decodebin ! videoconvert ! video/x-raw,format=RGB ! \
                 appsink name=sink sync=false max-buffers=1",
                path.to_string_lossy()
            );

            let pipeline = gstreamer::parse::launch(&pipeline_desc)
                .map_err(|e| FrameExtractionError::Load {
                    details: format!("Failed to create pipeline: {}", e),
                })?
                .downcast::<Pipeline>()
                .map_err(|_| FrameExtractionError::Load {
                    details: "Failed to downcast to Pipeline".to_string(),
                })?;

            pipeline
                .set_state(State::Paused)
                .map_err(|e| FrameExtractionError::Load {
                    details: format!("Failed to pause pipeline: {}", e),
                })?;

            // Wait for preroll so duration queries are answerable
            let (result, _, _) = pipeline.state(gstreamer::ClockTime::from_seconds(10));
            result.map_err(|e| FrameExtractionError::Load {
                details: format!("Pipeline failed to preroll: {}", e),
            })?;

            let duration = pipeline
                .query_duration::<gstreamer::ClockTime>()
                .ok_or_else(|| FrameExtractionError::Load {
                    details: "Clip duration unavailable".to_string(),
                })?;

            self.pipeline = Some(pipeline);
            self.spool_path = Some(path);
            self.duration = Duration::from_nanos(duration.nseconds());
            Ok(self.duration)
        }

        async fn seek_to(
            &mut self,
            position: Duration,
        ) -> Result<MediaPayload, FrameExtractionError> {
            let position_ms = position.as_millis() as u64;
            let pipeline =
                self.pipeline
                    .as_ref()
                    .ok_or_else(|| FrameExtractionError::Seek {
                        position_ms,
                        details: "no clip loaded".to_string(),
                    })?;

            pipeline
                .seek_simple(
                    SeekFlags::FLUSH | SeekFlags::ACCURATE,
                    gstreamer::ClockTime::from_nseconds(position.as_nanos() as u64),
                )
                .map_err(|e| FrameExtractionError::Seek {
                    position_ms,
                    details: e.to_string(),
                })?;

            let appsink = self.appsink().map_err(|e| FrameExtractionError::Seek {
                position_ms,
                details: e.to_string(),
            })?;

            let sample = appsink
                .pull_preroll()
                .map_err(|_| FrameExtractionError::Seek {
                    position_ms,
                    details: "preroll unavailable after seek".to_string(),
                })?;

            let caps = sample.caps().ok_or_else(|| FrameExtractionError::Seek {
                position_ms,
                details: "sample missing caps".to_string(),
            })?;
            let s = caps.structure(0).ok_or_else(|| FrameExtractionError::Seek {
                position_ms,
                details: "caps missing structure".to_string(),
            })?;
            let width = s.get::<i32>("width").unwrap_or(0) as u32;
            let height = s.get::<i32>("height").unwrap_or(0) as u32;

            let buffer = sample.buffer().ok_or_else(|| FrameExtractionError::Seek {
                position_ms,
                details: "sample missing buffer".to_string(),
            })?;
            let map = buffer.map_readable().map_err(|_| FrameExtractionError::Seek {
                position_ms,
                details: "buffer not readable".to_string(),
            })?;

            let img = image::RgbImage::from_raw(width, height, map.as_slice().to_vec())
                .ok_or_else(|| FrameExtractionError::Seek {
                    position_ms,
                    details: "frame size mismatch".to_string(),
                })?;

            let mut buf = Vec::new();
            let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, 85);
            encoder
                .encode_image(&img)
                .map_err(|e| FrameExtractionError::Seek {
                    position_ms,
                    details: e.to_string(),
                })?;

            Ok(MediaPayload::new(buf, width, height))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seek_positions_are_evenly_spaced_and_ordered() {
        let decoder = MockFrameDecoder::new(Duration::from_secs(10));
        let log = decoder.seek_log();
        let extractor = FrameExtractor::new(Box::new(decoder));

        let frames = extractor.extract_frames(&[1, 2, 3], 5).await;
        assert_eq!(frames.len(), 5);

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                Duration::from_secs(0),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(6),
                Duration::from_secs(8),
            ]
        );
    }

    #[tokio::test]
    async fn test_load_failure_returns_empty_list() {
        let extractor = FrameExtractor::new(Box::new(MockFrameDecoder::failing()));
        let frames = extractor.extract_frames(&[1, 2, 3], 5).await;
        assert!(frames.is_empty());
    }

    #[tokio::test]
    async fn test_empty_clip_returns_empty_list() {
        let extractor = FrameExtractor::new(Box::new(MockFrameDecoder::new(
            Duration::from_secs(4),
        )));
        let frames = extractor.extract_frames(&[], 3).await;
        assert!(frames.is_empty());
    }

    #[tokio::test]
    async fn test_zero_frame_count_is_a_noop() {
        let extractor = FrameExtractor::new(Box::new(MockFrameDecoder::new(
            Duration::from_secs(4),
        )));
        let frames = extractor.extract_frames(&[1], 0).await;
        assert!(frames.is_empty());
    }

    #[tokio::test]
    async fn test_thumbnail_seeks_to_midpoint() {
        let decoder = MockFrameDecoder::new(Duration::from_secs(8));
        let log = decoder.seek_log();
        let extractor = FrameExtractor::new(Box::new(decoder));

        let thumb = extractor.thumbnail(&[1]).await.unwrap();
        assert!(!thumb.is_empty());
        assert_eq!(*log.lock().unwrap(), vec![Duration::from_secs(4)]);
    }

    #[tokio::test]
    async fn test_thumbnail_on_unreadable_clip_fails() {
        let extractor = FrameExtractor::new(Box::new(MockFrameDecoder::failing()));
        assert!(extractor.thumbnail(&[1]).await.is_err());
    }
}
