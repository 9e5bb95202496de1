use crate::buffer::ItemBuffer;
use crate::compress;
use crate::config::ValuescanConfig;
use crate::error::{FrameExtractionError, Result, SubmissionError, ValuescanError};
use crate::events::{EventBus, ScanEvent};
use crate::ghost::{GeolocationProvider, GhostMode, GhostOutcome, HandlingWindow, StoreInfo};
use crate::media::{CapturedItem, DocumentType, ItemMetadata, MediaKind, MediaPayload};
use crate::session::{CaptureMode, CaptureSessionManager, MediaDevice};
use crate::submit::{AnalysisApi, AnalysisVerdict, RequestAssembler};
use crate::upload::{DurableStore, UploadOrchestrator};
use crate::video::{FrameDecoder, FrameExtractor};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of a completed submission
#[derive(Debug)]
pub struct SubmissionOutcome {
    pub verdict: AnalysisVerdict,
    pub durable_urls: Vec<String>,
    /// Arbitrage economics, present when Ghost Mode was ready and the
    /// service produced a valuation
    pub ghost_outcome: Option<GhostOutcome>,
}

/// An in-progress video recording
struct RecordingTask {
    token: CancellationToken,
    handle: JoinHandle<Vec<MediaPayload>>,
}

/// The capture-and-submission pipeline, wired end to end. Owns the
/// exclusive camera stream, the item buffer, and the Ghost Mode draft;
/// closing the session is the single cancellation signal for all of them.
pub struct ScannerSession {
    config: ValuescanConfig,
    manager: Arc<Mutex<CaptureSessionManager>>,
    buffer: ItemBuffer,
    ghost: GhostMode,
    extractor: FrameExtractor,
    uploader: UploadOrchestrator,
    analysis: Arc<dyn AnalysisApi>,
    assembler: RequestAssembler,
    event_bus: Arc<EventBus>,
    owner_id: String,
    recording: Option<RecordingTask>,
    capture_counter: u64,
}

impl ScannerSession {
    pub fn builder() -> ScannerSessionBuilder {
        ScannerSessionBuilder::new()
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn buffer(&self) -> &ItemBuffer {
        &self.buffer
    }

    pub fn ghost(&self) -> &GhostMode {
        &self.ghost
    }

    /// Open the camera stream and begin a capture session
    pub async fn start_session(&mut self, device_id: Option<&str>) -> Result<()> {
        self.manager
            .lock()
            .await
            .start(device_id, CaptureMode::Image)
            .await
    }

    /// Tear the session down: abort any in-progress recording, release
    /// the camera, drop the item buffer, and discard the Ghost draft.
    pub async fn stop_session(&mut self, reason: &str) {
        info!("Closing capture session: {}", reason);

        if let Some(recording) = self.recording.take() {
            recording.token.cancel();
            recording.handle.abort();
            debug!("Aborted in-progress recording");
        }

        self.manager.lock().await.stop();
        self.buffer.clear();
        self.ghost.reset();

        self.event_bus.publish(ScanEvent::SessionClosed {
            reason: reason.to_string(),
            timestamp: SystemTime::now(),
        });
    }

    pub async fn switch_device(&mut self, device_id: &str) -> Result<()> {
        self.manager.lock().await.switch_device(device_id).await
    }

    pub async fn switch_mode(&mut self, mode: CaptureMode) -> Result<()> {
        self.manager.lock().await.switch_mode(mode).await
    }

    /// Capture a still photo off the live stream
    pub async fn capture_photo(&mut self, name: Option<String>) -> Result<Uuid> {
        let frame = self.manager.lock().await.grab_frame().await?;
        let name = name.unwrap_or_else(|| self.next_name("Photo"));
        self.ingest_image(MediaKind::Photo, name, frame, None)
    }

    /// Capture supporting paperwork. Certificates become their own kind;
    /// everything else is a document with its type recorded.
    pub async fn capture_document(
        &mut self,
        document_type: DocumentType,
        name: Option<String>,
    ) -> Result<Uuid> {
        let frame = self.manager.lock().await.grab_frame().await?;
        let kind = match document_type {
            DocumentType::Certificate => MediaKind::Certificate,
            _ => MediaKind::Document,
        };
        let name = name.unwrap_or_else(|| self.next_name("Document"));
        self.ingest_image(kind, name, frame, Some(document_type))
    }

    /// Import a file from the gallery, bypassing the live camera
    pub fn upload_file(&mut self, name: String, bytes: Vec<u8>) -> Result<Uuid> {
        self.ingest_image(MediaKind::Photo, name, MediaPayload::from_bytes(bytes), None)
    }

    /// Begin recording. Switches the stream into video mode (acquiring
    /// the audio track) and pumps frames until stopped or cancelled.
    pub async fn start_video_recording(&mut self) -> Result<()> {
        if self.recording.is_some() {
            return Err(ValuescanError::system("a recording is already in progress"));
        }

        self.manager.lock().await.switch_mode(CaptureMode::Video).await?;

        let manager = Arc::clone(&self.manager);
        let token = CancellationToken::new();
        let child = token.clone();
        let fps = self.config.camera.fps.max(1);

        let handle = tokio::spawn(async move {
            let mut frames = Vec::new();
            let mut interval =
                tokio::time::interval(Duration::from_millis((1000 / fps as u64).max(1)));
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = interval.tick() => {
                        let mut mgr = manager.lock().await;
                        match mgr.grab_frame().await {
                            Ok(frame) => frames.push(frame),
                            Err(e) => {
                                warn!("Recording frame read failed; stopping: {}", e);
                                break;
                            }
                        }
                    }
                }
            }
            frames
        });

        info!("Video recording started");
        self.recording = Some(RecordingTask { token, handle });
        Ok(())
    }

    /// Finish recording and buffer the clip as a captured item. The clip
    /// payload submitted for analysis is always a still frame; the raw
    /// recording only ever travels to durable storage.
    pub async fn stop_video_recording(&mut self, name: Option<String>) -> Result<Uuid> {
        let recording = self
            .recording
            .take()
            .ok_or_else(|| ValuescanError::system("no recording in progress"))?;

        recording.token.cancel();
        let frames = recording
            .handle
            .await
            .map_err(|e| ValuescanError::component("recorder", &e.to_string()))?;

        if frames.is_empty() {
            return Err(FrameExtractionError::Load {
                details: "recording produced no frames".to_string(),
            }
            .into());
        }

        info!("Recording stopped after {} frames", frames.len());

        // The recorded clip is an MJPEG byte stream of the pumped frames
        let clip: Vec<u8> = frames
            .iter()
            .flat_map(|f| f.data.iter().copied())
            .collect();

        let thumbnail = match self.extractor.thumbnail(&clip).await {
            Ok(thumb) => thumb,
            Err(e) => {
                // Extraction failure never fails the capture; fall back to
                // a preview of the last recorded frame
                warn!("Clip thumbnail extraction failed: {}", e);
                let last = frames.last().expect("frames checked non-empty");
                compress::make_thumbnail(&last.data, self.config.video.thumbnail_px)?
            }
        };

        let extracted = self
            .extractor
            .extract_frames(&clip, self.config.video.frame_count)
            .await;

        let mut video_frames = Vec::with_capacity(extracted.len());
        for frame in &extracted {
            match compress::compress(&frame.data, &self.config.compression) {
                Ok(outcome) => video_frames.push(outcome.payload),
                Err(e) => warn!("Skipping uncompressible extracted frame: {}", e),
            }
        }

        // Payload must be a still frame; prefer the first extracted frame,
        // fall back to the thumbnail
        let payload = video_frames
            .first()
            .cloned()
            .unwrap_or_else(|| thumbnail.clone());

        let original_len = clip.len() as u64;
        let item = CapturedItem::new(
            MediaKind::Video,
            name.unwrap_or_else(|| self.next_name("Video")),
            payload,
            MediaPayload::from_bytes(clip),
            thumbnail,
            ItemMetadata {
                document_type: None,
                video_frames,
                original_size: Some(original_len),
                compressed_size: None,
            },
        );

        Ok(self.buffer_item(item))
    }

    /// Toggle the Ghost Mode arbitrage overlay
    pub async fn toggle_ghost_mode(&mut self, enabled: bool) -> Result<()> {
        match self.ghost.toggle(enabled).await {
            Ok(()) => {
                if let Some(fix) = self.ghost.location() {
                    if enabled {
                        self.event_bus.publish(ScanEvent::GhostLocationAcquired {
                            accuracy_m: fix.accuracy_m,
                            timestamp: SystemTime::now(),
                        });
                    }
                }
                Ok(())
            }
            Err(e) => {
                self.event_bus.publish(ScanEvent::GhostLocationFailed {
                    details: e.to_string(),
                    timestamp: SystemTime::now(),
                });
                Err(e.into())
            }
        }
    }

    pub fn set_ghost_store(&mut self, store: StoreInfo) {
        self.ghost.set_store(store);
    }

    pub fn set_ghost_shelf_price(&mut self, shelf_price: f64) {
        self.ghost.set_shelf_price(shelf_price);
    }

    pub fn set_ghost_handling(&mut self, handling: HandlingWindow) {
        self.ghost.set_handling(handling);
    }

    pub async fn refresh_ghost_location(&mut self) -> Result<()> {
        self.ghost.refresh_location().await.map_err(Into::into)
    }

    pub fn toggle_select(&mut self, id: Uuid) {
        self.buffer.toggle_select(id);
    }

    pub fn select_all(&mut self) {
        self.buffer.select_all();
    }

    pub fn deselect_all(&mut self) {
        self.buffer.deselect_all();
    }

    pub fn remove_item(&mut self, id: Uuid) -> Option<CapturedItem> {
        self.buffer.remove(id)
    }

    pub fn clear_items(&mut self) {
        self.buffer.clear();
    }

    /// Submit the current selection for valuation.
    ///
    /// Validation happens before any network traffic: an empty selection
    /// or an enabled-but-unready Ghost overlay is rejected immediately.
    /// Original payloads then go to durable storage (tolerating per-item
    /// failure), and the compressed selection goes to the analysis
    /// service in a single request.
    pub async fn submit(&mut self, category: &str, subcategory: &str) -> Result<SubmissionOutcome> {
        let selected: Vec<CapturedItem> =
            self.buffer.selected().into_iter().cloned().collect();

        if selected.is_empty() {
            return Err(SubmissionError::EmptySelection.into());
        }
        if self.ghost.is_enabled() && !self.ghost.is_ready() {
            return Err(SubmissionError::GhostNotReady.into());
        }

        let durable_urls = self.uploader.upload_all(&selected, &self.owner_id).await;

        let refs: Vec<&CapturedItem> = selected.iter().collect();
        let request = self.assembler.assemble(
            &refs,
            durable_urls.clone(),
            &self.ghost,
            category,
            subcategory,
        )?;

        let verdict = self
            .analysis
            .analyze(&request)
            .await
            .map_err(ValuescanError::from)?;

        let ghost_outcome = self.ghost.compute_outcome(verdict.estimated_value);
        if let Some(outcome) = &ghost_outcome {
            info!(
                "Ghost outcome: margin {:.2} ({:.0}%), velocity {:?}",
                outcome.estimated_margin, outcome.margin_percent, outcome.velocity
            );
        }

        Ok(SubmissionOutcome {
            verdict,
            durable_urls,
            ghost_outcome,
        })
    }

    fn next_name(&mut self, prefix: &str) -> String {
        self.capture_counter += 1;
        format!("{} {}", prefix, self.capture_counter)
    }

    /// Compress, thumbnail, and buffer one still capture. A compression
    /// failure aborts this capture only.
    fn ingest_image(
        &mut self,
        kind: MediaKind,
        name: String,
        original: MediaPayload,
        document_type: Option<DocumentType>,
    ) -> Result<Uuid> {
        let outcome = compress::compress(&original.data, &self.config.compression)?;
        let thumbnail = compress::make_thumbnail(&original.data, self.config.video.thumbnail_px)
            .unwrap_or_else(|_| outcome.payload.clone());

        let item = CapturedItem::new(
            kind,
            name,
            outcome.payload,
            original,
            thumbnail,
            ItemMetadata {
                document_type,
                video_frames: Vec::new(),
                original_size: Some(outcome.original_size_bytes),
                compressed_size: Some(outcome.compressed_size_bytes),
            },
        );

        Ok(self.buffer_item(item))
    }

    fn buffer_item(&mut self, item: CapturedItem) -> Uuid {
        let id = item.id;
        let evicted = self.buffer.add(item);

        self.event_bus.publish(ScanEvent::ItemCaptured {
            item_id: id,
            timestamp: SystemTime::now(),
        });
        if let Some(old) = evicted {
            self.event_bus.publish(ScanEvent::ItemEvicted {
                item_id: old.id,
                timestamp: SystemTime::now(),
            });
        }

        id
    }
}

/// Builder wiring the pipeline's collaborators together
pub struct ScannerSessionBuilder {
    config: Option<ValuescanConfig>,
    device: Option<Arc<dyn MediaDevice>>,
    decoder: Option<Box<dyn FrameDecoder>>,
    store: Option<Arc<dyn DurableStore>>,
    analysis: Option<Arc<dyn AnalysisApi>>,
    geolocation: Option<Arc<dyn GeolocationProvider>>,
    owner_id: Option<String>,
}

impl ScannerSessionBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            device: None,
            decoder: None,
            store: None,
            analysis: None,
            geolocation: None,
            owner_id: None,
        }
    }

    pub fn config(mut self, config: ValuescanConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn device(mut self, device: Arc<dyn MediaDevice>) -> Self {
        self.device = Some(device);
        self
    }

    pub fn decoder(mut self, decoder: Box<dyn FrameDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn store(mut self, store: Arc<dyn DurableStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn analysis(mut self, analysis: Arc<dyn AnalysisApi>) -> Self {
        self.analysis = Some(analysis);
        self
    }

    pub fn geolocation(mut self, provider: Arc<dyn GeolocationProvider>) -> Self {
        self.geolocation = Some(provider);
        self
    }

    pub fn owner_id<S: Into<String>>(mut self, owner_id: S) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    pub fn build(self) -> Result<ScannerSession> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let device = self
            .device
            .ok_or_else(|| ValuescanError::system("scanner session requires a media device"))?;
        let decoder = self
            .decoder
            .ok_or_else(|| ValuescanError::system("scanner session requires a frame decoder"))?;
        let store = self
            .store
            .ok_or_else(|| ValuescanError::system("scanner session requires a durable store"))?;
        let analysis = self
            .analysis
            .ok_or_else(|| ValuescanError::system("scanner session requires an analysis client"))?;
        let geolocation = self.geolocation.ok_or_else(|| {
            ValuescanError::system("scanner session requires a geolocation provider")
        })?;
        let owner_id = self
            .owner_id
            .ok_or_else(|| ValuescanError::system("scanner session requires an owner id"))?;

        let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));

        Ok(ScannerSession {
            manager: Arc::new(Mutex::new(CaptureSessionManager::new(
                device,
                config.camera.clone(),
            ))),
            buffer: ItemBuffer::new(config.buffer.capacity),
            ghost: GhostMode::new(config.ghost.clone(), geolocation),
            extractor: FrameExtractor::new(decoder),
            uploader: UploadOrchestrator::new(store, Arc::clone(&event_bus)),
            analysis,
            assembler: RequestAssembler::new(config.compression.clone()),
            event_bus,
            owner_id,
            recording: None,
            capture_counter: 0,
            config,
        })
    }
}

impl Default for ScannerSessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}
