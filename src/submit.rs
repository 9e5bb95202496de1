use crate::compress;
use crate::config::CompressionConfig;
use crate::error::SubmissionError;
use crate::ghost::{GeoFix, GhostListing, GhostMode};
use crate::media::{CapturedItem, DocumentType, MediaKind};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Hard ceiling on the whole serialized submission; anything larger is
/// rejected pre-flight as retriable rather than bounced by the service
const TOTAL_PAYLOAD_LIMIT_BYTES: u64 = 20 * 1024 * 1024;

/// Wire body for `POST /api/analyze`
#[derive(Debug, Serialize)]
pub struct AnalyzeRequest {
    #[serde(rename = "scanType")]
    pub scan_type: &'static str,
    #[serde(rename = "originalImageUrls")]
    pub original_image_urls: Vec<String>,
    pub items: Vec<WireItem>,
    pub category_id: String,
    pub subcategory_id: String,
    #[serde(rename = "ghostMode", skip_serializing_if = "Option::is_none")]
    pub ghost_mode: Option<WireGhost>,
}

#[derive(Debug, Serialize)]
pub struct WireItem {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub name: String,
    /// Base64-encoded compressed payload
    pub data: String,
    #[serde(rename = "additionalFrames")]
    pub additional_frames: Vec<String>,
    pub metadata: WireMetadata,
}

#[derive(Debug, Serialize, Default)]
pub struct WireMetadata {
    #[serde(rename = "documentType", skip_serializing_if = "Option::is_none")]
    pub document_type: Option<DocumentType>,
    #[serde(rename = "originalSize", skip_serializing_if = "Option::is_none")]
    pub original_size: Option<u64>,
    #[serde(rename = "compressedSize", skip_serializing_if = "Option::is_none")]
    pub compressed_size: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct WireGhost {
    #[serde(rename = "shelfPrice")]
    pub shelf_price: f64,
    #[serde(rename = "handlingHours")]
    pub handling_hours: u32,
    #[serde(rename = "storeType")]
    pub store_type: crate::ghost::StoreType,
    #[serde(rename = "storeName")]
    pub store_name: String,
    #[serde(rename = "storeAisle", skip_serializing_if = "Option::is_none")]
    pub store_aisle: Option<String>,
    pub location: WireLocation,
}

#[derive(Debug, Serialize)]
pub struct WireLocation {
    pub lat: f64,
    pub lng: f64,
    #[serde(rename = "accuracyMeters")]
    pub accuracy_meters: f64,
    #[serde(rename = "capturedAtEpochMs")]
    pub captured_at_epoch_ms: i64,
}

impl From<GeoFix> for WireLocation {
    fn from(fix: GeoFix) -> Self {
        Self {
            lat: fix.lat,
            lng: fix.lng,
            accuracy_meters: fix.accuracy_m,
            captured_at_epoch_ms: fix.captured_at_epoch_ms,
        }
    }
}

impl From<GhostListing> for WireGhost {
    fn from(listing: GhostListing) -> Self {
        Self {
            shelf_price: listing.shelf_price,
            handling_hours: listing.handling.hours(),
            store_type: listing.store.store_type,
            store_name: listing.store.name,
            store_aisle: listing.store.aisle,
            location: listing.location.into(),
        }
    }
}

/// The valuation result. The upstream contract is unstable, so every
/// field is optional with explicit defaulting; unknown fields are
/// ignored rather than rejected.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AnalysisVerdict {
    #[serde(rename = "estimatedValue", default)]
    pub estimated_value: Option<f64>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
}

/// The analysis service boundary
#[async_trait]
pub trait AnalysisApi: Send + Sync {
    async fn analyze(&self, request: &AnalyzeRequest) -> Result<AnalysisVerdict, SubmissionError>;
}

/// reqwest-backed analysis service client
pub struct AnalysisClient {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl AnalysisClient {
    pub fn new(endpoint: String, token: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token,
        }
    }

    /// Map a non-2xx response to the error taxonomy. A payload-too-large
    /// indication becomes the distinct retriable variant.
    fn map_error(status: u16, body: &str) -> SubmissionError {
        if status == 413 || body.to_ascii_lowercase().contains("payload too large") {
            return SubmissionError::PayloadTooLarge {
                limit_bytes: TOTAL_PAYLOAD_LIMIT_BYTES,
            };
        }
        SubmissionError::Service {
            status,
            details: body.chars().take(500).collect(),
        }
    }
}

#[async_trait]
impl AnalysisApi for AnalysisClient {
    async fn analyze(&self, request: &AnalyzeRequest) -> Result<AnalysisVerdict, SubmissionError> {
        let url = format!("{}/api/analyze", self.endpoint);
        info!(
            "Submitting {} items for analysis to {}",
            request.items.len(),
            url
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .json(request)
            .send()
            .await
            .map_err(|e| SubmissionError::Transport {
                details: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_error(status, &body));
        }

        response
            .json::<AnalysisVerdict>()
            .await
            .map_err(|e| SubmissionError::Transport {
                details: format!("unreadable verdict: {}", e),
            })
    }
}

/// Builds the submission body from the current selection. Validation
/// happens here, before any network call.
pub struct RequestAssembler {
    compression: CompressionConfig,
}

impl RequestAssembler {
    pub fn new(compression: CompressionConfig) -> Self {
        Self { compression }
    }

    /// Assemble the request. Fails fast on an empty selection or an
    /// enabled-but-not-ready Ghost overlay; attaches the overlay only
    /// when it is ready.
    pub fn assemble(
        &self,
        selected: &[&CapturedItem],
        durable_urls: Vec<String>,
        ghost: &GhostMode,
        category: &str,
        subcategory: &str,
    ) -> Result<AnalyzeRequest, SubmissionError> {
        if selected.is_empty() {
            return Err(SubmissionError::EmptySelection);
        }
        if ghost.is_enabled() && !ghost.is_ready() {
            return Err(SubmissionError::GhostNotReady);
        }

        let mut items = Vec::with_capacity(selected.len());
        let mut total_bytes: u64 = 0;

        for item in selected {
            let data = self.bounded_payload(item);
            total_bytes += data.len() as u64;

            let additional_frames: Vec<String> = match item.kind {
                MediaKind::Video => item
                    .metadata
                    .video_frames
                    .iter()
                    .skip(1)
                    .map(|frame| BASE64.encode(&*frame.data))
                    .collect(),
                _ => Vec::new(),
            };
            for frame in &additional_frames {
                total_bytes += frame.len() as u64;
            }

            items.push(WireItem {
                kind: item.kind.wire_name(),
                name: item.name.clone(),
                data: BASE64.encode(&data),
                additional_frames,
                metadata: WireMetadata {
                    document_type: item.metadata.document_type,
                    original_size: item.metadata.original_size,
                    compressed_size: item.metadata.compressed_size,
                },
            });
        }

        if total_bytes > TOTAL_PAYLOAD_LIMIT_BYTES {
            return Err(SubmissionError::PayloadTooLarge {
                limit_bytes: TOTAL_PAYLOAD_LIMIT_BYTES,
            });
        }

        Ok(AnalyzeRequest {
            scan_type: "multi-modal",
            original_image_urls: durable_urls,
            items,
            category_id: category.to_string(),
            subcategory_id: subcategory.to_string(),
            ghost_mode: ghost.snapshot().map(WireGhost::from),
        })
    }

    /// Defensive re-compression pass: an item compressed under an older,
    /// looser policy may still exceed the per-item ceiling. Best-effort;
    /// an unreadable payload is sent as-is.
    fn bounded_payload(&self, item: &CapturedItem) -> Vec<u8> {
        let ceiling_bytes = (self.compression.submit_ceiling_mb * 1024.0 * 1024.0) as usize;
        if item.payload.len() <= ceiling_bytes {
            return item.payload.data.to_vec();
        }

        debug!(
            "Item {} payload of {} bytes exceeds the {} byte ceiling; recompressing",
            item.id,
            item.payload.len(),
            ceiling_bytes
        );

        let tight = CompressionConfig {
            max_size_mb: self.compression.submit_ceiling_mb,
            ..self.compression.clone()
        };

        match compress::compress(&item.payload.data, &tight) {
            Ok(outcome) => outcome.payload.data.to_vec(),
            Err(e) => {
                warn!(
                    "Defensive recompression of item {} failed; sending as-is: {}",
                    item.id, e
                );
                item.payload.data.to_vec()
            }
        }
    }
}
