use crate::error::UploadError;
use crate::events::{EventBus, ScanEvent};
use crate::media::CapturedItem;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// User-scoped durable object storage
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Store a blob and return its public URL
    async fn put(
        &self,
        path: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, UploadError>;
}

/// Object store client speaking plain HTTP PUT, the public URL being the
/// upload URL itself.
pub struct HttpObjectStore {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl HttpObjectStore {
    /// `endpoint` is the bucket base URL; `token` is the caller-supplied
    /// credential passed through on every request.
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
}

#[async_trait]
impl DurableStore for HttpObjectStore {
    async fn put(
        &self,
        path: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, UploadError> {
        let url = format!("{}/{}", self.endpoint, path);

        let response = self
            .client
            .put(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Content-Type", content_type)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| UploadError {
                index: 0,
                details: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError {
                index: 0,
                details: format!("storage returned {}: {}", status, body),
            });
        }

        Ok(url)
    }
}

/// Uploads original (uncompressed) item payloads to durable storage, one
/// item at a time. Sequential by design: the uplink on a constrained
/// mobile network does not tolerate parallel multi-megabyte PUTs.
pub struct UploadOrchestrator {
    store: Arc<dyn DurableStore>,
    event_bus: Arc<EventBus>,
}

impl UploadOrchestrator {
    pub fn new(store: Arc<dyn DurableStore>, event_bus: Arc<EventBus>) -> Self {
        Self { store, event_bus }
    }

    /// Upload every item's original payload under the owner's prefix.
    ///
    /// Each item is independent: a failed upload is logged, surfaced as an
    /// event, and excluded from the result; the batch never aborts. The
    /// returned URLs preserve the relative order of the successes, so the
    /// result may be shorter than the input.
    pub async fn upload_all(&self, items: &[CapturedItem], owner_id: &str) -> Vec<String> {
        let mut urls = Vec::with_capacity(items.len());

        let batch_ts = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();

        info!("Uploading {} original payloads for {}", items.len(), owner_id);

        for (index, item) in items.iter().enumerate() {
            let path = format!("{}/{}_{}.jpg", owner_id, batch_ts, index);
            debug!(
                "Uploading item {} ({} bytes) to {}",
                item.id,
                item.original_payload.len(),
                path
            );

            match self
                .store
                .put(&path, &item.original_payload.data, "image/jpeg")
                .await
            {
                Ok(url) => urls.push(url),
                Err(e) => {
                    warn!("Upload of item {} failed; continuing batch: {}", index, e);
                    self.event_bus.publish(ScanEvent::UploadFailed {
                        index,
                        details: e.details,
                        timestamp: SystemTime::now(),
                    });
                }
            }
        }

        info!(
            "Uploaded {}/{} items for {}",
            urls.len(),
            items.len(),
            owner_id
        );
        urls
    }
}
