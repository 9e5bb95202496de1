use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;
use uuid::Uuid;

/// Kind of captured evidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    /// Still photo of the item
    Photo,
    /// Recorded video clip (submitted as extracted still frames)
    Video,
    /// Supporting paperwork (receipt, manual, box)
    Document,
    /// Grading or authenticity certificate
    Certificate,
}

impl MediaKind {
    /// Wire name used by the analysis service
    pub fn wire_name(&self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
            MediaKind::Document => "document",
            MediaKind::Certificate => "certificate",
        }
    }
}

/// Classification of a captured document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Certificate,
    Grading,
    Appraisal,
    Receipt,
    Authenticity,
    Other,
}

/// Encoded media bytes with pixel dimensions, shared cheaply between the
/// buffer, the uploader, and the request assembler.
#[derive(Debug, Clone)]
pub struct MediaPayload {
    /// Encoded bytes (JPEG unless noted otherwise)
    pub data: Arc<Vec<u8>>,
    /// Width in pixels, if known
    pub width: u32,
    /// Height in pixels, if known
    pub height: u32,
}

impl MediaPayload {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data: Arc::new(data),
            width,
            height,
        }
    }

    /// Payload with unknown dimensions (gallery imports, raw recordings)
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self::new(data, 0, 0)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Structured extras carried alongside a captured item
#[derive(Debug, Clone, Default)]
pub struct ItemMetadata {
    /// Set for Document/Certificate captures
    pub document_type: Option<DocumentType>,
    /// Ordered compressed still frames, video captures only
    pub video_frames: Vec<MediaPayload>,
    /// Encoded size as captured, in bytes
    pub original_size: Option<u64>,
    /// Encoded size after compression, in bytes
    pub compressed_size: Option<u64>,
}

/// One piece of captured evidence awaiting selection and submission
#[derive(Debug, Clone)]
pub struct CapturedItem {
    /// Unique identifier assigned at capture time
    pub id: Uuid,
    /// Kind of evidence
    pub kind: MediaKind,
    /// Compressed payload bound for the analysis service. For video this
    /// is always a still frame, never raw video bytes.
    pub payload: MediaPayload,
    /// Payload as captured, bound for durable storage
    pub original_payload: MediaPayload,
    /// Small preview, never empty
    pub thumbnail: MediaPayload,
    /// Display label
    pub name: String,
    /// Selection state; newest captures are selected by default
    pub selected: bool,
    /// Structured extras
    pub metadata: ItemMetadata,
    /// When the item was captured
    pub captured_at: SystemTime,
}

impl CapturedItem {
    /// Create a new item. The id is assigned here; `selected` starts true.
    pub fn new(
        kind: MediaKind,
        name: String,
        payload: MediaPayload,
        original_payload: MediaPayload,
        thumbnail: MediaPayload,
        metadata: ItemMetadata,
    ) -> Self {
        debug_assert!(!thumbnail.is_empty(), "thumbnail must not be empty");
        Self {
            id: Uuid::new_v4(),
            kind,
            payload,
            original_payload,
            thumbnail,
            name,
            selected: true,
            metadata,
            captured_at: SystemTime::now(),
        }
    }

    /// Age of the capture in milliseconds
    pub fn age_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.captured_at)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(len: usize) -> MediaPayload {
        MediaPayload::new(vec![0u8; len], 640, 480)
    }

    #[test]
    fn test_media_kind_wire_names() {
        assert_eq!(MediaKind::Photo.wire_name(), "photo");
        assert_eq!(MediaKind::Video.wire_name(), "video");
        assert_eq!(MediaKind::Document.wire_name(), "document");
        assert_eq!(MediaKind::Certificate.wire_name(), "certificate");
    }

    #[test]
    fn test_payload_sharing_is_cheap() {
        let p = payload(1024);
        let q = p.clone();
        assert!(Arc::ptr_eq(&p.data, &q.data));
        assert_eq!(q.len(), 1024);
        assert!(!q.is_empty());
    }

    #[test]
    fn test_new_item_is_selected_with_unique_id() {
        let a = CapturedItem::new(
            MediaKind::Photo,
            "Item 1".to_string(),
            payload(10),
            payload(20),
            payload(5),
            ItemMetadata::default(),
        );
        let b = CapturedItem::new(
            MediaKind::Photo,
            "Item 2".to_string(),
            payload(10),
            payload(20),
            payload(5),
            ItemMetadata::default(),
        );

        assert!(a.selected);
        assert!(b.selected);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_document_type_serialization() {
        let json = serde_json::to_string(&DocumentType::Authenticity).unwrap();
        assert_eq!(json, "\"authenticity\"");
    }
}
