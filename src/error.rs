use thiserror::Error;

#[derive(Error, Debug)]
pub enum ValuescanError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] toml::de::Error),

    #[error("Device access error: {0}")]
    Device(#[from] DeviceAccessError),

    #[error("Compression error: {0}")]
    Compression(#[from] CompressionError),

    #[error("Frame extraction error: {0}")]
    FrameExtraction(#[from] FrameExtractionError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("Geolocation error: {0}")]
    Geolocation(#[from] GeolocationError),

    #[error("Submission error: {0}")]
    Submission(#[from] SubmissionError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl ValuescanError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Camera/device acquisition failures. These are fatal to the capture
/// session: the caller must tear the session down.
#[derive(Error, Debug)]
pub enum DeviceAccessError {
    #[error("Camera permission denied")]
    PermissionDenied,

    #[error("No capture device found matching '{device}'")]
    NotFound { device: String },

    #[error("Capture device '{device}' is held by another owner")]
    Busy { device: String },

    #[error("Device backend failure: {details}")]
    Backend { details: String },
}

/// Failures while recompressing a single captured item. Local to that
/// item: the capture is dropped, the rest of the buffer is unaffected.
#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("Image decode failed: {details}")]
    Decode { details: String },

    #[error("JPEG encode failed: {details}")]
    Encode { details: String },
}

/// Failures while pulling still frames out of a recorded video. Local:
/// the item is kept with whatever thumbnail is available.
#[derive(Error, Debug)]
pub enum FrameExtractionError {
    #[error("Video load failed: {details}")]
    Load { details: String },

    #[error("Seek to {position_ms}ms failed: {details}")]
    Seek { position_ms: u64, details: String },
}

/// A single item's durable upload failed. The batch continues without it.
#[derive(Error, Debug)]
#[error("Upload of item {index} failed: {details}")]
pub struct UploadError {
    pub index: usize,
    pub details: String,
}

/// Single-shot geolocation failures. Ghost Mode becomes not-ready; the
/// user decides whether to retry or disable.
#[derive(Error, Debug)]
pub enum GeolocationError {
    #[error("Location request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Location permission denied")]
    Denied,

    #[error("Location unavailable: {details}")]
    Unavailable { details: String },
}

/// Failures of the final analysis submission.
#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("No items selected for submission")]
    EmptySelection,

    #[error("Ghost Mode is enabled but missing location, store name, or shelf price")]
    GhostNotReady,

    /// Retriable: the caller should reduce item count or size and retry.
    #[error("Submission payload exceeds the service limit ({limit_bytes} bytes)")]
    PayloadTooLarge { limit_bytes: u64 },

    #[error("Analysis service returned {status}: {details}")]
    Service { status: u16, details: String },

    #[error("Network failure during submission: {details}")]
    Transport { details: String },
}

impl SubmissionError {
    /// Whether the caller may retry the same submission after shrinking it.
    pub fn is_retriable(&self) -> bool {
        matches!(self, SubmissionError::PayloadTooLarge { .. })
    }
}

pub type Result<T> = std::result::Result<T, ValuescanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_too_large_is_retriable() {
        let err = SubmissionError::PayloadTooLarge {
            limit_bytes: 2 * 1024 * 1024,
        };
        assert!(err.is_retriable());
        assert!(!SubmissionError::EmptySelection.is_retriable());
        assert!(!SubmissionError::GhostNotReady.is_retriable());
    }

    #[test]
    fn test_error_conversion_to_top_level() {
        let err: ValuescanError = DeviceAccessError::PermissionDenied.into();
        assert!(matches!(err, ValuescanError::Device(_)));

        let err: ValuescanError = SubmissionError::EmptySelection.into();
        assert!(matches!(err, ValuescanError::Submission(_)));
    }

    #[test]
    fn test_helper_constructors() {
        let err = ValuescanError::system("boom");
        assert!(err.to_string().contains("boom"));

        let err = ValuescanError::component("uploader", "offline");
        assert!(err.to_string().contains("uploader"));
    }
}
