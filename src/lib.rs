pub mod buffer;
pub mod compress;
pub mod config;
pub mod error;
pub mod events;
pub mod ghost;
pub mod media;
pub mod scanner;
pub mod session;
pub mod submit;
pub mod upload;
pub mod video;

pub use buffer::{ItemBuffer, ItemBufferStats};
pub use compress::{compress, make_thumbnail, CompressionOutcome};
pub use config::ValuescanConfig;
pub use error::{
    CompressionError, DeviceAccessError, FrameExtractionError, GeolocationError, Result,
    SubmissionError, UploadError, ValuescanError,
};
pub use events::{EventBus, ScanEvent};
pub use ghost::{
    GeoFix, GeolocationProvider, GhostListing, GhostMode, GhostOutcome, HandlingWindow,
    StaticLocationProvider, StoreInfo, StoreType, Velocity,
};
pub use media::{CapturedItem, DocumentType, ItemMetadata, MediaKind, MediaPayload};
pub use scanner::{ScannerSession, ScannerSessionBuilder, SubmissionOutcome};
pub use session::{
    CaptureMode, CaptureSessionManager, DeviceInfo, DeviceStream, MediaDevice, MockMediaDevice,
    SessionState, StreamRequest,
};
pub use submit::{AnalysisApi, AnalysisClient, AnalysisVerdict, RequestAssembler};
pub use upload::{DurableStore, HttpObjectStore, UploadOrchestrator};
pub use video::{FrameDecoder, FrameExtractor, MockFrameDecoder};

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub use session::GstMediaDevice;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub use video::GstFrameDecoder;
