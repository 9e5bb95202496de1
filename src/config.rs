use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ValuescanConfig {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub compression: CompressionConfig,
    #[serde(default)]
    pub video: VideoConfig,
    #[serde(default)]
    pub buffer: BufferConfig,
    #[serde(default)]
    pub ghost: GhostConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Preferred capture device id; None selects the first enumerated device
    pub device_id: Option<String>,

    /// Target capture resolution (width, height)
    #[serde(default = "default_camera_resolution")]
    pub resolution: (u32, u32),

    /// Frames per second requested from the device
    #[serde(default = "default_camera_fps")]
    pub fps: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CompressionConfig {
    /// Maximum width of a compressed item in pixels
    #[serde(default = "default_max_width")]
    pub max_width_px: u32,

    /// Maximum height of a compressed item in pixels
    #[serde(default = "default_max_height")]
    pub max_height_px: u32,

    /// Payload budget per item in megabytes
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: f64,

    /// Initial JPEG quality (0.0 - 1.0)
    #[serde(default = "default_quality")]
    pub quality: f64,

    /// Hard per-item ceiling applied right before submission, in megabytes
    #[serde(default = "default_submit_ceiling_mb")]
    pub submit_ceiling_mb: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct VideoConfig {
    /// Number of representative still frames extracted per recording
    #[serde(default = "default_frame_count")]
    pub frame_count: u32,

    /// Edge length of the thumbnail bounding box in pixels
    #[serde(default = "default_thumbnail_px")]
    pub thumbnail_px: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BufferConfig {
    /// Maximum number of captured items held at once (oldest evicted first)
    #[serde(default = "default_buffer_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GhostConfig {
    /// Single-shot geolocation timeout in seconds
    #[serde(default = "default_location_timeout_secs")]
    pub location_timeout_secs: u64,

    /// Maximum age of a cached location fix in seconds
    #[serde(default = "default_location_max_age_secs")]
    pub location_max_age_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    /// Base URL of the durable object store
    #[serde(default = "default_storage_endpoint")]
    pub endpoint: String,

    /// Request timeout for a single upload, in seconds
    #[serde(default = "default_upload_timeout_secs")]
    pub upload_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AnalysisConfig {
    /// Base URL of the analysis service
    #[serde(default = "default_analysis_endpoint")]
    pub endpoint: String,

    /// Request timeout for the submission POST, in seconds
    #[serde(default = "default_submit_timeout_secs")]
    pub submit_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

impl ValuescanConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("valuescan.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with VALUESCAN_ prefix
            .add_source(Environment::with_prefix("VALUESCAN").separator("__"))
            .build()?;

        let config: ValuescanConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.resolution.0 == 0 || self.camera.resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Camera resolution must be greater than 0".to_string(),
            ));
        }

        if self.camera.fps == 0 {
            return Err(ConfigError::Message(
                "Camera fps must be greater than 0".to_string(),
            ));
        }

        if self.compression.max_width_px == 0 || self.compression.max_height_px == 0 {
            return Err(ConfigError::Message(
                "Compression dimensions must be greater than 0".to_string(),
            ));
        }

        if self.compression.max_size_mb <= 0.0 {
            return Err(ConfigError::Message(
                "Compression max_size_mb must be greater than 0".to_string(),
            ));
        }

        if !(0.1..=1.0).contains(&self.compression.quality) {
            return Err(ConfigError::Message(
                "Compression quality must be between 0.1 and 1.0".to_string(),
            ));
        }

        if self.video.frame_count == 0 {
            return Err(ConfigError::Message(
                "Video frame_count must be greater than 0".to_string(),
            ));
        }

        if self.buffer.capacity == 0 {
            return Err(ConfigError::Message(
                "Item buffer capacity must be greater than 0".to_string(),
            ));
        }

        if self.ghost.location_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "Ghost location_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_id: None,
            resolution: default_camera_resolution(),
            fps: default_camera_fps(),
        }
    }
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            max_width_px: default_max_width(),
            max_height_px: default_max_height(),
            max_size_mb: default_max_size_mb(),
            quality: default_quality(),
            submit_ceiling_mb: default_submit_ceiling_mb(),
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            frame_count: default_frame_count(),
            thumbnail_px: default_thumbnail_px(),
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: default_buffer_capacity(),
        }
    }
}

impl Default for GhostConfig {
    fn default() -> Self {
        Self {
            location_timeout_secs: default_location_timeout_secs(),
            location_max_age_secs: default_location_max_age_secs(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: default_storage_endpoint(),
            upload_timeout_secs: default_upload_timeout_secs(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            endpoint: default_analysis_endpoint(),
            submit_timeout_secs: default_submit_timeout_secs(),
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            event_bus_capacity: default_event_bus_capacity(),
        }
    }
}

fn default_camera_resolution() -> (u32, u32) {
    (1920, 1080)
}

fn default_camera_fps() -> u32 {
    30
}

fn default_max_width() -> u32 {
    1920
}

fn default_max_height() -> u32 {
    1080
}

fn default_max_size_mb() -> f64 {
    2.5
}

fn default_quality() -> f64 {
    0.85
}

fn default_submit_ceiling_mb() -> f64 {
    2.0
}

fn default_frame_count() -> u32 {
    5
}

fn default_thumbnail_px() -> u32 {
    320
}

fn default_buffer_capacity() -> usize {
    15
}

fn default_location_timeout_secs() -> u64 {
    10
}

fn default_location_max_age_secs() -> u64 {
    60
}

fn default_storage_endpoint() -> String {
    "http://localhost:9000/item-media".to_string()
}

fn default_upload_timeout_secs() -> u64 {
    30
}

fn default_analysis_endpoint() -> String {
    "http://localhost:8000".to_string()
}

fn default_submit_timeout_secs() -> u64 {
    120
}

fn default_event_bus_capacity() -> usize {
    100
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = ValuescanConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.buffer.capacity, 15);
        assert_eq!(config.compression.max_size_mb, 2.5);
        assert_eq!(config.ghost.location_timeout_secs, 10);
        assert_eq!(config.ghost.location_max_age_secs, 60);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = ValuescanConfig::load_from_file("/nonexistent/valuescan.toml").unwrap();
        assert_eq!(config.camera.resolution, (1920, 1080));
        assert_eq!(config.video.frame_count, 5);
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            "[buffer]\ncapacity = 8\n\n[compression]\nmax_size_mb = 1.0\n"
        )
        .unwrap();

        let config = ValuescanConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.buffer.capacity, 8);
        assert_eq!(config.compression.max_size_mb, 1.0);
        // Untouched sections keep their defaults
        assert_eq!(config.camera.fps, 30);
    }

    #[test]
    fn test_validation_rejects_zero_capacity() {
        let mut config = ValuescanConfig::default();
        config.buffer.capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_quality() {
        let mut config = ValuescanConfig::default();
        config.compression.quality = 1.5;
        assert!(config.validate().is_err());

        config.compression.quality = 0.0;
        assert!(config.validate().is_err());
    }
}
