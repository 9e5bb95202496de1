use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use valuescan::{
    AnalysisClient, HttpObjectStore, MockFrameDecoder, MockMediaDevice, ScannerSession,
    StaticLocationProvider, ValuescanConfig,
};

#[derive(Parser, Debug)]
#[command(name = "valuescan")]
#[command(about = "Multi-modal capture and submission pipeline for merchandise valuation")]
#[command(version)]
#[command(long_about = "Captures photos, documents, and video of physical merchandise, \
compresses media under a hard payload budget, uploads originals to durable storage, and \
submits the selection to an external multi-model valuation service.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "valuescan.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without scanning")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Dry run mode - wire the pipeline but don't capture or submit
    #[arg(long, help = "Perform dry run - build the session but don't capture anything")]
    dry_run: bool,

    /// Number of photos to capture in a scan
    #[arg(long, default_value_t = 3, help = "Number of photos to capture")]
    captures: u32,

    /// Submit the captured items for analysis
    #[arg(long, help = "Submit the captured selection to the analysis service")]
    submit: bool,

    /// Category passed through to the analysis service
    #[arg(long, default_value = "general", help = "Submission category id")]
    category: String,

    /// Subcategory passed through to the analysis service
    #[arg(long, default_value = "general", help = "Submission subcategory id")]
    subcategory: String,

    /// Owner id used to scope durable storage paths
    #[arg(long, default_value = "local-user", help = "Owner id for durable storage paths")]
    owner: String,

    /// Bearer token forwarded to storage and analysis calls
    #[arg(long, default_value = "", help = "Credential token for upstream services")]
    token: String,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle special modes that don't require full initialization
    if args.print_config {
        print_default_config();
        return Ok(());
    }

    // Initialize logging
    init_logging(&args)?;

    info!("Starting valuescan v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    // Load and validate configuration
    let config = match ValuescanConfig::load_from_file(&args.config) {
        Ok(config) => {
            info!("Configuration loaded successfully from: {}", args.config);
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                info!("Configuration validation successful");
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("Configuration validation failed: {}", e);
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    let mut session = build_session(&config, &args)?;

    if args.dry_run {
        info!("Dry run mode - pipeline wired but nothing captured");
        println!("✓ Dry run completed successfully - pipeline initialized");
        return Ok(());
    }

    let result = run_scan(&mut session, &args).await;
    session.stop_session("scan finished").await;
    result
}

fn build_session(config: &ValuescanConfig, args: &Args) -> Result<ScannerSession> {
    let store = Arc::new(HttpObjectStore::new(
        config.storage.endpoint.clone(),
        args.token.clone(),
        Duration::from_secs(config.storage.upload_timeout_secs),
    ));
    let analysis = Arc::new(AnalysisClient::new(
        config.analysis.endpoint.clone(),
        args.token.clone(),
        Duration::from_secs(config.analysis.submit_timeout_secs),
    ));

    let session = ScannerSession::builder()
        .config(config.clone())
        .device(device_backend()?)
        .decoder(decoder_backend()?)
        .store(store)
        .analysis(analysis)
        .geolocation(Arc::new(StaticLocationProvider::new(0.0, 0.0)))
        .owner_id(args.owner.clone())
        .build()?;

    Ok(session)
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn device_backend() -> Result<Arc<dyn valuescan::MediaDevice>> {
    Ok(Arc::new(valuescan::GstMediaDevice::new()?))
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn device_backend() -> Result<Arc<dyn valuescan::MediaDevice>> {
    Ok(Arc::new(MockMediaDevice::new()))
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn decoder_backend() -> Result<Box<dyn valuescan::FrameDecoder>> {
    Ok(Box::new(valuescan::GstFrameDecoder::new()?))
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn decoder_backend() -> Result<Box<dyn valuescan::FrameDecoder>> {
    Ok(Box::new(MockFrameDecoder::new(Duration::from_secs(10))))
}

async fn run_scan(session: &mut ScannerSession, args: &Args) -> Result<()> {
    session.start_session(None).await?;
    info!("Capture session started");

    for _ in 0..args.captures {
        let id = session.capture_photo(None).await?;
        info!("Captured photo {}", id);
    }

    println!(
        "Captured {} items ({} selected)",
        session.buffer().len(),
        session.buffer().selected_count()
    );

    if args.submit {
        let outcome = session.submit(&args.category, &args.subcategory).await?;
        println!(
            "Uploaded {} originals; estimated value: {}",
            outcome.durable_urls.len(),
            outcome
                .verdict
                .estimated_value
                .map(|v| format!("{:.2}", v))
                .unwrap_or_else(|| "unknown".to_string())
        );
    }

    Ok(())
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, fmt, Layer};

    // Determine log level based on flags
    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    // Create environment filter
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("valuescan={}", log_level)));

    // Configure format based on options
    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => {
            fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .boxed()
        }
        Some("compact") => {
            fmt::layer()
                .compact()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .boxed()
        }
        Some("pretty") | None => {
            fmt::layer()
                .pretty()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() {
    println!("# Valuescan Configuration File");
    println!("# This is the default configuration with all available options");
    println!();

    let default_config = r#"[camera]
# Preferred capture device id (optional); the first device is used when unset
# device_id = "/dev/video0"
# Target capture resolution (width, height)
resolution = [1920, 1080]
# Frames per second requested from the device
fps = 30

[compression]
# Maximum dimensions of a compressed item in pixels
max_width_px = 1920
max_height_px = 1080
# Payload budget per item in megabytes
max_size_mb = 2.5
# Initial JPEG quality (0.0 - 1.0)
quality = 0.85
# Hard per-item ceiling applied right before submission, in megabytes
submit_ceiling_mb = 2.0

[video]
# Number of representative still frames extracted per recording
frame_count = 5
# Edge length of the thumbnail bounding box in pixels
thumbnail_px = 320

[buffer]
# Maximum number of captured items held at once (oldest evicted first)
capacity = 15

[ghost]
# Single-shot geolocation timeout in seconds
location_timeout_secs = 10
# Maximum age of a cached location fix in seconds
location_max_age_secs = 60

[storage]
# Base URL of the durable object store
endpoint = "http://localhost:9000/item-media"
# Request timeout for a single upload, in seconds
upload_timeout_secs = 30

[analysis]
# Base URL of the analysis service
endpoint = "http://localhost:8000"
# Request timeout for the submission POST, in seconds
submit_timeout_secs = 120

[system]
# Event bus capacity
event_bus_capacity = 100
"#;

    println!("{}", default_config);
}
