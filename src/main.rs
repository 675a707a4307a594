//! Spinnaker Capture CLI
//!
//! Runs the camera source against the simulated SDK, optionally writing
//! raw GRAY8 frames to a file and exporting Prometheus metrics.

use clap::Parser;
use spinnaker_source::{
    capture::{FileConfig, PixelFormat},
    metrics::{MetricsRegistry, MetricsSnapshot},
    sdk::simulated::{SimulatedCamera, SimulatedSdk},
    source::SpinnakerSource,
};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Capture frames from a (simulated) Spinnaker camera.
#[derive(Debug, Parser)]
#[command(name = "spinnaker-capture", version, about)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Camera index (0-7)
    #[arg(long)]
    camera_id: Option<u32>,

    /// Requested frame width
    #[arg(long)]
    width: Option<u32>,

    /// Requested frame height
    #[arg(long)]
    height: Option<u32>,

    /// Nominal frame rate used for timestamps and pacing
    #[arg(long)]
    framerate: Option<u32>,

    /// Sensor pixel format (Mono8, Mono10, Mono12, Mono14, Mono16)
    #[arg(long)]
    pixel_format: Option<PixelFormat>,

    /// Stop after this many frames (0 = until interrupted)
    #[arg(short = 'n', long)]
    num_buffers: Option<u64>,

    /// Leave pts/dts unset on output buffers
    #[arg(long)]
    do_timestamp: bool,

    /// Write raw GRAY8 frames to this file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log progress every N frames
    #[arg(long)]
    report_interval: Option<u64>,

    /// Serve Prometheus metrics on this port (requires the `metrics` feature)
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Print final metrics in Prometheus text format
    #[arg(long)]
    print_metrics: bool,

    /// Number of simulated cameras on the bus
    #[arg(long, default_value_t = 1)]
    cameras: usize,

    /// Seed for simulated sensor noise
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

impl Args {
    /// Applies command-line overrides on top of the file configuration.
    fn merge_into(&self, config: &mut FileConfig) {
        let capture = &mut config.capture;
        if let Some(index) = self.camera_id {
            capture.camera_index = index;
        }
        if let Some(width) = self.width {
            capture.width = width;
        }
        if let Some(height) = self.height {
            capture.height = height;
        }
        if let Some(framerate) = self.framerate {
            capture.framerate = framerate;
        }
        if let Some(format) = self.pixel_format {
            capture.pixel_format = format;
        }
        if let Some(count) = self.num_buffers {
            capture.frame_limit = count;
        }
        if self.do_timestamp {
            config.source.do_timestamp = true;
        }
        if let Some(path) = &self.output {
            config.output.path = Some(path.clone());
        }
        if let Some(interval) = self.report_interval {
            config.output.report_interval = interval;
        }
        if let Some(port) = self.metrics_port {
            config.output.metrics_port = port;
        }
    }
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    info!("Spinnaker Capture v{}", spinnaker_source::VERSION);
    info!("This is a demonstration using the simulated camera SDK");

    if let Err(e) = run(&args) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => FileConfig::from_file(path)?,
        None => FileConfig::default(),
    };
    args.merge_into(&mut config);
    config.capture.validate()?;

    let sdk = simulated_bus(&config, args.cameras, args.seed);
    let mut src = SpinnakerSource::with_config(sdk, &config);

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
        })?;
    }

    let registry = MetricsRegistry::new()?;
    let exporter = Exporter::spawn(config.output.metrics_port)?;

    let mut writer = match &config.output.path {
        Some(path) => {
            info!(path = %path.display(), "Writing raw frames");
            Some(BufWriter::new(File::create(path)?))
        }
        None => None,
    };

    src.start()?;
    info!(caps = %src.caps(), "Streaming");

    let report_interval = config.output.report_interval.max(1);
    while running.load(Ordering::SeqCst) {
        let (buffer, flow) = match src.create() {
            Ok(frame) => frame,
            Err(e) if e.is_frame_loss() => {
                warn!("Frame lost, retrying: {}", e);
                continue;
            }
            Err(e) => {
                error!("Capture stopped: {}", e);
                break;
            }
        };

        if let Some(writer) = writer.as_mut() {
            writer.write_all(buffer.data())?;
        }

        let snapshot = MetricsSnapshot::from_session(src.session().state(), src.stats());
        registry.update(&snapshot);
        exporter.publish(&snapshot);

        let meta = flow.meta();
        for degradation in &meta.degradations {
            warn!(offset = meta.offset, "Degraded frame: {}", degradation);
        }
        if meta.offset_end % report_interval == 0 {
            info!(
                frames = meta.offset_end,
                pts_ms = meta.pts / 1_000_000,
                "Progress"
            );
        }

        if flow.is_end_of_stream() {
            info!("Frame limit reached");
            break;
        }
    }

    src.stop()?;
    if let Some(mut writer) = writer {
        writer.flush()?;
    }

    let snapshot = MetricsSnapshot::from_session(src.session().state(), src.stats());
    registry.update(&snapshot);
    exporter.publish(&snapshot);

    let stats = src.stats();
    info!(
        "Captured {} frames: {} incomplete, {} timeouts, {} conversion fallbacks",
        stats.frames_delivered,
        stats.incomplete_frames,
        stats.frame_timeouts,
        stats.conversion_fallbacks
    );

    if args.print_metrics {
        print!("{}", registry.encode()?);
    }

    exporter.shutdown();
    Ok(())
}

/// Builds a simulated bus paced at the configured frame rate.
fn simulated_bus(config: &FileConfig, cameras: usize, seed: u64) -> SimulatedSdk {
    let interval = Duration::from_nanos(config.capture.frame_duration_ns());
    let cameras = (0..cameras.max(1))
        .map(|i| SimulatedCamera {
            serial: format!("{}", 19_000_001 + i),
            frame_interval: Some(interval),
            ..Default::default()
        })
        .collect();
    SimulatedSdk::with_seed(cameras, seed)
}

/// Optional HTTP metrics exporter running on its own runtime.
#[cfg(feature = "metrics")]
struct Exporter {
    inner: Option<(
        tokio::runtime::Runtime,
        std::sync::Arc<tokio::sync::RwLock<spinnaker_source::metrics::MetricsState>>,
        tokio::sync::oneshot::Sender<()>,
    )>,
}

#[cfg(feature = "metrics")]
impl Exporter {
    fn spawn(port: u16) -> Result<Self, Box<dyn std::error::Error>> {
        use spinnaker_source::metrics::{MetricsServer, MetricsServerConfig};

        if port == 0 {
            return Ok(Self { inner: None });
        }
        let runtime = tokio::runtime::Runtime::new()?;
        let server = MetricsServer::new(MetricsServerConfig::with_port(port), MetricsRegistry::new()?);
        let state = server.state();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        runtime.spawn(async move {
            let shutdown = async {
                let _ = rx.await;
            };
            if let Err(e) = server.run(shutdown).await {
                error!("Metrics server failed: {}", e);
            }
        });
        Ok(Self {
            inner: Some((runtime, state, tx)),
        })
    }

    fn publish(&self, snapshot: &MetricsSnapshot) {
        if let Some((_, state, _)) = &self.inner {
            state.blocking_write().update(snapshot);
        }
    }

    fn shutdown(self) {
        if let Some((runtime, _, tx)) = self.inner {
            let _ = tx.send(());
            runtime.shutdown_timeout(Duration::from_secs(1));
        }
    }
}

#[cfg(not(feature = "metrics"))]
struct Exporter;

#[cfg(not(feature = "metrics"))]
impl Exporter {
    fn spawn(port: u16) -> Result<Self, Box<dyn std::error::Error>> {
        if port != 0 {
            warn!(port, "Built without the metrics feature, not serving metrics");
        }
        Ok(Self)
    }

    fn publish(&self, _snapshot: &MetricsSnapshot) {}

    fn shutdown(self) {}
}
