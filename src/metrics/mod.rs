//! Prometheus metrics exporter for capture monitoring.
//!
//! Session counters are copied into a [`MetricsRegistry`] through a
//! [`MetricsSnapshot`]. With the `metrics` feature, [`MetricsServer`]
//! exposes them over HTTP.
//!
//! # Metrics Exposed
//!
//! ## Frames
//! - `spinnaker_frames_delivered_total` - Frames delivered downstream
//! - `spinnaker_frames_incomplete_total` - Delivered frames flagged incomplete
//! - `spinnaker_conversion_fallbacks_total` - Frames copied without conversion
//!
//! ## Failures
//! - `spinnaker_frame_timeouts_total` - Polls that timed out
//! - `spinnaker_capture_failures_total` - Polls that failed otherwise
//! - `spinnaker_teardown_failures_total` - SDK release steps that failed
//!
//! ## Session
//! - `spinnaker_session_started` - 1 while streaming
//! - `spinnaker_last_pts_nanoseconds` - Timestamp of the last frame
//!
//! # Example
//!
//! ```no_run
//! use spinnaker_source::acquisition::FrameAcquisitionSession;
//! use spinnaker_source::metrics::{MetricsRegistry, MetricsSnapshot};
//! use spinnaker_source::sdk::simulated::SimulatedSdk;
//!
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//! let session = FrameAcquisitionSession::new(SimulatedSdk::default());
//!
//! registry.update(&MetricsSnapshot::from_session(session.state(), session.stats()));
//! println!("{}", registry.encode().unwrap());
//! ```

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry, MetricsSnapshot};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, MetricsState, ServerError};
