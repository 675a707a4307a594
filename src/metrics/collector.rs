//! Metrics collection and registry.

use crate::acquisition::{SessionState, SessionStats};
use chrono::{DateTime, Utc};
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Registration or encoding failed.
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// A snapshot of session state for metrics update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Start time of the run the counters belong to.
    pub run_started_at: Option<DateTime<Utc>>,
    /// Whether the session is currently streaming.
    pub started: bool,
    /// Frames delivered so far.
    pub frames_delivered: u64,
    /// Delivered frames flagged incomplete.
    pub incomplete_frames: u64,
    /// Frames copied without pixel conversion.
    pub conversion_fallbacks: u64,
    /// Polls that timed out.
    pub frame_timeouts: u64,
    /// Polls that failed otherwise.
    pub capture_failures: u64,
    /// Release steps that failed.
    pub teardown_failures: u64,
    /// Presentation timestamp of the last frame.
    pub last_pts: u64,
}

impl MetricsSnapshot {
    /// Creates a snapshot from a session's state and counters.
    pub fn from_session(state: SessionState, stats: &SessionStats) -> Self {
        Self {
            run_started_at: stats.started_at,
            started: state == SessionState::Started,
            frames_delivered: stats.frames_delivered,
            incomplete_frames: stats.incomplete_frames,
            conversion_fallbacks: stats.conversion_fallbacks,
            frame_timeouts: stats.frame_timeouts,
            capture_failures: stats.capture_failures,
            teardown_failures: stats.teardown_failures,
            last_pts: stats.last_pts,
        }
    }
}

/// Prometheus metrics registry for capture monitoring.
pub struct MetricsRegistry {
    registry: Registry,

    // Frame counters
    frames_delivered: IntCounter,
    frames_incomplete: IntCounter,
    conversion_fallbacks: IntCounter,

    // Failure counters
    frame_timeouts: IntCounter,
    capture_failures: IntCounter,
    teardown_failures: IntCounter,

    // Session gauges
    session_started: IntGauge,
    last_pts: IntGauge,

    // Snapshot the counters were last advanced from
    baseline: Mutex<MetricsSnapshot>,
}

impl MetricsRegistry {
    /// Creates a new metrics registry with all capture metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let frames_delivered = IntCounter::new(
            "spinnaker_frames_delivered_total",
            "Total frames delivered downstream",
        )?;
        let frames_incomplete = IntCounter::new(
            "spinnaker_frames_incomplete_total",
            "Delivered frames the camera reported as incomplete",
        )?;
        let conversion_fallbacks = IntCounter::new(
            "spinnaker_conversion_fallbacks_total",
            "Frames copied raw after pixel conversion failed",
        )?;

        let frame_timeouts = IntCounter::new(
            "spinnaker_frame_timeouts_total",
            "Frame polls that timed out",
        )?;
        let capture_failures = IntCounter::new(
            "spinnaker_capture_failures_total",
            "Frame polls that failed for reasons other than timeout",
        )?;
        let teardown_failures = IntCounter::new(
            "spinnaker_teardown_failures_total",
            "SDK release steps that reported an error",
        )?;

        let session_started = IntGauge::new(
            "spinnaker_session_started",
            "Acquisition state (1=streaming, 0=not streaming)",
        )?;
        let last_pts = IntGauge::new(
            "spinnaker_last_pts_nanoseconds",
            "Presentation timestamp of the last delivered frame",
        )?;

        registry.register(Box::new(frames_delivered.clone()))?;
        registry.register(Box::new(frames_incomplete.clone()))?;
        registry.register(Box::new(conversion_fallbacks.clone()))?;
        registry.register(Box::new(frame_timeouts.clone()))?;
        registry.register(Box::new(capture_failures.clone()))?;
        registry.register(Box::new(teardown_failures.clone()))?;
        registry.register(Box::new(session_started.clone()))?;
        registry.register(Box::new(last_pts.clone()))?;

        Ok(Self {
            registry,
            frames_delivered,
            frames_incomplete,
            conversion_fallbacks,
            frame_timeouts,
            capture_failures,
            teardown_failures,
            session_started,
            last_pts,
            baseline: Mutex::new(MetricsSnapshot::default()),
        })
    }

    /// Updates all metrics from a snapshot of session state.
    ///
    /// Session counters restart from zero on every start, so counters are
    /// advanced by the change since the previous snapshot of the same run.
    /// A new run, or a counter that went backwards, starts a new baseline.
    pub fn update(&self, snapshot: &MetricsSnapshot) {
        let mut baseline = self.baseline.lock().unwrap_or_else(PoisonError::into_inner);
        if baseline.run_started_at != snapshot.run_started_at {
            *baseline = MetricsSnapshot {
                run_started_at: snapshot.run_started_at,
                ..MetricsSnapshot::default()
            };
        }

        advance(&self.frames_delivered, baseline.frames_delivered, snapshot.frames_delivered);
        advance(&self.frames_incomplete, baseline.incomplete_frames, snapshot.incomplete_frames);
        advance(
            &self.conversion_fallbacks,
            baseline.conversion_fallbacks,
            snapshot.conversion_fallbacks,
        );
        advance(&self.frame_timeouts, baseline.frame_timeouts, snapshot.frame_timeouts);
        advance(&self.capture_failures, baseline.capture_failures, snapshot.capture_failures);
        advance(&self.teardown_failures, baseline.teardown_failures, snapshot.teardown_failures);
        *baseline = snapshot.clone();

        self.session_started.set(i64::from(snapshot.started));
        self.last_pts
            .set(i64::try_from(snapshot.last_pts).unwrap_or(i64::MAX));
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

/// Adds the growth from `previous` to `total`; all of `total` if it shrank.
fn advance(counter: &IntCounter, previous: u64, total: u64) {
    let delta = total.checked_sub(previous).unwrap_or(total);
    if delta > 0 {
        counter.inc_by(delta);
    }
}
