//! The frame acquisition state machine.

use super::clock::FrameClock;
use super::configure::apply_image_settings;
use super::copy::{copy_rows, CopyError};
use super::error::{AcquisitionError, TeardownStep};
use crate::capture::{CaptureConfig, FrameFlow, FrameMeta, OutputBuffer, PixelFormat};
use crate::sdk::{
    CameraDevice, CameraList, CameraOf, CameraSdk, CameraSystem, ListOf, RawImage, SdkError,
    SdkResult,
};
use chrono::{DateTime, Utc};
use std::fmt;
use tracing::{debug, error, info, warn};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No camera resources held; ready to start.
    Idle,
    /// Streaming; frames may be requested.
    Started,
    /// Teardown in progress.
    Stopped,
    /// The last start failed. Resources are already released.
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Started => "started",
            SessionState::Stopped => "stopped",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Counters describing the current or most recent run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Wall-clock time of the last successful start.
    pub started_at: Option<DateTime<Utc>>,
    /// Frames copied into an output buffer.
    pub frames_delivered: u64,
    /// Delivered frames the camera flagged as incomplete.
    pub incomplete_frames: u64,
    /// Delivered frames copied without conversion.
    pub conversion_fallbacks: u64,
    /// Polls that timed out.
    pub frame_timeouts: u64,
    /// Polls that failed for any other reason.
    pub capture_failures: u64,
    /// Release steps that reported an error.
    pub teardown_failures: u64,
    /// Presentation timestamp of the last delivered frame.
    pub last_pts: u64,
}

/// SDK handles held by a session, in acquisition order.
///
/// Fields are filled as `start` progresses, so the same value describes
/// both a live session and a partially completed start.
struct Resources<S: CameraSdk> {
    system: Option<S::System>,
    list: Option<ListOf<S>>,
    camera: Option<CameraOf<S>>,
    initialized: bool,
    acquiring: bool,
}

impl<S: CameraSdk> Resources<S> {
    fn empty() -> Self {
        Self {
            system: None,
            list: None,
            camera: None,
            initialized: false,
            acquiring: false,
        }
    }

    /// Releases everything held, newest first.
    ///
    /// Every applicable step runs exactly once, whatever happened to the
    /// steps before it. Returns the steps that failed.
    fn release(self) -> Vec<TeardownStep> {
        let Self {
            system,
            list,
            camera,
            initialized,
            acquiring,
        } = self;
        let mut failed = Vec::new();
        let mut run = |step: TeardownStep, result: SdkResult<()>| {
            if let Err(err) = result {
                warn!(step = %step, error = %err, "Teardown step failed");
                failed.push(step);
            }
        };

        if let Some(mut camera) = camera {
            if acquiring {
                run(TeardownStep::EndAcquisition, camera.end_acquisition());
            }
            if initialized {
                run(TeardownStep::DeinitCamera, camera.deinit());
            }
            run(TeardownStep::ReleaseCamera, camera.release());
        }
        if let Some(mut list) = list {
            run(TeardownStep::ClearCameraList, list.clear());
            run(TeardownStep::DestroyCameraList, list.destroy());
        }
        if let Some(system) = system {
            run(TeardownStep::ReleaseSystem, system.release());
        }
        failed
    }
}

/// Drives one camera through start, frame polling and stop.
///
/// The session owns every SDK handle it acquires, including the system
/// handle. Calls must follow `start`, `next_frame`..., `stop`; anything
/// out of order fails with [`AcquisitionError::InvalidState`] before
/// reaching the SDK. Dropping a started session stops it.
pub struct FrameAcquisitionSession<S: CameraSdk> {
    sdk: S,
    config: CaptureConfig,
    effective: Option<CaptureConfig>,
    state: SessionState,
    resources: Option<Resources<S>>,
    clock: FrameClock,
    stats: SessionStats,
}

impl<S: CameraSdk> FrameAcquisitionSession<S> {
    /// Creates an idle session with the default configuration.
    pub fn new(sdk: S) -> Self {
        Self::with_config(sdk, CaptureConfig::default())
    }

    /// Creates an idle session.
    pub fn with_config(sdk: S, config: CaptureConfig) -> Self {
        let clock = FrameClock::new(config.framerate, config.frame_limit);
        Self {
            sdk,
            config,
            effective: None,
            state: SessionState::Idle,
            resources: None,
            clock,
            stats: SessionStats::default(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Requested configuration.
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Configuration as accepted by the camera, while started.
    pub fn effective_config(&self) -> Option<&CaptureConfig> {
        self.effective.as_ref()
    }

    /// Counters for the current or most recent run.
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// The SDK the session was built on.
    pub fn sdk(&self) -> &S {
        &self.sdk
    }

    /// Replaces the configuration. Only allowed while idle.
    pub fn set_config(&mut self, config: CaptureConfig) -> Result<(), AcquisitionError> {
        self.require(SessionState::Idle, "set_config")?;
        self.config = config;
        Ok(())
    }

    fn require(&self, state: SessionState, operation: &'static str) -> Result<(), AcquisitionError> {
        if self.state == state {
            Ok(())
        } else {
            Err(AcquisitionError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    /// Opens, configures and starts streaming from the configured camera.
    ///
    /// On failure everything acquired so far is released and the session
    /// moves to [`SessionState::Failed`].
    pub fn start(&mut self) -> Result<(), AcquisitionError> {
        self.require(SessionState::Idle, "start")?;
        if let Err(err) = self.config.validate() {
            error!(error = %err, "Invalid capture configuration");
            self.state = SessionState::Failed;
            return Err(err.into());
        }

        info!(
            camera = self.config.camera_index,
            width = self.config.width,
            height = self.config.height,
            format = %self.config.pixel_format,
            "Starting acquisition"
        );

        let mut resources = Resources::empty();
        match self.open(&mut resources) {
            Ok(effective) => {
                info!(
                    width = effective.width,
                    height = effective.height,
                    "Acquisition started"
                );
                self.clock = FrameClock::new(effective.framerate, effective.frame_limit);
                self.stats = SessionStats {
                    started_at: Some(Utc::now()),
                    ..SessionStats::default()
                };
                self.effective = Some(effective);
                self.resources = Some(resources);
                self.state = SessionState::Started;
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "Failed to start acquisition");
                let failed = resources.release();
                if !failed.is_empty() {
                    self.stats.teardown_failures += failed.len() as u64;
                }
                self.state = SessionState::Failed;
                Err(err)
            }
        }
    }

    /// Acquires handles into `res`, leaving whatever was acquired there on failure.
    fn open(&mut self, res: &mut Resources<S>) -> Result<CaptureConfig, AcquisitionError> {
        let system = res
            .system
            .insert(self.sdk.acquire_system().map_err(AcquisitionError::Sdk)?);

        debug!("Enumerating cameras");
        let list = res
            .list
            .insert(system.cameras().map_err(AcquisitionError::Sdk)?);
        let count = list.len().map_err(AcquisitionError::Sdk)?;
        if count == 0 {
            return Err(AcquisitionError::NoDeviceFound);
        }

        let index = self.config.camera_index as usize;
        if index >= count {
            return Err(AcquisitionError::DeviceUnavailable {
                index,
                reason: format!("only {count} camera(s) detected"),
            });
        }
        let unavailable = |err: SdkError| AcquisitionError::DeviceUnavailable {
            index,
            reason: err.to_string(),
        };

        debug!(index, "Selecting camera");
        let camera = res.camera.insert(list.get(index).map_err(unavailable)?);
        camera.init().map_err(unavailable)?;
        res.initialized = true;

        let nodes = camera.node_map().map_err(AcquisitionError::Sdk)?;
        let effective = apply_image_settings(nodes, &self.config)?;

        camera
            .begin_acquisition()
            .map_err(AcquisitionError::AcquisitionStartFailed)?;
        res.acquiring = true;
        Ok(effective)
    }

    /// Captures one frame into `buffer`.
    ///
    /// Blocks until the camera delivers an image or the driver times out.
    /// Incomplete frames and recoverable conversion failures are delivered
    /// and listed in [`FrameMeta::degradations`]. Errors affect only this
    /// call; the session stays started.
    pub fn next_frame(&mut self, buffer: &mut OutputBuffer) -> Result<FrameFlow, AcquisitionError> {
        let invalid = AcquisitionError::InvalidState {
            operation: "next_frame",
            state: self.state,
        };
        let (width, height) = match (self.state, &self.effective) {
            (SessionState::Started, Some(effective)) => {
                (effective.width as usize, effective.height as usize)
            }
            _ => return Err(invalid),
        };
        check_buffer(buffer, width, height)?;
        let camera = self
            .resources
            .as_mut()
            .and_then(|res| res.camera.as_mut())
            .ok_or(invalid)?;

        let image = match camera.next_image() {
            Ok(image) => image,
            Err(SdkError::Timeout) => {
                self.stats.frame_timeouts += 1;
                warn!("Timed out waiting for a frame");
                return Err(AcquisitionError::FrameTimeout);
            }
            Err(err) => {
                self.stats.capture_failures += 1;
                warn!(error = %err, "Failed to grab frame");
                return Err(AcquisitionError::CaptureFailed(err));
            }
        };

        let transferred = transfer(&image, buffer, height);
        if let Err(err) = image.release() {
            warn!(error = %err, "Failed to release image");
        }
        let degradations = transferred?;

        for degradation in &degradations {
            match degradation {
                AcquisitionError::IncompleteFrame => self.stats.incomplete_frames += 1,
                _ => self.stats.conversion_fallbacks += 1,
            }
        }

        let timing = self.clock.tick();
        let meta = FrameMeta {
            offset: timing.offset,
            offset_end: timing.offset_end,
            pts: timing.pts,
            dts: timing.pts,
            duration: timing.duration,
            degradations,
        };
        buffer.stamp(&meta);
        self.stats.frames_delivered = self.clock.delivered();
        self.stats.last_pts = timing.pts;

        debug!(
            offset = meta.offset,
            pts = meta.pts,
            duration = meta.duration,
            "Frame delivered"
        );

        if timing.last {
            info!(frames = timing.offset_end, "Frame limit reached");
            Ok(FrameFlow::EndOfStream(meta))
        } else {
            Ok(FrameFlow::Continue(meta))
        }
    }

    /// Stops streaming and releases every SDK handle.
    ///
    /// Never fails: teardown problems are logged and counted. Calling it
    /// on a session that is not started is a no-op.
    pub fn stop(&mut self) -> Result<(), AcquisitionError> {
        match self.state {
            SessionState::Idle | SessionState::Stopped => {
                debug!("Stop requested on idle session");
                return Ok(());
            }
            SessionState::Failed => {
                self.state = SessionState::Idle;
                return Ok(());
            }
            SessionState::Started => {}
        }

        info!(frames = self.stats.frames_delivered, "Stopping acquisition");
        self.state = SessionState::Stopped;
        if let Some(resources) = self.resources.take() {
            let steps = resources.release();
            if !steps.is_empty() {
                self.stats.teardown_failures += steps.len() as u64;
                let err = AcquisitionError::TeardownPartialFailure { steps };
                warn!(error = %err, "Camera resources not fully released");
            }
        }
        self.effective = None;
        self.state = SessionState::Idle;
        info!("Acquisition stopped");
        Ok(())
    }
}

impl<S: CameraSdk> Drop for FrameAcquisitionSession<S> {
    fn drop(&mut self) {
        if self.state == SessionState::Started {
            if let Err(err) = self.stop() {
                warn!(error = %err, "Stop on drop failed");
            }
        }
    }
}

/// The buffer must hold `height` full rows of at least `width` bytes each.
fn check_buffer(buffer: &OutputBuffer, width: usize, height: usize) -> Result<(), AcquisitionError> {
    let stride = buffer.stride().max(width);
    let needed = stride.saturating_mul(height);
    if buffer.stride() < width || buffer.data().len() < needed {
        return Err(AcquisitionError::BufferTooSmall {
            needed,
            actual: buffer.data().len(),
        });
    }
    Ok(())
}

impl From<CopyError> for AcquisitionError {
    fn from(err: CopyError) -> Self {
        match err {
            CopyError::DestinationTooShort { needed, actual } => {
                AcquisitionError::BufferTooSmall { needed, actual }
            }
            source @ CopyError::SourceTooShort { .. } => {
                AcquisitionError::ConversionFailed(source.to_string())
            }
        }
    }
}

/// Converts `image` to Mono8 and copies it into `buffer`.
///
/// Returns the non-fatal problems met along the way.
fn transfer<I: RawImage>(
    image: &I,
    buffer: &mut OutputBuffer,
    height: usize,
) -> Result<Vec<AcquisitionError>, AcquisitionError> {
    let mut degradations = Vec::new();
    match image.is_incomplete() {
        Ok(true) => {
            warn!("Image incomplete, delivering partial data");
            degradations.push(AcquisitionError::IncompleteFrame);
        }
        Ok(false) => {}
        Err(err) => warn!(error = %err, "Could not query image completeness"),
    }

    let rows = height.min(image.height());
    let dst_stride = buffer.stride();
    match image.convert_mono8() {
        Ok(converted) => {
            copy_rows(&converted.data, converted.stride, buffer.data_mut(), dst_stride, rows)?;
        }
        Err(err) if image.pixel_format() == PixelFormat::Mono8 => {
            warn!(error = %err, "Conversion failed, copying Mono8 source directly");
            degradations.push(AcquisitionError::ConversionFailed(err.to_string()));
            copy_rows(image.data(), image.stride(), buffer.data_mut(), dst_stride, rows)?;
        }
        Err(err) => return Err(AcquisitionError::ConversionFailed(err.to_string())),
    }
    Ok(degradations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::simulated::{SdkCall, SimulatedCamera, SimulatedSdk};
    use crate::sdk::NodeAccess;

    fn session(sdk: &SimulatedSdk, config: CaptureConfig) -> FrameAcquisitionSession<SimulatedSdk> {
        FrameAcquisitionSession::with_config(sdk.clone(), config)
    }

    fn mono8(width: u32, height: u32) -> CaptureConfig {
        CaptureConfig {
            pixel_format: PixelFormat::Mono8,
            ..CaptureConfig::with_dimensions(width, height)
        }
    }

    #[test]
    fn test_lifecycle() {
        let sdk = SimulatedSdk::default();
        let mut session = session(&sdk, CaptureConfig::default());
        assert_eq!(session.state(), SessionState::Idle);

        session.start().unwrap();
        assert_eq!(session.state(), SessionState::Started);
        assert!(sdk.is_acquiring(0));
        assert!(session.stats().started_at.is_some());

        let mut buffer = OutputBuffer::for_format(640, 512);
        let flow = session.next_frame(&mut buffer).unwrap();
        assert_eq!(flow.meta().offset, 0);
        assert_eq!(buffer.data().len(), 512 * 640);
        assert_eq!(buffer.offset(), Some(0));

        session.stop().unwrap();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.effective_config().is_none());
        assert!(sdk.outstanding().is_clean());
        assert!(!sdk.is_claimed(0));
    }

    #[test]
    fn test_buffer_size_matches_stride() {
        let sdk = SimulatedSdk::default();
        for (width, height, stride) in [(640, 480, 640), (100, 10, 128), (33, 7, 64)] {
            let mut session = session(&sdk, CaptureConfig::with_dimensions(width, height));
            session.start().unwrap();
            let mut buffer = OutputBuffer::with_stride(stride, height as usize);
            session.next_frame(&mut buffer).unwrap();
            assert_eq!(buffer.data().len(), height as usize * stride);
            session.stop().unwrap();
        }
    }

    #[test]
    fn test_oversized_request_clamped() {
        let sdk = SimulatedSdk::new(vec![SimulatedCamera::with_sensor(320, 240)]);
        let mut session = session(&sdk, CaptureConfig::with_dimensions(1920, 1080));
        session.start().unwrap();

        let effective = session.effective_config().unwrap();
        assert_eq!((effective.width, effective.height), (320, 240));
        assert_eq!(session.config().width, 1920);

        let mut buffer = OutputBuffer::for_format(320, 240);
        assert!(session.next_frame(&mut buffer).is_ok());
    }

    #[test]
    fn test_next_frame_outside_started_makes_no_sdk_calls() {
        let sdk = SimulatedSdk::default();
        let mut session = session(&sdk, CaptureConfig::default());
        let mut buffer = OutputBuffer::for_format(640, 512);

        assert!(matches!(
            session.next_frame(&mut buffer),
            Err(AcquisitionError::InvalidState {
                state: SessionState::Idle,
                ..
            })
        ));
        assert_eq!(sdk.total_calls(), 0);

        session.start().unwrap();
        session.stop().unwrap();
        let calls = sdk.total_calls();
        assert!(matches!(
            session.next_frame(&mut buffer),
            Err(AcquisitionError::InvalidState { .. })
        ));
        assert_eq!(sdk.total_calls(), calls);
    }

    #[test]
    fn test_stop_idempotent() {
        let sdk = SimulatedSdk::default();
        let mut session = session(&sdk, CaptureConfig::default());
        assert!(session.stop().is_ok());
        assert_eq!(sdk.total_calls(), 0);

        session.start().unwrap();
        session.stop().unwrap();
        let calls = sdk.total_calls();
        assert!(session.stop().is_ok());
        assert_eq!(sdk.total_calls(), calls);
        assert_eq!(sdk.call_count(SdkCall::ReleaseSystem), 1);
    }

    #[test]
    fn test_sequence_offsets_gap_free() {
        let sdk = SimulatedSdk::default();
        let mut session = session(&sdk, mono8(64, 48));
        session.start().unwrap();

        let mut buffer = OutputBuffer::for_format(64, 48);
        for expected in 0..50u64 {
            // Failed polls must not consume an offset.
            if expected % 7 == 3 {
                sdk.timeout_next(1);
                assert_eq!(
                    session.next_frame(&mut buffer),
                    Err(AcquisitionError::FrameTimeout)
                );
            }
            let meta = session.next_frame(&mut buffer).unwrap().meta().clone();
            assert_eq!(meta.offset, expected);
            assert_eq!(meta.offset_end, expected + 1);
        }
        assert_eq!(session.stats().frame_timeouts, 7);
        assert_eq!(session.stats().frames_delivered, 50);
        assert_eq!(session.state(), SessionState::Started);
    }

    #[test]
    fn test_frame_limit_ends_stream_on_last_frame() {
        let sdk = SimulatedSdk::default();
        let mut config = mono8(32, 32);
        config.frame_limit = 3;
        let mut session = session(&sdk, config);
        session.start().unwrap();

        let mut buffer = OutputBuffer::for_format(32, 32);
        assert!(!session.next_frame(&mut buffer).unwrap().is_end_of_stream());
        assert!(!session.next_frame(&mut buffer).unwrap().is_end_of_stream());
        let last = session.next_frame(&mut buffer).unwrap();
        assert!(last.is_end_of_stream());
        assert_eq!(last.meta().offset, 2);
        assert_eq!(session.state(), SessionState::Started);
    }

    #[test]
    fn test_unlimited_stream_never_ends() {
        let sdk = SimulatedSdk::default();
        let mut session = session(&sdk, mono8(16, 16));
        session.start().unwrap();
        let mut buffer = OutputBuffer::for_format(16, 16);
        for _ in 0..100 {
            assert!(!session.next_frame(&mut buffer).unwrap().is_end_of_stream());
        }
    }

    #[test]
    fn test_timestamps_follow_framerate() {
        let sdk = SimulatedSdk::default();
        let mut session = session(&sdk, mono8(16, 16));
        session.start().unwrap();

        let mut buffer = OutputBuffer::for_format(16, 16);
        let mut previous = 0;
        for _ in 0..5 {
            let meta = session.next_frame(&mut buffer).unwrap().meta().clone();
            assert_eq!(meta.pts - previous, 40_000_000);
            assert_eq!(meta.dts, meta.pts);
            assert_eq!(meta.duration, 40_000_000);
            assert_eq!(buffer.pts(), Some(meta.pts));
            previous = meta.pts;
        }
    }

    #[test]
    fn test_no_device_leaves_nothing_behind() {
        let sdk = SimulatedSdk::empty();
        let mut session = session(&sdk, CaptureConfig::default());
        assert_eq!(session.start(), Err(AcquisitionError::NoDeviceFound));
        assert_eq!(session.state(), SessionState::Failed);
        assert!(sdk.outstanding().is_clean());

        session.stop().unwrap();
        assert_eq!(session.state(), SessionState::Idle);

        sdk.plug(SimulatedCamera::default());
        session.start().unwrap();
        assert_eq!(session.state(), SessionState::Started);
    }

    #[test]
    fn test_start_failures_unwind_every_stage() {
        let stages = [
            SdkCall::CreateList,
            SdkCall::ListSize,
            SdkCall::ListGet,
            SdkCall::CameraInit,
            SdkCall::NodeWrite,
            SdkCall::BeginAcquisition,
        ];
        for call in stages {
            let sdk = SimulatedSdk::default();
            sdk.fail_next(call, 1);
            let mut session = session(&sdk, CaptureConfig::default());
            assert!(session.start().is_err(), "{call:?} should fail start");
            assert_eq!(session.state(), SessionState::Failed);
            assert!(sdk.outstanding().is_clean(), "{call:?} leaked handles");
            assert!(!sdk.is_claimed(0), "{call:?} left camera claimed");
        }
    }

    #[test]
    fn test_start_error_kinds() {
        let sdk = SimulatedSdk::default();
        sdk.fail_next(SdkCall::BeginAcquisition, 1);
        assert!(matches!(
            session(&sdk, CaptureConfig::default()).start(),
            Err(AcquisitionError::AcquisitionStartFailed(_))
        ));

        let mut config = CaptureConfig::default();
        config.camera_index = 3;
        assert!(matches!(
            session(&sdk, config).start(),
            Err(AcquisitionError::DeviceUnavailable { index: 3, .. })
        ));

        sdk.set_node_access(0, "Width", NodeAccess::READ_ONLY);
        assert!(matches!(
            session(&sdk, CaptureConfig::default()).start(),
            Err(AcquisitionError::ConfigurationRejected { ref field, .. }) if field == "Width"
        ));
    }

    #[test]
    fn test_claimed_camera_unavailable() {
        let sdk = SimulatedSdk::default();
        let mut first = session(&sdk, CaptureConfig::default());
        first.start().unwrap();

        let mut second = session(&sdk, CaptureConfig::default());
        assert!(matches!(
            second.start(),
            Err(AcquisitionError::DeviceUnavailable { index: 0, .. })
        ));
        assert_eq!(sdk.outstanding().systems, 1);

        first.stop().unwrap();
        second.stop().unwrap();
        second.start().unwrap();
    }

    #[test]
    fn test_start_rejected_unless_idle() {
        let sdk = SimulatedSdk::default();
        let mut session = session(&sdk, CaptureConfig::default());
        session.start().unwrap();
        assert!(matches!(
            session.start(),
            Err(AcquisitionError::InvalidState {
                state: SessionState::Started,
                ..
            })
        ));
        assert!(session.set_config(mono8(8, 8)).is_err());

        let sdk = SimulatedSdk::empty();
        let mut failed = FrameAcquisitionSession::new(sdk);
        assert!(failed.start().is_err());
        assert!(matches!(
            failed.start(),
            Err(AcquisitionError::InvalidState {
                state: SessionState::Failed,
                ..
            })
        ));
    }

    #[test]
    fn test_invalid_config_rejected_before_sdk() {
        let sdk = SimulatedSdk::default();
        let mut config = CaptureConfig::default();
        config.framerate = 0;
        let mut session = session(&sdk, config);
        assert!(matches!(
            session.start(),
            Err(AcquisitionError::InvalidConfig(_))
        ));
        assert_eq!(sdk.total_calls(), 0);
        assert_eq!(session.state(), SessionState::Failed);

        session.stop().unwrap();
        assert_eq!(sdk.total_calls(), 0);
        let mut config = CaptureConfig::default();
        config.framerate = 30;
        session.set_config(config).unwrap();
        session.start().unwrap();
    }

    #[test]
    fn test_teardown_continues_past_failures() {
        let sdk = SimulatedSdk::default();
        let mut session = session(&sdk, CaptureConfig::default());
        session.start().unwrap();

        sdk.fail_next(SdkCall::EndAcquisition, 1);
        sdk.fail_next(SdkCall::ClearList, 1);
        assert!(session.stop().is_ok());
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.stats().teardown_failures, 2);

        for call in [
            SdkCall::EndAcquisition,
            SdkCall::CameraDeinit,
            SdkCall::CameraRelease,
            SdkCall::ClearList,
            SdkCall::DestroyList,
            SdkCall::ReleaseSystem,
        ] {
            assert_eq!(sdk.call_count(call), 1, "{call:?}");
        }
        assert!(sdk.outstanding().is_clean());
    }

    #[test]
    fn test_incomplete_frame_still_delivered() {
        let sdk = SimulatedSdk::default();
        let mut session = session(&sdk, mono8(32, 8));
        session.start().unwrap();

        sdk.incomplete_next(1);
        let mut buffer = OutputBuffer::for_format(32, 8);
        let flow = session.next_frame(&mut buffer).unwrap();
        assert!(flow.meta().is_incomplete());
        assert_eq!(session.stats().incomplete_frames, 1);

        let flow = session.next_frame(&mut buffer).unwrap();
        assert!(flow.meta().is_clean());
        assert_eq!(flow.meta().offset, 1);
    }

    #[test]
    fn test_conversion_failure_falls_back_for_mono8() {
        let sdk = SimulatedSdk::default();
        let mut session = session(&sdk, mono8(32, 8));
        session.start().unwrap();

        sdk.fail_next(SdkCall::ConvertImage, 1);
        let mut buffer = OutputBuffer::for_format(32, 8);
        let flow = session.next_frame(&mut buffer).unwrap();
        assert!(matches!(
            flow.meta().degradations.as_slice(),
            [AcquisitionError::ConversionFailed(_)]
        ));
        assert_eq!(session.stats().conversion_fallbacks, 1);
        assert_eq!(sdk.outstanding().images, 0);
    }

    #[test]
    fn test_conversion_failure_releases_image() {
        let sdk = SimulatedSdk::default();
        let mut session = session(&sdk, CaptureConfig::with_dimensions(32, 8));
        session.start().unwrap();

        sdk.fail_next(SdkCall::ConvertImage, 1);
        let mut buffer = OutputBuffer::for_format(32, 8);
        assert!(matches!(
            session.next_frame(&mut buffer),
            Err(AcquisitionError::ConversionFailed(_))
        ));
        assert_eq!(sdk.call_count(SdkCall::ReleaseImage), 1);
        assert_eq!(sdk.outstanding().images, 0);
        assert_eq!(session.state(), SessionState::Started);

        let flow = session.next_frame(&mut buffer).unwrap();
        assert_eq!(flow.meta().offset, 0);
    }

    #[test]
    fn test_small_buffer_rejected_before_poll() {
        let sdk = SimulatedSdk::default();
        let mut session = session(&sdk, mono8(64, 64));
        session.start().unwrap();

        let mut buffer = OutputBuffer::for_format(64, 32);
        assert!(matches!(
            session.next_frame(&mut buffer),
            Err(AcquisitionError::BufferTooSmall { .. })
        ));
        let mut narrow = OutputBuffer::with_stride(32, 128);
        assert!(session.next_frame(&mut narrow).is_err());
        assert_eq!(sdk.call_count(SdkCall::NextImage), 0);
    }

    #[test]
    fn test_short_last_row_rejected_before_poll() {
        let sdk = SimulatedSdk::new(vec![SimulatedCamera {
            stride_alignment: 128,
            ..SimulatedCamera::with_sensor(100, 20)
        }]);
        let mut session = session(&sdk, mono8(100, 20));
        session.start().unwrap();

        let mut buffer = OutputBuffer::from_vec(vec![0; 19 * 120 + 100], 120, 20);
        assert_eq!(
            session.next_frame(&mut buffer),
            Err(AcquisitionError::BufferTooSmall {
                needed: 2400,
                actual: 2380
            })
        );
        assert_eq!(sdk.call_count(SdkCall::NextImage), 0);
        assert_eq!(sdk.frames_captured(0), 0);

        let mut buffer = OutputBuffer::with_stride(120, 20);
        assert!(session.next_frame(&mut buffer).is_ok());
    }

    #[test]
    fn test_aligned_source_rows_fill_padded_buffer() {
        let sdk = SimulatedSdk::new(vec![SimulatedCamera {
            stride_alignment: 128,
            ..SimulatedCamera::with_sensor(100, 10)
        }]);
        let mut session = session(&sdk, mono8(100, 10));
        session.start().unwrap();

        let mut buffer = OutputBuffer::with_stride(128, 10);
        buffer.data_mut().fill(0x55);
        session.next_frame(&mut buffer).unwrap();
        for row in 0..10 {
            let row = buffer.row(row).unwrap();
            assert!(row[100..].iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn test_drop_stops_session() {
        let sdk = SimulatedSdk::default();
        {
            let mut session = session(&sdk, CaptureConfig::default());
            session.start().unwrap();
            assert!(sdk.is_claimed(0));
        }
        assert!(sdk.outstanding().is_clean());
        assert!(!sdk.is_claimed(0));
    }
}
