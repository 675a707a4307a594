//! Push-source adapter for media pipelines.
//!
//! [`SpinnakerSource`] exposes a [`FrameAcquisitionSession`] through the
//! callbacks a live push source implements: property access, `start`,
//! `stop`, caps negotiation and `create`. It carries no pipeline framework
//! of its own, so a plugin binding only has to forward its vfuncs here.
//!
//! ```no_run
//! use spinnaker_source::sdk::simulated::SimulatedSdk;
//! use spinnaker_source::source::SpinnakerSource;
//!
//! let mut src = SpinnakerSource::new(SimulatedSdk::default());
//! src.set_property("pixel-format", "Mono8").unwrap();
//! src.set_property("num-buffers", "10").unwrap();
//! src.start().unwrap();
//! loop {
//!     let (buffer, flow) = src.create().unwrap();
//!     println!("frame {:?}", buffer.offset());
//!     if flow.is_end_of_stream() {
//!         break;
//!     }
//! }
//! src.stop().unwrap();
//! ```

mod caps;

pub use caps::{CapsParseError, VideoCaps, FORMAT_GRAY8, INTERLACE_PROGRESSIVE, MEDIA_TYPE};

use crate::acquisition::{AcquisitionError, FrameAcquisitionSession, SessionState, SessionStats};
use crate::capture::{
    CaptureConfig, FileConfig, FrameFlow, OutputBuffer, PixelFormat, MAX_CAMERA_INDEX,
};
use crate::sdk::CameraSdk;
use thiserror::Error;
use tracing::{debug, info};

/// Element factory name.
pub const ELEMENT_NAME: &str = "spinnakersrc";
/// Human readable element name.
pub const LONG_NAME: &str = "Spinnaker camera source";
/// Element classification.
pub const CLASSIFICATION: &str = "Source/Video";
/// Element description.
pub const DESCRIPTION: &str = "Captures 8-bit grayscale frames from FLIR Spinnaker cameras";

/// Names of every property, in declaration order.
pub const PROPERTIES: [&str; 7] = [
    "camera-id",
    "width",
    "height",
    "framerate",
    "pixel-format",
    "num-buffers",
    "do-timestamp",
];

/// Errors raised by [`SpinnakerSource`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The property is read-only while streaming.
    #[error("property {0} cannot change while streaming")]
    PropertyLocked(&'static str),
    /// No property has this name.
    #[error("unknown property {0}")]
    UnknownProperty(String),
    #[error("invalid value '{value}' for property {name}: {reason}")]
    /// The value could not be parsed or is out of range.
    InvalidPropertyValue {
        /// Property name.
        name: &'static str,
        /// Value as given.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
    #[error("caps not supported: offered {offered}, expected {expected}")]
    /// Offered caps differ from the fixed caps of the source.
    UnsupportedCaps {
        /// Caps proposed by the host.
        offered: String,
        /// Caps the source produces.
        expected: String,
    },
    /// The session failed.
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),
}

impl SourceError {
    /// True if only the current frame was lost and `create` may be called again.
    pub fn is_frame_loss(&self) -> bool {
        matches!(
            self,
            SourceError::Acquisition(
                AcquisitionError::FrameTimeout
                    | AcquisitionError::CaptureFailed(_)
                    | AcquisitionError::ConversionFailed(_)
            )
        )
    }
}

/// Live source producing GRAY8 frames from one camera.
pub struct SpinnakerSource<S: CameraSdk> {
    session: FrameAcquisitionSession<S>,
    settings: CaptureConfig,
    do_timestamp: bool,
    negotiated: bool,
}

impl<S: CameraSdk> SpinnakerSource<S> {
    /// Creates a source with default properties.
    pub fn new(sdk: S) -> Self {
        Self::with_config(sdk, &FileConfig::default())
    }

    /// Creates a source with properties taken from a configuration file.
    pub fn with_config(sdk: S, config: &FileConfig) -> Self {
        Self {
            session: FrameAcquisitionSession::with_config(sdk, config.capture.clone()),
            settings: config.capture.clone(),
            do_timestamp: config.source.do_timestamp,
            negotiated: false,
        }
    }

    /// The underlying session.
    pub fn session(&self) -> &FrameAcquisitionSession<S> {
        &self.session
    }

    /// Counters of the current or most recent run.
    pub fn stats(&self) -> &SessionStats {
        self.session.stats()
    }

    /// True between a successful `start` and `stop`.
    pub fn is_started(&self) -> bool {
        self.session.state() == SessionState::Started
    }

    /// Camera sources produce data on their own schedule.
    pub fn is_live(&self) -> bool {
        true
    }

    /// True once downstream has accepted the caps.
    pub fn is_negotiated(&self) -> bool {
        self.negotiated
    }

    /// Properties as they will be applied on the next `start`.
    pub fn settings(&self) -> &CaptureConfig {
        &self.settings
    }

    fn unlocked(&self, name: &'static str) -> Result<(), SourceError> {
        if self.is_started() {
            Err(SourceError::PropertyLocked(name))
        } else {
            Ok(())
        }
    }

    /// Sets `camera-id`, the index of the camera to open.
    pub fn set_camera_id(&mut self, index: u32) -> Result<(), SourceError> {
        self.unlocked("camera-id")?;
        if index > MAX_CAMERA_INDEX {
            return Err(SourceError::InvalidPropertyValue {
                name: "camera-id",
                value: index.to_string(),
                reason: format!("must be between 0 and {MAX_CAMERA_INDEX}"),
            });
        }
        self.settings.camera_index = index;
        Ok(())
    }

    /// Sets `width`, the requested frame width.
    pub fn set_width(&mut self, width: u32) -> Result<(), SourceError> {
        self.unlocked("width")?;
        self.settings.width = positive("width", width)?;
        Ok(())
    }

    /// Sets `height`, the requested frame height.
    pub fn set_height(&mut self, height: u32) -> Result<(), SourceError> {
        self.unlocked("height")?;
        self.settings.height = positive("height", height)?;
        Ok(())
    }

    /// Sets `framerate`, the nominal rate used for timestamps.
    pub fn set_framerate(&mut self, framerate: u32) -> Result<(), SourceError> {
        self.unlocked("framerate")?;
        self.settings.framerate = positive("framerate", framerate)?;
        Ok(())
    }

    /// Sets `pixel-format`, the format requested from the sensor.
    pub fn set_pixel_format(&mut self, format: PixelFormat) -> Result<(), SourceError> {
        self.unlocked("pixel-format")?;
        self.settings.pixel_format = format;
        Ok(())
    }

    /// Sets `num-buffers`; 0 streams until stopped.
    pub fn set_num_buffers(&mut self, count: u64) -> Result<(), SourceError> {
        self.unlocked("num-buffers")?;
        self.settings.frame_limit = count;
        Ok(())
    }

    /// Sets `do-timestamp`. When true, buffers leave pts and dts unset.
    pub fn set_do_timestamp(&mut self, enabled: bool) -> Result<(), SourceError> {
        self.unlocked("do-timestamp")?;
        self.do_timestamp = enabled;
        Ok(())
    }

    /// Index of the camera to open.
    pub fn camera_id(&self) -> u32 {
        self.settings.camera_index
    }

    /// Requested frame width in pixels.
    pub fn width(&self) -> u32 {
        self.settings.width
    }

    /// Requested frame height in pixels.
    pub fn height(&self) -> u32 {
        self.settings.height
    }

    /// Nominal frames per second used for timestamps.
    pub fn framerate(&self) -> u32 {
        self.settings.framerate
    }

    /// Sensor pixel format requested from the camera.
    pub fn pixel_format(&self) -> PixelFormat {
        self.settings.pixel_format
    }

    /// Frames to deliver before end of stream; 0 is unlimited.
    pub fn num_buffers(&self) -> u64 {
        self.settings.frame_limit
    }

    /// Whether the host stamps buffers instead of the source.
    pub fn do_timestamp(&self) -> bool {
        self.do_timestamp
    }

    /// Sets a property from its string form.
    pub fn set_property(&mut self, name: &str, value: &str) -> Result<(), SourceError> {
        match name {
            "camera-id" => self.set_camera_id(parse("camera-id", value)?),
            "width" => self.set_width(parse("width", value)?),
            "height" => self.set_height(parse("height", value)?),
            "framerate" => self.set_framerate(parse("framerate", value)?),
            "pixel-format" => self.set_pixel_format(parse("pixel-format", value)?),
            "num-buffers" => self.set_num_buffers(parse("num-buffers", value)?),
            "do-timestamp" => self.set_do_timestamp(parse("do-timestamp", value)?),
            other => Err(SourceError::UnknownProperty(other.to_string())),
        }
    }

    /// Returns a property in string form.
    pub fn property(&self, name: &str) -> Result<String, SourceError> {
        Ok(match name {
            "camera-id" => self.camera_id().to_string(),
            "width" => self.width().to_string(),
            "height" => self.height().to_string(),
            "framerate" => self.framerate().to_string(),
            "pixel-format" => self.pixel_format().to_string(),
            "num-buffers" => self.num_buffers().to_string(),
            "do-timestamp" => self.do_timestamp().to_string(),
            other => return Err(SourceError::UnknownProperty(other.to_string())),
        })
    }

    /// Opens the camera and starts streaming with the current properties.
    pub fn start(&mut self) -> Result<(), SourceError> {
        if self.session.state() == SessionState::Failed {
            self.session.stop()?;
        }
        self.session.set_config(self.settings.clone())?;
        self.negotiated = false;
        self.session.start()?;
        info!(element = ELEMENT_NAME, caps = %self.caps(), "Source started");
        Ok(())
    }

    /// Stops streaming and releases the camera.
    pub fn stop(&mut self) -> Result<(), SourceError> {
        self.negotiated = false;
        self.session.stop()?;
        Ok(())
    }

    /// The only caps this source can produce.
    ///
    /// Reflects the dimensions the camera accepted once started.
    pub fn caps(&self) -> VideoCaps {
        let config = self.session.effective_config().unwrap_or(&self.settings);
        VideoCaps::gray8(config.width, config.height)
    }

    /// Accepts downstream caps if they match [`caps`](Self::caps) exactly.
    pub fn set_caps(&mut self, caps: &VideoCaps) -> Result<(), SourceError> {
        let expected = self.caps();
        if *caps != expected {
            return Err(SourceError::UnsupportedCaps {
                offered: caps.to_string(),
                expected: expected.to_string(),
            });
        }
        debug!(caps = %caps, "Caps accepted");
        self.negotiated = true;
        Ok(())
    }

    /// Captures the next frame into a newly allocated buffer.
    pub fn create(&mut self) -> Result<(OutputBuffer, FrameFlow), SourceError> {
        let caps = self.caps();
        let mut buffer = OutputBuffer::for_format(caps.width, caps.height);
        let flow = self.session.next_frame(&mut buffer)?;
        if self.do_timestamp {
            buffer.clear_timestamps();
        }
        Ok((buffer, flow))
    }
}

fn positive(name: &'static str, value: u32) -> Result<u32, SourceError> {
    if value == 0 {
        return Err(SourceError::InvalidPropertyValue {
            name,
            value: value.to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(value)
}

fn parse<T>(name: &'static str, value: &str) -> Result<T, SourceError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|err: T::Err| SourceError::InvalidPropertyValue {
            name,
            value: value.to_string(),
            reason: err.to_string(),
        })
}
