//! Capture configuration.
//!
//! The configuration is fixed once acquisition starts. Width and height
//! are requests: the device clamps them to what the sensor supports and
//! the effective values are reported back by the session.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Highest camera index accepted by the `camera-id` property.
pub const MAX_CAMERA_INDEX: u32 = 7;

/// Sensor pixel formats the session can request from the camera.
///
/// Every format is converted to 8-bit mono before it reaches the
/// output buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 8 bits per pixel.
    Mono8,
    /// 10 bits per pixel.
    Mono10,
    /// 12 bits per pixel.
    Mono12,
    /// 14 bits per pixel.
    Mono14,
    /// 16 bits per pixel.
    Mono16,
}

impl PixelFormat {
    /// All formats, narrowest first.
    pub const ALL: [PixelFormat; 5] = [
        PixelFormat::Mono8,
        PixelFormat::Mono10,
        PixelFormat::Mono12,
        PixelFormat::Mono14,
        PixelFormat::Mono16,
    ];

    /// Name of the matching entry on the `PixelFormat` enumeration node.
    pub fn node_entry(self) -> &'static str {
        match self {
            PixelFormat::Mono8 => "Mono8",
            PixelFormat::Mono10 => "Mono10",
            PixelFormat::Mono12 => "Mono12",
            PixelFormat::Mono14 => "Mono14",
            PixelFormat::Mono16 => "Mono16",
        }
    }

    /// Significant bits per sample.
    pub fn bit_depth(self) -> u32 {
        match self {
            PixelFormat::Mono8 => 8,
            PixelFormat::Mono10 => 10,
            PixelFormat::Mono12 => 12,
            PixelFormat::Mono14 => 14,
            PixelFormat::Mono16 => 16,
        }
    }

    /// Bytes used to store one sample in an unpacked raw image.
    pub fn bytes_per_pixel(self) -> usize {
        if self.bit_depth() > 8 {
            2
        } else {
            1
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.node_entry())
    }
}

impl FromStr for PixelFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PixelFormat::ALL
            .into_iter()
            .find(|format| format.node_entry().eq_ignore_ascii_case(s))
            .ok_or_else(|| ConfigError::UnknownPixelFormat(s.to_string()))
    }
}

/// Configuration for a capture session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Index into the list of enumerated cameras.
    pub camera_index: u32,
    /// Requested frame width in pixels.
    pub width: u32,
    /// Requested frame height in pixels.
    pub height: u32,
    /// Pixel format requested from the sensor.
    pub pixel_format: PixelFormat,
    /// Nominal frames per second, used for buffer timestamps.
    pub framerate: u32,
    /// Number of frames after which the stream ends (0 = unlimited).
    pub frame_limit: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            camera_index: 0,
            width: 640,
            height: 512,
            pixel_format: PixelFormat::Mono14,
            framerate: 25,
            frame_limit: 0,
        }
    }
}

impl CaptureConfig {
    /// Creates a new configuration with the specified dimensions.
    pub fn with_dimensions(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }
        if self.framerate == 0 {
            return Err(ConfigError::InvalidFrameRate);
        }
        if self.camera_index > MAX_CAMERA_INDEX {
            return Err(ConfigError::InvalidCameraIndex(self.camera_index));
        }
        Ok(())
    }

    /// Duration of one frame in nanoseconds.
    pub fn frame_duration_ns(&self) -> u64 {
        1_000_000_000 / u64::from(self.framerate.max(1))
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Width or height is zero.
    #[error("invalid frame dimensions {width}x{height}")]
    InvalidDimensions {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },
    /// Frame rate is zero.
    #[error("invalid frame rate (must be at least 1 fps)")]
    InvalidFrameRate,
    /// Camera index above the supported range.
    #[error("camera index {0} out of range (0-{MAX_CAMERA_INDEX})")]
    InvalidCameraIndex(u32),
    /// Pixel format name not recognised.
    #[error("unknown pixel format: {0}")]
    UnknownPixelFormat(String),
    /// The config file could not be read.
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    /// The config file is not valid TOML for [`FileConfig`].
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Full configuration file format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Host-facing source settings that are not part of the camera setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SourceConfig {
    /// Leave presentation timestamps to the host pipeline.
    pub do_timestamp: bool,
}

/// Output configuration for the capture CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// File receiving raw GRAY8 frames, if any.
    pub path: Option<PathBuf>,
    /// Log a progress line every this many frames.
    pub report_interval: u64,
    /// Metrics server port (0 to disable).
    pub metrics_port: u16,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: None,
            report_interval: 100,
            metrics_port: 0,
        }
    }
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.capture.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = CaptureConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.width, 640);
        assert_eq!(config.height, 512);
        assert_eq!(config.pixel_format, PixelFormat::Mono14);
    }

    #[test]
    fn test_zero_dimensions_invalid() {
        let mut config = CaptureConfig::default();
        config.height = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDimensions { height: 0, .. })
        ));
    }

    #[test]
    fn test_camera_index_range() {
        let mut config = CaptureConfig::default();
        config.camera_index = MAX_CAMERA_INDEX;
        assert!(config.validate().is_ok());

        config.camera_index = MAX_CAMERA_INDEX + 1;
        assert_eq!(config.validate(), Err(ConfigError::InvalidCameraIndex(8)));
    }

    #[test]
    fn test_frame_duration() {
        let mut config = CaptureConfig::default();
        assert_eq!(config.frame_duration_ns(), 40_000_000);

        config.framerate = 31;
        assert_eq!(config.frame_duration_ns(), 32_258_064);
    }

    #[test]
    fn test_pixel_format_parse() {
        assert_eq!("mono12".parse::<PixelFormat>(), Ok(PixelFormat::Mono12));
        assert_eq!("Mono8".parse::<PixelFormat>(), Ok(PixelFormat::Mono8));
        assert!(matches!(
            "RGB8".parse::<PixelFormat>(),
            Err(ConfigError::UnknownPixelFormat(_))
        ));
        assert_eq!(PixelFormat::Mono8.bytes_per_pixel(), 1);
        assert_eq!(PixelFormat::Mono10.bytes_per_pixel(), 2);
    }

    #[test]
    fn test_file_config_partial_sections() {
        let config = FileConfig::from_toml(
            r#"
            [capture]
            width = 1024
            pixel_format = "Mono12"
            frame_limit = 50

            [source]
            do_timestamp = true
            "#,
        )
        .unwrap();

        assert_eq!(config.capture.width, 1024);
        assert_eq!(config.capture.height, 512);
        assert_eq!(config.capture.pixel_format, PixelFormat::Mono12);
        assert_eq!(config.capture.frame_limit, 50);
        assert!(config.source.do_timestamp);
        assert_eq!(config.output, OutputConfig::default());
    }

    #[test]
    fn test_file_config_round_trip() {
        let mut config = FileConfig::default();
        config.capture.camera_index = 2;
        config.output.path = Some(PathBuf::from("frames.raw"));

        let text = toml::to_string(&config).unwrap();
        assert_eq!(FileConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_file_config_rejects_invalid_capture() {
        let result = FileConfig::from_toml("[capture]\nframerate = 0\n");
        assert_eq!(result, Err(ConfigError::InvalidFrameRate));
    }
}
