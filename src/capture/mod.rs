//! Capture configuration and frame buffers.
//!
//! This module holds the values that cross the boundary between the host
//! pipeline and the acquisition session: what to capture, where to put
//! it, and what came back.

mod config;
mod frame;

pub use config::{
    CaptureConfig, ConfigError, FileConfig, OutputConfig, PixelFormat, SourceConfig,
    MAX_CAMERA_INDEX,
};
pub use frame::{FrameFlow, FrameMeta, OutputBuffer, OUTPUT_BYTES_PER_SAMPLE};
