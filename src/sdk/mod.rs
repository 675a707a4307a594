//! Vendor camera SDK interface.
//!
//! The Spinnaker SDK is a handle-based C API: a process-level system
//! handle hands out a camera list, the list hands out camera handles, and
//! each camera exposes a GenICam node map and a stream of images. Every
//! handle must be released explicitly, in reverse order of acquisition.
//!
//! These traits mirror that shape so the acquisition session can drive a
//! real binding or the in-process [`simulated`] SDK interchangeably.
//! Release methods consume their handle, so a released handle cannot be
//! used again.

mod node;
pub mod simulated;

pub use node::{NodeAccess, NodeError, ReadableEnumEntry, WritableEnum, WritableInteger};

use crate::capture::PixelFormat;
use thiserror::Error;

/// Errors reported by SDK calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SdkError {
    /// No result before the SDK timeout elapsed.
    #[error("timed out waiting for the device")]
    Timeout,
    /// Handle, node or device does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// The node or device refused the access mode.
    #[error("access denied: {0}")]
    AccessDenied(String),
    /// Held by another handle or process.
    #[error("resource busy: {0}")]
    Busy(String),
    /// A parameter was out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("SDK call failed with code {code}: {context}")]
    /// Any other SDK error code.
    Failure {
        /// Raw SDK error code.
        code: i32,
        /// Call that failed.
        context: String,
    },
}

/// Result type for SDK calls.
pub type SdkResult<T> = Result<T, SdkError>;

/// Entry point of an SDK binding.
pub trait CameraSdk {
    /// System handle type.
    type System: CameraSystem;

    /// Acquires the system handle.
    fn acquire_system(&mut self) -> SdkResult<Self::System>;
}

/// System-level handle from which cameras are enumerated.
pub trait CameraSystem {
    /// Camera list type.
    type List: CameraList;

    /// Creates a camera list populated with every detected camera.
    fn cameras(&mut self) -> SdkResult<Self::List>;

    /// Releases the system handle.
    fn release(self) -> SdkResult<()>;
}

/// Enumerated cameras.
pub trait CameraList {
    /// Camera handle type.
    type Camera: CameraDevice;

    /// Number of cameras in the list.
    fn len(&self) -> SdkResult<usize>;

    /// True if no camera was detected.
    fn is_empty(&self) -> SdkResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Returns a handle to the camera at `index`.
    fn get(&self, index: usize) -> SdkResult<Self::Camera>;

    /// Drops the list's references to its cameras.
    fn clear(&mut self) -> SdkResult<()>;

    /// Destroys the list.
    fn destroy(self) -> SdkResult<()>;
}

/// Handle to one physical camera.
pub trait CameraDevice {
    /// Node map type.
    type Nodes: NodeMap;
    /// Image type produced by [`CameraDevice::next_image`].
    type Image: RawImage;

    /// Initializes the camera, claiming it for this handle.
    fn init(&mut self) -> SdkResult<()>;

    /// Deinitializes the camera.
    fn deinit(&mut self) -> SdkResult<()>;

    /// Returns the GenICam node map. Only valid after [`CameraDevice::init`].
    fn node_map(&mut self) -> SdkResult<&mut Self::Nodes>;

    /// Starts streaming.
    fn begin_acquisition(&mut self) -> SdkResult<()>;

    /// Stops streaming.
    fn end_acquisition(&mut self) -> SdkResult<()>;

    /// Blocks until the next image is available or the driver times out.
    fn next_image(&mut self) -> SdkResult<Self::Image>;

    /// Releases the camera handle.
    fn release(self) -> SdkResult<()>;
}

/// GenICam node map of a camera.
pub trait NodeMap {
    /// Availability and access mode of the node `name`.
    fn access(&self, name: &str) -> SdkResult<NodeAccess>;

    /// Inclusive bounds of the integer node `name`.
    fn integer_bounds(&self, name: &str) -> SdkResult<(i64, i64)>;

    /// Writes the integer node `name`.
    fn set_integer(&mut self, name: &str, value: i64) -> SdkResult<()>;

    /// Availability and access mode of `entry` on the enumeration node `name`.
    fn enum_entry_access(&self, name: &str, entry: &str) -> SdkResult<NodeAccess>;

    /// Integer value of `entry` on the enumeration node `name`.
    fn enum_entry_value(&self, name: &str, entry: &str) -> SdkResult<i64>;

    /// Writes the enumeration node `name` by entry value.
    fn set_enum(&mut self, name: &str, value: i64) -> SdkResult<()>;
}

/// Image converted to 8-bit mono by the SDK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedImage {
    /// One byte per pixel, rows `stride` bytes apart.
    pub data: Vec<u8>,
    /// Width in pixels.
    pub width: usize,
    /// Height in rows.
    pub height: usize,
    /// Row pitch in bytes.
    pub stride: usize,
}

/// An image owned by the SDK until released.
pub trait RawImage {
    /// True if the camera delivered only part of the exposure.
    fn is_incomplete(&self) -> SdkResult<bool>;

    /// Width in pixels.
    fn width(&self) -> usize;

    /// Height in rows.
    fn height(&self) -> usize;

    /// Distance in bytes between consecutive rows of [`RawImage::data`].
    fn stride(&self) -> usize;

    /// Format of [`RawImage::data`].
    fn pixel_format(&self) -> PixelFormat;

    /// Raw sensor data.
    fn data(&self) -> &[u8];

    /// Converts the image to 8-bit mono.
    fn convert_mono8(&self) -> SdkResult<ConvertedImage>;

    /// Hands the image back to the SDK.
    fn release(self) -> SdkResult<()>;
}

/// Camera list type of an SDK.
pub type ListOf<S> = <<S as CameraSdk>::System as CameraSystem>::List;
/// Camera handle type of an SDK.
pub type CameraOf<S> = <ListOf<S> as CameraList>::Camera;
/// Image type of an SDK.
pub type ImageOf<S> = <CameraOf<S> as CameraDevice>::Image;
