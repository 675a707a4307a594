//! Image settings applied before acquisition begins.
//!
//! Settings take effect immediately on the device, and image format nodes
//! become read-only once streaming starts. Offsets are moved to their
//! minimum before the dimensions are set, since a non-zero offset shrinks
//! the largest width and height the sensor accepts.

use super::AcquisitionError;
use crate::capture::CaptureConfig;
use crate::sdk::{NodeMap, WritableEnum, WritableInteger};
use tracing::{debug, info};

/// Sensor pixel format enumeration.
pub const PIXEL_FORMAT: &str = "PixelFormat";
/// Horizontal region offset.
pub const OFFSET_X: &str = "OffsetX";
/// Vertical region offset.
pub const OFFSET_Y: &str = "OffsetY";
/// Region width in pixels.
pub const WIDTH: &str = "Width";
/// Region height in rows.
pub const HEIGHT: &str = "Height";

/// Applies pixel format, offsets and dimensions from `config`.
///
/// Returns `config` with width and height replaced by the values the
/// camera actually accepted.
pub fn apply_image_settings<N: NodeMap + ?Sized>(
    nodes: &mut N,
    config: &CaptureConfig,
) -> Result<CaptureConfig, AcquisitionError> {
    let value = WritableEnum::acquire(nodes, PIXEL_FORMAT)?
        .set_entry(config.pixel_format.node_entry())?;
    debug!(format = %config.pixel_format, value, "Pixel format set");

    for name in [OFFSET_X, OFFSET_Y] {
        let mut offset = WritableInteger::acquire(nodes, name)?;
        let min = offset.min();
        offset.set(min)?;
        debug!(node = name, value = min, "Offset set to minimum");
    }

    let width = apply_dimension(nodes, WIDTH, config.width)?;
    let height = apply_dimension(nodes, HEIGHT, config.height)?;

    Ok(CaptureConfig {
        width,
        height,
        ..config.clone()
    })
}

/// Writes a dimension node, clamping the request to the node's bounds.
fn apply_dimension<N: NodeMap + ?Sized>(
    nodes: &mut N,
    name: &'static str,
    requested: u32,
) -> Result<u32, AcquisitionError> {
    let mut node = WritableInteger::acquire(nodes, name)?;
    let value = node.clamp(i64::from(requested));
    if value != i64::from(requested) {
        info!(
            node = name,
            requested,
            applied = value,
            "Requested size outside device limits, clamped"
        );
    }
    node.set(value)?;
    u32::try_from(value).map_err(|_| AcquisitionError::ConfigurationRejected {
        field: name.to_string(),
        reason: format!("device reported unusable value {value}"),
    })
}
