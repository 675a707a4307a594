//! Acquisition error taxonomy.

use super::SessionState;
use crate::capture::ConfigError;
use crate::sdk::{NodeError, SdkError};
use std::fmt;
use thiserror::Error;

/// Errors raised by a [`FrameAcquisitionSession`](super::FrameAcquisitionSession).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AcquisitionError {
    /// The camera list was empty.
    #[error("no camera detected")]
    NoDeviceFound,
    #[error("camera {index} unavailable: {reason}")]
    /// The selected camera could not be opened.
    DeviceUnavailable {
        /// Requested camera index.
        index: usize,
        /// What went wrong.
        reason: String,
    },
    #[error("camera rejected setting {field}: {reason}")]
    /// A node write or check failed during configuration.
    ConfigurationRejected {
        /// Node name.
        field: String,
        /// What went wrong.
        reason: String,
    },
    /// `BeginAcquisition` failed.
    #[error("failed to begin acquisition: {0}")]
    AcquisitionStartFailed(#[source] SdkError),
    /// The poll returned no frame in time.
    #[error("timed out waiting for a frame")]
    FrameTimeout,
    /// The frame is missing packets. Delivered as a degradation.
    #[error("camera delivered an incomplete frame")]
    IncompleteFrame,
    /// Conversion to 8-bit mono failed.
    #[error("pixel format conversion failed: {0}")]
    ConversionFailed(String),
    #[error("teardown failed at {}", join_steps(.steps))]
    /// Teardown ran to the end but some steps failed.
    TeardownPartialFailure {
        /// Failed steps, in order.
        steps: Vec<TeardownStep>,
    },
    #[error("{operation} is not valid while {state}")]
    /// The operation is not allowed in the current state.
    InvalidState {
        /// Rejected operation.
        operation: &'static str,
        /// State at the time of the call.
        state: SessionState,
    },
    #[error("output buffer holds {actual} bytes, frame needs {needed}")]
    /// The output buffer cannot hold a full frame.
    BufferTooSmall {
        /// Bytes one frame occupies.
        needed: usize,
        /// Bytes the buffer holds.
        actual: usize,
    },
    /// The poll failed for a reason other than timeout.
    #[error("failed to grab frame: {0}")]
    CaptureFailed(#[source] SdkError),
    /// The capture configuration failed validation.
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
    /// Any other SDK failure.
    #[error("camera SDK error: {0}")]
    Sdk(#[source] SdkError),
}

impl AcquisitionError {
    /// False for per-frame problems that still let a frame through.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            AcquisitionError::IncompleteFrame | AcquisitionError::ConversionFailed(_)
        )
    }
}

impl From<NodeError> for AcquisitionError {
    fn from(err: NodeError) -> Self {
        AcquisitionError::ConfigurationRejected {
            field: err.node().to_string(),
            reason: err.to_string(),
        }
    }
}

/// Resource release steps run when a session shuts down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TeardownStep {
    /// `EndAcquisition`.
    EndAcquisition,
    /// `DeInit` on the camera.
    DeinitCamera,
    /// Releasing the camera handle.
    ReleaseCamera,
    /// Clearing the camera list.
    ClearCameraList,
    /// Destroying the camera list.
    DestroyCameraList,
    /// Releasing the system instance.
    ReleaseSystem,
}

impl fmt::Display for TeardownStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TeardownStep::EndAcquisition => "end acquisition",
            TeardownStep::DeinitCamera => "deinit camera",
            TeardownStep::ReleaseCamera => "release camera",
            TeardownStep::ClearCameraList => "clear camera list",
            TeardownStep::DestroyCameraList => "destroy camera list",
            TeardownStep::ReleaseSystem => "release system",
        };
        f.write_str(name)
    }
}

fn join_steps(steps: &[TeardownStep]) -> String {
    steps
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
