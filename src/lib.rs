//! Spinnaker Camera Source Library
//!
//! Streams 8-bit grayscale frames from FLIR Spinnaker machine-vision
//! cameras into a media pipeline. One camera is opened, configured and
//! polled synchronously; each frame is converted to GRAY8, copied into a
//! caller-supplied buffer and stamped with a frame-rate derived timestamp
//! and a gap-free sequence offset.
//!
//! # Architecture
//!
//! ```text
//! source (host adapter: properties, caps, create)
//!    ↓
//! acquisition (session state machine, node setup, row copy, clock)
//!    ↓
//! sdk (handle traits, capability-checked nodes, simulated bus)
//!
//! capture (config, buffers)    metrics (Prometheus counters)
//! ```
//!
//! # Design Principles
//!
//! - **Owned handles**: the session holds every SDK handle it acquires and
//!   releases all of them on stop, on a failed start, and on drop
//! - **Checked node access**: settings are written only through wrappers
//!   that verified the node is available and writable
//! - **Degrade, don't drop**: incomplete frames are still delivered, with
//!   the problem recorded in the frame metadata
//!
//! # Example
//!
//! ```no_run
//! use spinnaker_source::{
//!     acquisition::FrameAcquisitionSession,
//!     capture::{CaptureConfig, OutputBuffer, PixelFormat},
//!     sdk::simulated::SimulatedSdk,
//! };
//!
//! let config = CaptureConfig {
//!     pixel_format: PixelFormat::Mono8,
//!     frame_limit: 10,
//!     ..CaptureConfig::with_dimensions(320, 240)
//! };
//! let mut session = FrameAcquisitionSession::with_config(SimulatedSdk::default(), config);
//! session.start().unwrap();
//!
//! let mut buffer = OutputBuffer::for_format(320, 240);
//! loop {
//!     let flow = session.next_frame(&mut buffer).unwrap();
//!     println!("frame {} at {} ns", flow.meta().offset, flow.meta().pts);
//!     if flow.is_end_of_stream() {
//!         break;
//!     }
//! }
//!
//! session.stop().unwrap();
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod acquisition;
pub mod capture;
pub mod metrics;
pub mod sdk;
pub mod source;

// Re-export commonly used types at crate root
pub use acquisition::{AcquisitionError, FrameAcquisitionSession, SessionState, SessionStats};
pub use capture::{CaptureConfig, FileConfig, FrameFlow, FrameMeta, OutputBuffer, PixelFormat};
pub use sdk::{CameraSdk, SdkError};
pub use source::{SourceError, SpinnakerSource, VideoCaps};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
