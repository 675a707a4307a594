//! Frame acquisition from a Spinnaker camera.
//!
//! [`FrameAcquisitionSession`] owns the whole handle chain (system, camera
//! list, camera) for the duration of a stream. It applies the requested
//! image settings, converts each captured image to 8-bit grayscale, copies
//! it into a caller-provided [`OutputBuffer`](crate::capture::OutputBuffer)
//! row by row, and stamps it with frame-rate derived timestamps.
//!
//! ```text
//! Idle --start--> Started --next_frame--> Started
//!   ^               |
//!   |             stop
//!   +--- Stopped <--+
//!
//! Idle --start fails--> Failed --stop--> Idle
//! ```

mod clock;
mod configure;
mod copy;
mod error;
mod session;

pub use clock::{FrameClock, FrameTiming};
pub use configure::apply_image_settings;
pub use copy::{copy_rows, required_len, CopyError};
pub use error::{AcquisitionError, TeardownStep};
pub use session::{FrameAcquisitionSession, SessionState, SessionStats};
