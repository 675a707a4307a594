//! Frame timestamps and sequence numbering.

/// Timing assigned to one delivered frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTiming {
    /// Sequence number of the frame.
    pub offset: u64,
    /// `offset + 1`.
    pub offset_end: u64,
    /// Presentation timestamp in nanoseconds.
    pub pts: u64,
    /// Frame period in nanoseconds.
    pub duration: u64,
    /// The frame limit has been reached with this frame.
    pub last: bool,
}

/// Derives buffer timestamps from the nominal frame rate.
///
/// Each delivered frame advances the running time by one frame duration,
/// so the first frame is stamped at one duration rather than zero.
#[derive(Debug, Clone)]
pub struct FrameClock {
    duration: u64,
    elapsed: u64,
    delivered: u64,
    limit: u64,
}

impl FrameClock {
    /// `limit` of 0 means the stream never ends on frame count.
    pub fn new(framerate: u32, limit: u64) -> Self {
        Self {
            duration: 1_000_000_000 / u64::from(framerate.max(1)),
            elapsed: 0,
            delivered: 0,
            limit,
        }
    }

    /// Frame duration in nanoseconds.
    pub fn duration(&self) -> u64 {
        self.duration
    }

    /// Frames delivered so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Assigns timing to the next delivered frame.
    pub fn tick(&mut self) -> FrameTiming {
        self.elapsed += self.duration;
        let offset = self.delivered;
        self.delivered += 1;
        FrameTiming {
            offset,
            offset_end: self.delivered,
            pts: self.elapsed,
            duration: self.duration,
            last: self.limit > 0 && self.delivered >= self.limit,
        }
    }
}
