//! Output buffers and per-frame metadata.

use crate::acquisition::AcquisitionError;

/// Bytes per sample of the single-channel 8-bit output format.
pub const OUTPUT_BYTES_PER_SAMPLE: usize = 1;

/// A caller-allocated buffer the session fills with one GRAY8 frame.
///
/// Rows start every `stride` bytes. Bytes between the end of the pixel
/// data and the next row are never written by the session.
#[derive(Clone, PartialEq, Eq)]
pub struct OutputBuffer {
    data: Vec<u8>,
    stride: usize,
    rows: usize,
    pts: Option<u64>,
    dts: Option<u64>,
    duration: Option<u64>,
    offset: Option<u64>,
    offset_end: Option<u64>,
}

impl OutputBuffer {
    /// Allocates a buffer sized exactly for a `width` x `height` GRAY8 frame.
    pub fn for_format(width: u32, height: u32) -> Self {
        let stride = width as usize * OUTPUT_BYTES_PER_SAMPLE;
        Self::with_stride(stride, height as usize)
    }

    /// Allocates a zeroed buffer of `rows` rows spaced `stride` bytes apart.
    pub fn with_stride(stride: usize, rows: usize) -> Self {
        Self::from_vec(vec![0u8; stride * rows], stride, rows)
    }

    /// Wraps existing memory, e.g. a buffer recycled from a pool.
    ///
    /// `data` may be larger than `stride * rows`.
    pub fn from_vec(data: Vec<u8>, stride: usize, rows: usize) -> Self {
        Self {
            data,
            stride,
            rows,
            pts: None,
            dts: None,
            duration: None,
            offset: None,
            offset_end: None,
        }
    }

    /// Returns the buffer contents.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the buffer contents for writing.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Consumes the buffer, returning its memory.
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Distance in bytes between the starts of consecutive rows.
    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Number of rows the buffer was laid out for.
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Returns row `index`, including any stride padding.
    pub fn row(&self, index: usize) -> Option<&[u8]> {
        let start = index.checked_mul(self.stride)?;
        self.data.get(start..start + self.stride)
    }

    /// Presentation timestamp in nanoseconds.
    pub fn pts(&self) -> Option<u64> {
        self.pts
    }

    /// Decode timestamp in nanoseconds.
    pub fn dts(&self) -> Option<u64> {
        self.dts
    }

    /// Frame duration in nanoseconds.
    pub fn duration(&self) -> Option<u64> {
        self.duration
    }

    /// Sequence offset of the frame held in this buffer.
    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    /// Sequence offset of the following frame.
    pub fn offset_end(&self) -> Option<u64> {
        self.offset_end
    }

    /// Copies timing and sequencing from `meta` onto the buffer.
    pub(crate) fn stamp(&mut self, meta: &FrameMeta) {
        self.pts = Some(meta.pts);
        self.dts = Some(meta.dts);
        self.duration = Some(meta.duration);
        self.offset = Some(meta.offset);
        self.offset_end = Some(meta.offset_end);
    }

    /// Drops pts and dts so the host pipeline can apply its own clock.
    pub fn clear_timestamps(&mut self) {
        self.pts = None;
        self.dts = None;
    }
}

impl std::fmt::Debug for OutputBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputBuffer")
            .field("bytes", &self.data.len())
            .field("stride", &self.stride)
            .field("rows", &self.rows)
            .field("pts", &self.pts)
            .field("offset", &self.offset)
            .finish()
    }
}

/// Timing, sequencing and quality information for one delivered frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameMeta {
    /// Zero-based sequence offset.
    pub offset: u64,
    /// Offset of the next frame (`offset + 1`).
    pub offset_end: u64,
    /// Presentation timestamp in nanoseconds.
    pub pts: u64,
    /// Decode timestamp in nanoseconds.
    pub dts: u64,
    /// Frame duration in nanoseconds.
    pub duration: u64,
    /// Non-fatal problems encountered while producing the frame.
    pub degradations: Vec<AcquisitionError>,
}

impl FrameMeta {
    /// True if the frame was delivered without any degradation.
    pub fn is_clean(&self) -> bool {
        self.degradations.is_empty()
    }

    /// True if the camera reported the exposure as incomplete.
    pub fn is_incomplete(&self) -> bool {
        self.degradations
            .iter()
            .any(|d| matches!(d, AcquisitionError::IncompleteFrame))
    }
}

/// Result of a successful frame request.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameFlow {
    /// A frame was delivered and more may follow.
    Continue(FrameMeta),
    /// A frame was delivered and it is the last one of a limited stream.
    EndOfStream(FrameMeta),
}

impl FrameFlow {
    /// Metadata of the delivered frame.
    pub fn meta(&self) -> &FrameMeta {
        match self {
            FrameFlow::Continue(meta) | FrameFlow::EndOfStream(meta) => meta,
        }
    }

    /// True if no further frames should be requested.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, FrameFlow::EndOfStream(_))
    }
}
