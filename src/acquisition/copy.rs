//! Row-wise copy between buffers with independent strides.

use thiserror::Error;

/// Errors from [`copy_rows`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CopyError {
    /// The source slice ends before the last row.
    #[error("source holds {actual} bytes, {needed} required")]
    SourceTooShort {
        /// Bytes required.
        needed: usize,
        /// Bytes present.
        actual: usize,
    },
    /// The destination slice ends before the last row.
    #[error("destination holds {actual} bytes, {needed} required")]
    DestinationTooShort {
        /// Bytes required.
        needed: usize,
        /// Bytes present.
        actual: usize,
    },
}

/// Bytes a buffer must hold for `rows` rows of `row_len` bytes spaced `stride` apart.
#[inline]
pub fn required_len(stride: usize, row_len: usize, rows: usize) -> usize {
    match rows {
        0 => 0,
        _ => (rows - 1) * stride + row_len,
    }
}

/// Copies `rows` rows from `src` to `dst`.
///
/// Row `i` starts at `i * src_stride` in the source and `i * dst_stride`
/// in the destination; `min(src_stride, dst_stride)` bytes are copied per
/// row. Destination bytes past that within each row are left untouched.
///
/// Both buffers are checked up front, so nothing is written on error.
/// Returns the number of bytes copied.
pub fn copy_rows(
    src: &[u8],
    src_stride: usize,
    dst: &mut [u8],
    dst_stride: usize,
    rows: usize,
) -> Result<usize, CopyError> {
    let row_len = src_stride.min(dst_stride);
    if row_len == 0 || rows == 0 {
        return Ok(0);
    }

    let needed = required_len(src_stride, row_len, rows);
    if src.len() < needed {
        return Err(CopyError::SourceTooShort {
            needed,
            actual: src.len(),
        });
    }
    let needed = required_len(dst_stride, row_len, rows);
    if dst.len() < needed {
        return Err(CopyError::DestinationTooShort {
            needed,
            actual: dst.len(),
        });
    }

    for (src_row, dst_row) in src
        .chunks(src_stride)
        .zip(dst.chunks_mut(dst_stride))
        .take(rows)
    {
        dst_row[..row_len].copy_from_slice(&src_row[..row_len]);
    }
    Ok(row_len * rows)
}
