//! Output caps advertised by the source.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Media type of every buffer the source produces.
pub const MEDIA_TYPE: &str = "video/x-raw";
/// Raw video format name for 8-bit grayscale.
pub const FORMAT_GRAY8: &str = "GRAY8";
/// Interlace mode of every frame.
pub const INTERLACE_PROGRESSIVE: &str = "progressive";

/// Caps string could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid caps '{caps}': {reason}")]
pub struct CapsParseError {
    caps: String,
    reason: String,
}

impl CapsParseError {
    fn new(caps: &str, reason: impl Into<String>) -> Self {
        Self {
            caps: caps.to_string(),
            reason: reason.into(),
        }
    }
}

/// Fixed raw-video caps.
///
/// The frame rate is always the variable rate `0/1`: frames arrive when
/// the camera delivers them, not on a fixed clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoCaps {
    /// Raw video format name.
    pub format: String,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Frame rate as numerator and denominator.
    pub framerate: (u32, u32),
    /// Interlace mode name.
    pub interlace_mode: String,
}

impl VideoCaps {
    /// GRAY8 caps for a `width` x `height` frame.
    pub fn gray8(width: u32, height: u32) -> Self {
        Self {
            format: FORMAT_GRAY8.to_string(),
            width,
            height,
            framerate: (0, 1),
            interlace_mode: INTERLACE_PROGRESSIVE.to_string(),
        }
    }

    /// Payload bytes of one frame.
    pub fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl fmt::Display for VideoCaps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{MEDIA_TYPE}, format=(string){}, width=(int){}, height=(int){}, \
             framerate=(fraction){}/{}, interlace-mode=(string){}",
            self.format,
            self.width,
            self.height,
            self.framerate.0,
            self.framerate.1,
            self.interlace_mode
        )
    }
}

/// Parses caps strings with or without `(type)` annotations, e.g.
/// `video/x-raw,format=GRAY8,width=640,height=512,framerate=0/1`.
///
/// Omitted fields take the GRAY8 defaults, except width and height which
/// are required.
impl FromStr for VideoCaps {
    type Err = CapsParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fields = s.split(',').map(str::trim);
        match fields.next() {
            Some(MEDIA_TYPE) => {}
            Some(other) => {
                return Err(CapsParseError::new(s, format!("unsupported media type {other}")))
            }
            None => return Err(CapsParseError::new(s, "empty caps")),
        }

        let mut caps = VideoCaps::gray8(0, 0);
        let (mut width, mut height) = (None, None);
        for field in fields.filter(|f| !f.is_empty()) {
            let (key, value) = field
                .split_once('=')
                .ok_or_else(|| CapsParseError::new(s, format!("malformed field {field}")))?;
            let value = strip_type(value.trim());
            let dimension = |value: &str| {
                value
                    .parse::<u32>()
                    .map_err(|_| CapsParseError::new(s, format!("bad {key} {value}")))
            };
            match key.trim() {
                "format" => caps.format = value.to_string(),
                "width" => width = Some(dimension(value)?),
                "height" => height = Some(dimension(value)?),
                "interlace-mode" => caps.interlace_mode = value.to_string(),
                "framerate" => {
                    caps.framerate = value
                        .split_once('/')
                        .and_then(|(n, d)| Some((n.parse().ok()?, d.parse().ok()?)))
                        .ok_or_else(|| CapsParseError::new(s, format!("bad framerate {value}")))?;
                }
                other => return Err(CapsParseError::new(s, format!("unknown field {other}"))),
            }
        }

        caps.width = width.ok_or_else(|| CapsParseError::new(s, "missing width"))?;
        caps.height = height.ok_or_else(|| CapsParseError::new(s, "missing height"))?;
        Ok(caps)
    }
}

/// Drops a leading `(type)` annotation.
fn strip_type(value: &str) -> &str {
    match value.strip_prefix('(').and_then(|rest| rest.split_once(')')) {
        Some((_, rest)) => rest.trim(),
        None => value,
    }
}
