//! Progress line protocol spoken by the daily encoder on its error stream.
//!
//! One event per line:
//!
//! ```text
//! PROGRESS <current-frame> <total-frames> <preview-payload>
//! ```
//!
//! Surrounding whitespace is ignored. Any other line is not a progress line.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static PROGRESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^PROGRESS (\d+) (\d+) (.+)$").expect("progress pattern is valid")
});

/// Frame progress reported by the encoder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub current_frame: u64,
    pub total_frames: u64,
    /// Text-encoded preview image of the current frame
    pub preview: String,
}

impl ProgressEvent {
    pub fn new(current_frame: u64, total_frames: u64, preview: impl Into<String>) -> Self {
        Self {
            current_frame,
            total_frames,
            preview: preview.into(),
        }
    }

    /// Whole percentage complete, 0 when the total is unknown
    pub fn percent(&self) -> u32 {
        if self.total_frames == 0 {
            return 0;
        }
        (self.current_frame.saturating_mul(100) / self.total_frames).min(u32::MAX as u64) as u32
    }
}

/// Parse one line of encoder error output.
///
/// Returns `None` for anything that is not a well-formed progress line,
/// including frame numbers too large to represent.
pub fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
    let caps = PROGRESS_RE.captures(line.trim())?;
    let current_frame = caps[1].parse().ok()?;
    let total_frames = caps[2].parse().ok()?;
    Some(ProgressEvent::new(current_frame, total_frames, &caps[3]))
}
