//! Groups raw transcript fragments into fixed-duration segments.
//!
//! Windows are aligned to multiples of the window size rather than to
//! fragment boundaries. A fragment opens a new window when its start is at or
//! past `window_start + window_seconds` (closed-open windows); otherwise its
//! text joins the current window.

use thiserror::Error;

use crate::domain::{Segment, TranscriptFragment};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SegmentError {
    #[error("Segment window must be a positive number of seconds, got {0}")]
    InvalidWindow(f64),
}

/// Window being accumulated
struct Window {
    start_time: f64,
    end_time: f64,
    text: String,
}

impl Window {
    fn empty(start_time: f64) -> Self {
        Self {
            start_time,
            end_time: start_time,
            text: String::new(),
        }
    }

    /// Append a fragment's text; blank fragments leave the window untouched
    fn push(&mut self, fragment: &TranscriptFragment) {
        let text = fragment.text.trim();
        if text.is_empty() {
            return;
        }
        if !self.text.is_empty() {
            self.text.push(' ');
        }
        self.text.push_str(text);
        self.end_time = fragment.end;
    }

    /// Emit the window if it received any text
    fn flush_into(self, segments: &mut Vec<Segment>) {
        if self.text.is_empty() {
            return;
        }
        segments.push(Segment {
            index: segments.len() as u32,
            start_time: self.start_time,
            end_time: self.end_time,
            text: self.text,
        });
    }
}

/// Split `fragments` into windows of `window_seconds`.
///
/// Pure function of its input; fragments are expected in temporal order.
pub fn segment(
    fragments: &[TranscriptFragment],
    window_seconds: f64,
) -> Result<Vec<Segment>, SegmentError> {
    if !window_seconds.is_finite() || window_seconds <= 0.0 {
        return Err(SegmentError::InvalidWindow(window_seconds));
    }

    let mut segments = Vec::new();
    let mut current = Window::empty(0.0);

    for fragment in fragments {
        if fragment.start >= current.start_time + window_seconds {
            let aligned = (fragment.start / window_seconds).floor() * window_seconds;
            let previous = std::mem::replace(&mut current, Window::empty(aligned));
            previous.flush_into(&mut segments);
        }

        current.push(fragment);
    }

    current.flush_into(&mut segments);

    Ok(segments)
}
