//! Time window partitioning
//!
//! Splits a requested range into contiguous, non-overlapping windows no wider
//! than the configured query length. Windows run oldest to newest and the last
//! one is clipped to the range end.

use crate::error::{ExportError, Result};
use crate::model::{TimeRange, Timestamp, Window};

/// Iterator over the windows of a range
#[derive(Debug, Clone)]
pub struct Windows {
    next_start: Timestamp,
    end: Timestamp,
    width: u64,
}

/// Partition `range` into windows of at most `width` seconds
pub fn windows(range: TimeRange, width: u64) -> Result<Windows> {
    if width == 0 {
        return Err(ExportError::Validation(
            "query length must be greater than zero".to_string(),
        ));
    }
    Ok(Windows {
        next_start: range.start,
        end: range.end,
        width,
    })
}

impl Iterator for Windows {
    type Item = Window;

    fn next(&mut self) -> Option<Window> {
        if self.next_start >= self.end {
            return None;
        }
        let start = self.next_start;
        // Saturate so a huge width cannot overflow past the clip
        let end = start
            .checked_add_unsigned(self.width)
            .map_or(self.end, |e| e.min(self.end));
        self.next_start = end;
        Some(Window { start, end })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = if self.next_start >= self.end {
            0
        } else {
            let span = self.end.abs_diff(self.next_start);
            span.div_ceil(self.width) as usize
        };
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Windows {}
