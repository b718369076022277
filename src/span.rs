//! Byte spans and line/column derivation
//!
//! A [`Span`] is a half-open byte range `[start, end)` into one version of
//! one source text. Spans are only meaningful against the tree version they
//! were computed from; the fix engine validates this before applying edits.

use serde::{Deserialize, Serialize};

/// Half-open byte range into a source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    /// Inclusive start offset
    pub start: u32,
    /// Exclusive end offset
    pub end: u32,
}

impl Span {
    /// Sentinel for diagnostics that apply to no single source location
    /// (e.g. a compilation-wide verdict).
    pub const NONE: Span = Span {
        start: u32::MAX,
        end: u32::MAX,
    };

    pub fn new(start: u32, end: u32) -> Self {
        debug_assert!(start <= end, "span start must not exceed end");
        Self { start, end }
    }

    /// Zero-width span at a single offset (insertion point).
    pub fn empty(offset: u32) -> Self {
        Self {
            start: offset,
            end: offset,
        }
    }

    pub fn len(&self) -> usize {
        (self.end - self.start) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether this is the no-location sentinel.
    pub fn is_none(&self) -> bool {
        *self == Span::NONE
    }

    /// Half-open overlap check. The no-location sentinel never overlaps,
    /// and touching spans (`end == other.start`) do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        if self.is_none() || other.is_none() {
            return false;
        }
        // Two insertions at the same offset are not a conflict; an insertion
        // inside a replaced range is.
        if self.is_empty() && other.is_empty() {
            return false;
        }
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, offset: u32) -> bool {
        !self.is_none() && self.start <= offset && offset < self.end
    }

    /// Slice the spanned text, if the span is in bounds and on char
    /// boundaries.
    pub fn slice<'a>(&self, text: &'a str) -> Option<&'a str> {
        if self.is_none() {
            return None;
        }
        text.get(self.start as usize..self.end as usize)
    }
}

/// Maps byte offsets to 1-based line/column pairs for one text.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<u32>,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0u32];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i as u32 + 1);
            }
        }
        Self { line_starts }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// 1-based (line, column) for a byte offset. Columns are byte columns.
    pub fn line_col(&self, offset: u32) -> (usize, usize) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(idx) => idx,
            Err(idx) => idx - 1,
        };
        let col = offset - self.line_starts[line];
        (line + 1, col as usize + 1)
    }

    /// Byte offset at which the given 1-based line starts.
    pub fn line_start(&self, line: usize) -> Option<u32> {
        self.line_starts.get(line.checked_sub(1)?).copied()
    }
}
