// Nonce range partitioning
use serde::{Deserialize, Serialize};

/// A half-open interval `[start, end)` of 32-bit nonces.
///
/// Bounds are `u64` because the exclusive upper bound of the full search
/// space, 2^32, does not fit in a `u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonceRange {
    pub start: u64,
    pub end: u64,
}

impl NonceRange {
    /// The entire 32-bit nonce space, `[0, 2^32)`.
    pub const FULL: NonceRange = NonceRange {
        start: 0,
        end: 1 << 32,
    };

    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn width(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Split into `parts` contiguous sub-ranges of equal width; the last
    /// sub-range absorbs the remainder. Together the sub-ranges cover `self`
    /// exactly, with no overlap and no gap.
    pub fn split(&self, parts: usize) -> Vec<NonceRange> {
        if parts == 0 {
            return Vec::new();
        }

        let per_part = self.width() / parts as u64;
        let mut ranges = Vec::with_capacity(parts);
        let mut cursor = self.start;

        for i in 0..parts {
            let end = if i == parts - 1 {
                self.end
            } else {
                cursor + per_part
            };
            ranges.push(NonceRange::new(cursor, end));
            cursor = end;
        }

        ranges
    }
}
