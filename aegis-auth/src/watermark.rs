//! Monotonically increasing sequence numbers used to give audit entries a
//! total order alongside their timestamp: `(timestamp, sequence)`.

use std::sync::atomic::{AtomicI64, Ordering};

pub struct Watermark {
    sequence: AtomicI64,
}

impl Watermark {
    pub fn new() -> Self {
        Self {
            sequence: AtomicI64::new(0),
        }
    }

    pub fn starting_at(seq: i64) -> Self {
        Self {
            sequence: AtomicI64::new(seq),
        }
    }

    /// Returns the next sequence number, strictly greater than any
    /// previously issued by this watermark.
    pub fn next(&self) -> i64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current(&self) -> i64 {
        self.sequence.load(Ordering::SeqCst)
    }
}

impl Default for Watermark {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_strictly_increasing() {
        let w = Watermark::new();
        let a = w.next();
        let b = w.next();
        assert!(b > a);
    }
}
