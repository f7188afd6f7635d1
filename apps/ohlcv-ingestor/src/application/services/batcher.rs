//! Batch Accumulator
//!
//! Buffers admitted records in arrival order and reports when a flush
//! is due: whichever of "batch reached maximum size" or "oldest record
//! has waited the maximum accumulation time" happens first.

use std::time::{Duration, Instant};

use crate::domain::candle::CandleRecord;

/// Size/age-bounded buffer of admitted candle records.
#[derive(Debug)]
pub struct BatchAccumulator {
    max_size: usize,
    max_age: Duration,
    buf: Vec<CandleRecord>,
    opened_at: Option<Instant>,
}

impl BatchAccumulator {
    /// Create an empty accumulator with the given flush thresholds.
    #[must_use]
    pub fn new(max_size: usize, max_age: Duration) -> Self {
        Self {
            max_size,
            max_age,
            buf: Vec::with_capacity(max_size),
            opened_at: None,
        }
    }

    /// Append a record. The age clock starts with the first record.
    pub fn offer(&mut self, record: CandleRecord) {
        if self.buf.is_empty() {
            self.opened_at = Some(Instant::now());
        }
        self.buf.push(record);
    }

    /// Whether a flush is due (size or age threshold reached).
    #[must_use]
    pub fn should_flush(&self) -> bool {
        if self.buf.is_empty() {
            return false;
        }
        if self.buf.len() >= self.max_size {
            return true;
        }
        self.opened_at
            .is_some_and(|opened| opened.elapsed() >= self.max_age)
    }

    /// Take the accumulated batch and reset to empty.
    ///
    /// Safe to call when empty: returns an empty batch, which the sink
    /// treats as a no-op.
    pub fn drain(&mut self) -> Vec<CandleRecord> {
        self.opened_at = None;
        std::mem::replace(&mut self.buf, Vec::with_capacity(self.max_size))
    }

    /// Number of buffered records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn record(time_ms: i64) -> CandleRecord {
        CandleRecord {
            time_ms,
            symbol: "BTCUSDT".to_string(),
            open: Decimal::from(100),
            high: Decimal::from(110),
            low: Decimal::from(90),
            close: Decimal::from(105),
            volume: Decimal::from(10),
        }
    }

    #[test]
    fn empty_accumulator_never_flushes() {
        let batcher = BatchAccumulator::new(2, Duration::from_millis(1));
        assert!(!batcher.should_flush());
        assert!(batcher.is_empty());
    }

    #[test]
    fn flushes_at_max_size() {
        let mut batcher = BatchAccumulator::new(2, Duration::from_secs(3600));

        batcher.offer(record(1));
        assert!(!batcher.should_flush());

        batcher.offer(record(2));
        assert!(batcher.should_flush());
    }

    #[test]
    fn flushes_after_max_age() {
        let mut batcher = BatchAccumulator::new(1000, Duration::ZERO);

        batcher.offer(record(1));
        assert!(batcher.should_flush());
    }

    #[test]
    fn drain_preserves_arrival_order_and_resets() {
        let mut batcher = BatchAccumulator::new(10, Duration::from_secs(3600));
        batcher.offer(record(1));
        batcher.offer(record(2));
        batcher.offer(record(3));

        let batch = batcher.drain();
        assert_eq!(
            batch.iter().map(|r| r.time_ms).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(batcher.is_empty());
        assert!(!batcher.should_flush());
    }

    #[test]
    fn drain_when_empty_returns_empty_batch() {
        let mut batcher = BatchAccumulator::new(10, Duration::from_secs(1));
        assert!(batcher.drain().is_empty());
    }

    #[test]
    fn age_clock_restarts_after_drain() {
        let mut batcher = BatchAccumulator::new(1000, Duration::from_secs(3600));
        batcher.offer(record(1));
        let _ = batcher.drain();

        batcher.offer(record(2));
        assert_eq!(batcher.len(), 1);
        assert!(!batcher.should_flush());
    }
}
