use crate::models::Candle;
use std::collections::VecDeque;

/// Outcome of appending one candle to the window
#[derive(Debug, Clone, PartialEq)]
pub struct AppendOutcome {
    pub accepted: bool,
    pub evicted: Option<Candle>,
}

/// Fixed-capacity, time-ordered rolling window of candles
///
/// Owned exclusively by one trader instance; stream messages are handled one
/// at a time, so no locking is needed. After any sequence of operations the
/// window holds the most recent <= capacity candles with strictly increasing
/// open times.
#[derive(Debug)]
pub struct CandleWindow {
    candles: VecDeque<Candle>,
    capacity: usize,
}

impl CandleWindow {
    /// Create an empty window holding at most `capacity` candles
    pub fn new(capacity: usize) -> Self {
        Self {
            candles: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Replace the entire window contents (used on (re)connect)
    ///
    /// Keeps the most recent `capacity` candles when the snapshot is larger.
    pub fn seed(&mut self, candles: Vec<Candle>) {
        self.candles.clear();
        let skip = candles.len().saturating_sub(self.capacity);
        self.candles.extend(candles.into_iter().skip(skip));
    }

    /// Append one completed candle
    ///
    /// Rejects candles whose open time does not advance past the last stored
    /// one (duplicate-tick suppression). Evicts the oldest candle when the
    /// window is at capacity.
    pub fn append(&mut self, candle: Candle) -> AppendOutcome {
        if let Some(last) = self.candles.back() {
            if candle.open_time <= last.open_time {
                return AppendOutcome {
                    accepted: false,
                    evicted: None,
                };
            }
        }

        self.candles.push_back(candle);

        let evicted = if self.candles.len() > self.capacity {
            self.candles.pop_front()
        } else {
            None
        };

        AppendOutcome {
            accepted: true,
            evicted,
        }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.back()
    }

    /// Contiguous view of the window for engine evaluation
    pub fn candles(&self) -> Vec<Candle> {
        self.candles.iter().cloned().collect()
    }
}

/// Check that a snapshot is sorted by strictly increasing open time
///
/// Exchanges return klines ascending; anything else means a corrupted
/// response and the snapshot must not be trusted.
pub fn validate_snapshot(candles: &[Candle]) -> anyhow::Result<()> {
    for pair in candles.windows(2) {
        if pair[1].open_time <= pair[0].open_time {
            anyhow::bail!(
                "snapshot is not sorted by open time: {} then {}",
                pair[0].open_time,
                pair[1].open_time
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle_at(open_time: i64, close: f64) -> Candle {
        Candle {
            open_time,
            close_time: open_time + 59_999,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1000.0,
        }
    }

    #[test]
    fn test_append_and_order() {
        let mut window = CandleWindow::new(10);

        for i in 0..5 {
            let outcome = window.append(candle_at(i * 60_000, 100.0 + i as f64));
            assert!(outcome.accepted);
            assert!(outcome.evicted.is_none());
        }

        assert_eq!(window.len(), 5);
        let candles = window.candles();
        for pair in candles.windows(2) {
            assert!(pair[0].open_time < pair[1].open_time);
        }
    }

    #[test]
    fn test_duplicate_open_time_is_noop() {
        let mut window = CandleWindow::new(10);

        assert!(window.append(candle_at(60_000, 100.0)).accepted);
        let before = window.candles();

        // Same open time again, even with different prices
        let outcome = window.append(candle_at(60_000, 105.0));
        assert!(!outcome.accepted);
        assert_eq!(window.candles(), before);
    }

    #[test]
    fn test_rejects_regressing_open_time() {
        let mut window = CandleWindow::new(10);

        assert!(window.append(candle_at(120_000, 100.0)).accepted);
        assert!(!window.append(candle_at(60_000, 99.0)).accepted);
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn test_eviction_at_capacity() {
        let mut window = CandleWindow::new(3);

        for i in 0..3 {
            window.append(candle_at(i * 60_000, 100.0));
        }

        let outcome = window.append(candle_at(3 * 60_000, 103.0));
        assert!(outcome.accepted);
        assert_eq!(outcome.evicted.unwrap().open_time, 0);
        assert_eq!(window.len(), 3);
        assert_eq!(window.candles()[0].open_time, 60_000);
    }

    #[test]
    fn test_length_never_exceeds_capacity() {
        let mut window = CandleWindow::new(5);

        for i in 0..100 {
            window.append(candle_at(i * 60_000, 100.0));
            assert!(window.len() <= 5);
        }

        // Most recent 5 survive
        assert_eq!(window.candles()[0].open_time, 95 * 60_000);
    }

    #[test]
    fn test_seed_replaces_contents() {
        let mut window = CandleWindow::new(10);
        window.append(candle_at(0, 100.0));

        window.seed(vec![candle_at(60_000, 101.0), candle_at(120_000, 102.0)]);
        assert_eq!(window.len(), 2);
        assert_eq!(window.candles()[0].open_time, 60_000);
    }

    #[test]
    fn test_validate_snapshot() {
        let sorted = vec![candle_at(0, 100.0), candle_at(60_000, 101.0)];
        assert!(validate_snapshot(&sorted).is_ok());
        assert!(validate_snapshot(&[]).is_ok());

        let unsorted = vec![candle_at(60_000, 100.0), candle_at(0, 101.0)];
        assert!(validate_snapshot(&unsorted).is_err());
    }

    #[test]
    fn test_seed_trims_to_capacity() {
        let mut window = CandleWindow::new(3);

        let snapshot: Vec<Candle> = (0..10).map(|i| candle_at(i * 60_000, 100.0)).collect();
        window.seed(snapshot);

        assert_eq!(window.len(), 3);
        // Keeps the most recent candles
        assert_eq!(window.candles()[0].open_time, 7 * 60_000);
    }
}
