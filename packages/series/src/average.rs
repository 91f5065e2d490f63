//! Trailing average over a fixed window with an O(1) update.
//!
//! [`TrailingAverage`] keeps the last `N` observations in a ring buffer
//! alongside their mean. While the buffer is filling the mean is extended
//! incrementally; once full, each new value evicts the oldest one and the
//! mean is corrected by the difference, so no step re-sums the window.

use covid_map_series_models::TrailingWindow;

/// Ring buffer maintaining the mean of its most recent `capacity` values.
#[derive(Debug, Clone)]
pub struct TrailingAverage {
    capacity: usize,
    values: Vec<f64>,
    /// Next slot to overwrite once the buffer is full.
    cursor: usize,
    mean: f64,
}

impl TrailingAverage {
    /// Creates an empty buffer averaging over `window` observations.
    ///
    /// Storage grows with the values fed in, so a window far longer than
    /// the data costs nothing up front.
    #[must_use]
    pub fn new(window: TrailingWindow) -> Self {
        Self::with_len_hint(window, 0)
    }

    /// Like [`new`](Self::new), reserving room for `len` values (never more
    /// than the window).
    #[must_use]
    pub fn with_len_hint(window: TrailingWindow, len: usize) -> Self {
        let capacity = window.get() as usize;
        Self {
            capacity,
            values: Vec::with_capacity(capacity.min(len)),
            cursor: 0,
            mean: 0.0,
        }
    }

    /// Feeds a value into the buffer and returns the updated average.
    #[allow(clippy::cast_precision_loss)]
    pub fn update(&mut self, value: f64) -> f64 {
        if self.values.len() < self.capacity {
            let count = self.values.len() as f64;
            self.mean = self.mean.mul_add(count, value) / (count + 1.0);
            self.values.push(value);
        } else {
            let evicted = self.values[self.cursor];
            self.values[self.cursor] = value;
            self.cursor = (self.cursor + 1) % self.capacity;
            self.mean += (value - evicted) / self.capacity as f64;
        }
        self.mean
    }

    /// Mean of the values currently in the window (`0` when empty).
    #[must_use]
    pub const fn average(&self) -> f64 {
        self.mean
    }

    /// Number of values currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no values have been fed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Window size.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the window has filled and updates now evict.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.values.len() == self.capacity
    }
}
