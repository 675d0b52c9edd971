//! Linearly weighted moving average.
//!
//! Used to estimate per-node command latency. The most recent sample carries
//! weight `N`, the next `N - 1`, down to `1` for the oldest retained sample.

use std::collections::VecDeque;

/// Bounded, linearly weighted average of the most recent samples.
///
/// # Example
///
/// ```
/// use navi_common::WeightedAverage;
///
/// let mut avg = WeightedAverage::new(3);
/// avg.add(&[30.0, 24.0, 18.0, 12.0, 6.0]);
/// assert_eq!(avg.value(), 10.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedAverage {
    capacity: usize,
    /// Most recent first
    samples: VecDeque<f64>,
}

impl WeightedAverage {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    /// Adds samples in arrival order.
    ///
    /// Each value is pushed to the front, so the last element of `values`
    /// becomes the most recent sample. Samples beyond the capacity are dropped.
    pub fn add(&mut self, values: &[f64]) {
        for value in values {
            self.samples.push_front(*value);
        }
        self.samples.truncate(self.capacity);
    }

    /// Records a single sample.
    pub fn push(&mut self, value: f64) {
        self.add(&[value]);
    }

    /// Weighted mean of the retained samples, `0.0` when empty.
    pub fn value(&self) -> f64 {
        let mut total = 0.0;
        let mut total_weight = 0.0;
        for (i, sample) in self.samples.iter().take(self.capacity).enumerate() {
            let weight = (self.capacity - i) as f64;
            total += sample * weight;
            total_weight += weight;
        }

        if total_weight == 0.0 {
            0.0
        } else {
            total / total_weight
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Changes the window size. Shrinking drops the oldest samples right away.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.samples.truncate(capacity);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl Default for WeightedAverage {
    fn default() -> Self {
        Self::new(5)
    }
}
