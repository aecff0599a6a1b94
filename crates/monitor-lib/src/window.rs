//! Sliding windows over the telemetry stream
//!
//! Two fixed-capacity FIFO buffers drive the controller: the feature window
//! holds the raw target history that becomes the lag vector, and the error
//! window holds (actual, predicted) pairs for rolling accuracy.

use crate::models::PredictionRecord;
use std::collections::VecDeque;

/// FIFO buffer of the most recent N target readings.
#[derive(Debug)]
pub struct FeatureWindow {
    values: VecDeque<f64>,
    capacity: usize,
}

impl FeatureWindow {
    /// `capacity` is the lag count N and must match the trainer's convention.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "lag window capacity must be at least 1");
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a reading, evicting the oldest at capacity. Returns readiness.
    pub fn push(&mut self, target: f64) -> bool {
        while self.values.len() >= self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(target);
        self.is_ready()
    }

    /// True once the warm-up period is over and a full lag vector exists.
    pub fn is_ready(&self) -> bool {
        self.values.len() == self.capacity
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Lag vector over the retained history, nearest reading first: index 0
    /// is lag 1 (the most recent retained value), index N-1 is lag N.
    /// Mirrors the trainer's `voc_ppb_lag_1..lag_N` column order exactly;
    /// `None` during warm-up.
    pub fn vector(&self) -> Option<Vec<f64>> {
        if !self.is_ready() {
            return None;
        }
        Some(self.values.iter().rev().copied().collect())
    }
}

/// FIFO buffer of completed (actual, predicted) pairs.
#[derive(Debug)]
pub struct ErrorWindow {
    pairs: VecDeque<PredictionRecord>,
    capacity: usize,
}

impl ErrorWindow {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "error window capacity must be at least 1");
        Self {
            pairs: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a pair, evicting the oldest at capacity.
    pub fn push(&mut self, actual: f64, predicted: f64) {
        while self.pairs.len() >= self.capacity {
            self.pairs.pop_front();
        }
        self.pairs.push_back(PredictionRecord { actual, predicted });
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop all resident pairs. Used after a model swap so stale accuracy
    /// from the previous model cannot re-trigger drift.
    pub fn clear(&mut self) {
        self.pairs.clear();
    }

    /// Root-mean-square error over the resident pairs; `None` while empty.
    pub fn rolling_rmse(&self) -> Option<f64> {
        if self.pairs.is_empty() {
            return None;
        }
        let sum_sq: f64 = self
            .pairs
            .iter()
            .map(|p| (p.actual - p.predicted).powi(2))
            .sum();
        Some((sum_sq / self.pairs.len() as f64).sqrt())
    }
}
