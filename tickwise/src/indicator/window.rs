use std::collections::VecDeque;

/// Fixed-capacity rolling window of values with a running sum.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    capacity: usize,
    values: VecDeque<f64>,
    sum: f64,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            values: VecDeque::with_capacity(capacity),
            sum: 0.0,
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.values.len() >= self.capacity {
            if let Some(oldest) = self.values.pop_front() {
                self.sum -= oldest;
            }
        }
        self.values.push_back(value);
        self.sum += value;
    }

    pub fn is_full(&self) -> bool {
        self.values.len() == self.capacity
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Mean of the full window, `None` while still filling.
    pub fn mean(&self) -> Option<f64> {
        self.is_full().then(|| self.sum / self.capacity as f64)
    }

    /// Sample standard deviation (ddof = 1) of the full window, `None` while still filling.
    ///
    /// Recomputed from the stored values so the running sum's drift never leaks into it.
    pub fn std_sample(&self) -> Option<f64> {
        if !self.is_full() || self.capacity < 2 {
            return None;
        }
        let mean = self.values.iter().sum::<f64>() / self.capacity as f64;
        let variance = self
            .values
            .iter()
            .map(|value| (value - mean).powi(2))
            .sum::<f64>()
            / (self.capacity - 1) as f64;
        Some(variance.sqrt())
    }
}
