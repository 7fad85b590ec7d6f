use std::collections::VecDeque;

/// Default number of values a [`ValueWindow`] keeps
pub const DEFAULT_WINDOW_SIZE: usize = 100;

/// Running average over the most recent values, e.g. training losses
#[derive(Debug, Clone)]
pub struct ValueWindow {
    window_size: usize,
    values: VecDeque<f64>,
}

impl ValueWindow {
    /// A window of `window_size` values; a size of zero keeps one value
    pub fn new(window_size: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            window_size,
            values: VecDeque::with_capacity(window_size),
        }
    }

    /// Push `x`, dropping the oldest value once the window is full
    pub fn append(&mut self, x: f64) {
        if self.values.len() == self.window_size {
            self.values.pop_front();
        }
        self.values.push_back(x);
    }

    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    pub fn count(&self) -> usize {
        self.values.len()
    }

    /// Mean of the kept values, 0 when empty
    pub fn average(&self) -> f64 {
        self.sum() / self.count().max(1) as f64
    }

    pub fn reset(&mut self) {
        self.values.clear();
    }
}

impl Default for ValueWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}
