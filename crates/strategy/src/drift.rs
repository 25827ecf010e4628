use std::collections::VecDeque;

/// Flags a shift when the rolling mean of a monitored value (typically the
/// per-trade reward) drifts beyond a threshold.
#[derive(Debug, Clone)]
pub struct DriftDetector {
    window: usize,
    threshold: f64,
    buffer: VecDeque<f64>,
}

impl Default for DriftDetector {
    fn default() -> Self {
        Self::new(100, 0.1)
    }
}

impl DriftDetector {
    #[must_use]
    pub fn new(window: usize, threshold: f64) -> Self {
        let window = window.max(1);
        Self {
            window,
            threshold,
            buffer: VecDeque::with_capacity(window),
        }
    }

    /// Pushes a value; true once the window is full and `|mean| > threshold`.
    pub fn update(&mut self, value: f64) -> bool {
        if self.buffer.len() == self.window {
            self.buffer.pop_front();
        }
        self.buffer.push_back(value);

        if self.buffer.len() < self.window {
            return false;
        }
        self.mean().abs() > self.threshold
    }

    #[must_use]
    pub fn mean(&self) -> f64 {
        if self.buffer.is_empty() {
            return 0.0;
        }
        self.buffer.iter().sum::<f64>() / self.buffer.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_until_window_full() {
        let mut detector = DriftDetector::new(3, 0.1);
        assert!(!detector.update(5.0));
        assert!(!detector.update(5.0));
        assert!(detector.update(5.0));
    }

    #[test]
    fn test_window_slides() {
        let mut detector = DriftDetector::new(2, 0.5);
        detector.update(10.0);
        assert!(detector.update(10.0));
        assert!(!detector.update(-10.0));
        assert!(detector.update(-10.0));
        assert!((detector.mean() + 10.0).abs() < 1e-12);
    }
}
