//! Fixed-capacity sliding event counter.

use heapless::Deque;
use m1m3_common::consts::SAFETY_WINDOW_MAX;

/// Counts `true` samples over the last `period` cycles.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    samples: Deque<bool, SAFETY_WINDOW_MAX>,
    period: usize,
    count: usize,
}

impl SlidingWindow {
    /// Empty window. `period` is clamped to `[1, SAFETY_WINDOW_MAX]`.
    pub fn new(period: usize) -> Self {
        Self {
            samples: Deque::new(),
            period: period.clamp(1, SAFETY_WINDOW_MAX),
            count: 0,
        }
    }

    /// Push one sample and return the count in the window.
    pub fn push(&mut self, sample: bool) -> usize {
        if self.samples.len() == self.period {
            if let Some(true) = self.samples.pop_front() {
                self.count -= 1;
            }
        }
        if self.samples.push_back(sample).is_ok() && sample {
            self.count += 1;
        }
        self.count
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn period(&self) -> usize {
        self.period
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn old_samples_fall_out() {
        let mut w = SlidingWindow::new(3);
        assert_eq!(w.push(true), 1);
        assert_eq!(w.push(true), 2);
        assert_eq!(w.push(false), 2);
        assert_eq!(w.push(false), 1);
        assert_eq!(w.push(false), 0);
    }

    #[test]
    fn period_is_clamped() {
        assert_eq!(SlidingWindow::new(0).period(), 1);
        assert_eq!(SlidingWindow::new(10_000).period(), SAFETY_WINDOW_MAX);
        let mut w = SlidingWindow::new(10_000);
        for _ in 0..1000 {
            w.push(true);
        }
        assert_eq!(w.count(), SAFETY_WINDOW_MAX);
    }
}
