use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Averaging window used for frame statistics.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(5);

/// Average of the samples pushed during the last `window`.
#[derive(Debug, Clone)]
pub struct TimedAverage {
    window: Duration,
    samples: VecDeque<(Instant, f32)>,
}

impl Default for TimedAverage {
    fn default() -> Self {
        TimedAverage::new(DEFAULT_WINDOW)
    }
}

impl TimedAverage {
    pub fn new(window: Duration) -> Self {
        TimedAverage {
            window,
            samples: VecDeque::new(),
        }
    }

    pub fn push(&mut self, now: Instant, value: f32) {
        self.discard_old(now);
        self.samples.push_back((now, value));
    }

    /// Current average, or `default` when the window is empty.
    pub fn get(&mut self, now: Instant, default: f32) -> f32 {
        self.discard_old(now);
        if self.samples.is_empty() {
            return default;
        }
        self.samples.iter().map(|(_, v)| v).sum::<f32>() / self.samples.len() as f32
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    fn discard_old(&mut self, now: Instant) {
        while let Some(&(t, _)) = self.samples.front() {
            if now.saturating_duration_since(t) > self.window {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_returns_default() {
        let mut avg = TimedAverage::default();
        assert_eq!(avg.get(Instant::now(), -1.0), -1.0);
    }

    #[test]
    fn test_old_samples_expire() {
        let t0 = Instant::now();
        let mut avg = TimedAverage::new(Duration::from_secs(5));
        avg.push(t0, 10.0);
        avg.push(t0 + Duration::from_secs(3), 20.0);
        assert_eq!(avg.get(t0 + Duration::from_secs(4), -1.0), 15.0);
        assert_eq!(avg.get(t0 + Duration::from_secs(6), -1.0), 20.0);
        assert_eq!(avg.get(t0 + Duration::from_secs(9), -1.0), -1.0);
    }
}
