use std::time::{Duration, Instant};

use crate::settings::RateLimits;

/// Response watchdog timeout.
pub const WATCHDOG_TIMEOUT: Duration = Duration::from_secs(6);

/// Decides when the next control frame goes out.
///
/// A frame is due when the max interval has passed since the last send
/// (keep-alive), or when the state changed and at least the min interval
/// has passed.
#[derive(Debug, Clone)]
pub struct Pacer {
    limits: RateLimits,
    last_send: Option<Instant>,
}

impl Pacer {
    pub fn new(limits: RateLimits) -> Self {
        Pacer {
            limits,
            last_send: None,
        }
    }

    pub fn set_limits(&mut self, limits: RateLimits) {
        if self.limits != limits {
            log::debug!("UDP pacing now {}..{} ms", limits.min_ms, limits.max_ms);
            self.limits = limits;
        }
    }

    pub fn is_due(&self, now: Instant, changed: bool) -> bool {
        let Some(last) = self.last_send else {
            return true;
        };
        let since = now.saturating_duration_since(last);
        since >= self.limits.max() || (changed && since >= self.limits.min())
    }

    pub fn mark_sent(&mut self, now: Instant) {
        self.last_send = Some(now);
    }

    pub fn reset(&mut self) {
        self.last_send = None;
    }
}

/// Fires once when no datagram came back within the timeout.
#[derive(Debug, Clone)]
pub struct Watchdog {
    timeout: Duration,
    deadline: Option<Instant>,
}

impl Default for Watchdog {
    fn default() -> Self {
        Watchdog::new(WATCHDOG_TIMEOUT)
    }
}

impl Watchdog {
    pub fn new(timeout: Duration) -> Self {
        Watchdog {
            timeout,
            deadline: None,
        }
    }

    /// Arm after a send. A running countdown is left untouched.
    pub fn arm(&mut self, now: Instant) {
        if self.deadline.is_none() {
            self.deadline = Some(now + self.timeout);
        }
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    /// True once when the deadline passes; the watchdog is then disarmed.
    pub fn expired(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_pacer_keep_alive_and_fast_path() {
        let t0 = Instant::now();
        let mut pacer = Pacer::new(RateLimits::new(20, 100));
        assert!(pacer.is_due(t0, false));
        pacer.mark_sent(t0);

        assert!(!pacer.is_due(t0 + ms(10), true));
        assert!(pacer.is_due(t0 + ms(20), true));
        assert!(!pacer.is_due(t0 + ms(99), false));
        assert!(pacer.is_due(t0 + ms(100), false));
    }

    #[test]
    fn test_pacer_limit_change() {
        let t0 = Instant::now();
        let mut pacer = Pacer::new(RateLimits::new(100, 500));
        pacer.mark_sent(t0);
        assert!(!pacer.is_due(t0 + ms(150), false));
        pacer.set_limits(RateLimits::new(20, 100));
        assert!(pacer.is_due(t0 + ms(150), false));
    }

    #[test]
    fn test_watchdog() {
        let t0 = Instant::now();
        let mut dog = Watchdog::default();
        dog.arm(t0);
        // Re-arming does not push the deadline back
        dog.arm(t0 + Duration::from_secs(5));
        assert!(!dog.expired(t0 + Duration::from_secs(5)));
        assert!(dog.expired(t0 + Duration::from_secs(6)));
        assert!(!dog.expired(t0 + Duration::from_secs(7)));

        dog.arm(t0 + Duration::from_secs(7));
        dog.disarm();
        assert!(!dog.expired(t0 + Duration::from_secs(20)));
    }
}
