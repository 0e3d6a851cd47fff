use std::time::{Duration, Instant};

/// Allows at most one accepted face per window.
#[derive(Debug, Clone)]
pub struct SaveThrottle {
    window: Duration,
    last: Option<Instant>,
}

impl SaveThrottle {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    /// True when no save was attempted within the last window.
    pub fn is_open(&self, now: Instant) -> bool {
        self.remaining(now).is_zero()
    }

    /// Time until the window opens again.
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.last {
            Some(last) => self.window.saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }

    /// Start a new window at `now`.
    pub fn mark(&mut self, now: Instant) {
        self.last = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_before_first_save() {
        let throttle = SaveThrottle::new(Duration::from_secs(5));
        assert!(throttle.is_open(Instant::now()));
    }

    #[test]
    fn test_closed_inside_window() {
        let t0 = Instant::now();
        let mut throttle = SaveThrottle::new(Duration::from_secs(5));
        throttle.mark(t0);

        assert!(!throttle.is_open(t0));
        assert!(!throttle.is_open(t0 + Duration::from_millis(4_999)));
        assert_eq!(throttle.remaining(t0 + Duration::from_secs(2)), Duration::from_secs(3));
    }

    #[test]
    fn test_reopens_at_window_end() {
        let t0 = Instant::now();
        let mut throttle = SaveThrottle::new(Duration::from_secs(5));
        throttle.mark(t0);

        assert!(throttle.is_open(t0 + Duration::from_secs(5)));
        assert!(throttle.is_open(t0 + Duration::from_secs(60)));
    }

    #[test]
    fn test_zero_window_never_closes() {
        let t0 = Instant::now();
        let mut throttle = SaveThrottle::new(Duration::ZERO);
        throttle.mark(t0);
        assert!(throttle.is_open(t0));
    }
}
