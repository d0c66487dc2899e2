/// Free-running millisecond counter. Wraps after roughly 49.7 days.
pub type Millis = u32;

/// Milliseconds elapsed from `since` to `now`, correct across one wrap of the counter.
pub fn elapsed_ms(now: Millis, since: Millis) -> Millis {
    now.wrapping_sub(since)
}

pub trait Clock {
    fn now_ms(&self) -> Millis;
}

pub trait Delay {
    fn delay_ms(&mut self, ms: u32);
}

/// A fixed-length interval restarted from the time it is observed due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    start_ms: Millis,
    length_ms: Millis,
}

impl Interval {
    pub fn new(length_ms: Millis, start_ms: Millis) -> Self {
        Self {
            start_ms,
            length_ms,
        }
    }

    pub fn start_ms(&self) -> Millis {
        self.start_ms
    }

    pub fn length_ms(&self) -> Millis {
        self.length_ms
    }

    pub fn elapsed(&self, now: Millis) -> Millis {
        elapsed_ms(now, self.start_ms)
    }

    pub fn is_due(&self, now: Millis) -> bool {
        self.elapsed(now) >= self.length_ms
    }

    pub fn restart(&mut self, now: Millis) {
        self.start_ms = now;
    }

    /// Restarts and returns true when due.
    pub fn poll(&mut self, now: Millis) -> bool {
        if self.is_due(now) {
            self.restart(now);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_survives_counter_wrap() {
        let since = u32::MAX - 99;
        assert_eq!(elapsed_ms(50, since), 150);
        assert_eq!(elapsed_ms(since, since), 0);
    }

    #[test]
    fn interval_is_due_at_exact_length() {
        let interval = Interval::new(1_000, 500);

        assert!(!interval.is_due(1_499));
        assert!(interval.is_due(1_500));
    }

    #[test]
    fn poll_restarts_from_observed_time() {
        let mut interval = Interval::new(1_000, 0);

        assert!(interval.poll(1_250));
        assert_eq!(interval.start_ms(), 1_250);
        assert!(!interval.poll(2_000));
        assert!(interval.poll(2_250));
    }

    #[test]
    fn interval_fires_across_wrap() {
        let mut interval = Interval::new(30_000, u32::MAX - 10_000);

        assert!(!interval.poll(19_998));
        assert!(interval.poll(19_999));
    }
}
