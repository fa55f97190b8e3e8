use std::cmp;
use std::time::Duration;

/// Doubling retry delay, bounded by `cap`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ExponentialBackoff {
    base: Duration,
    cap: Duration,
    current: Option<Duration>,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, cap: Duration) -> ExponentialBackoff {
        ExponentialBackoff {
            base,
            cap: cmp::max(base, cap),
            current: None,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let next = match self.current {
            None => self.base,
            Some(current) => cmp::min(current * 2, self.cap),
        };
        self.current = Some(next);

        next
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}
