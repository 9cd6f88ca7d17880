use std::cmp::min;
use std::time::Duration;

const INITIAL_DELAY: Duration = Duration::from_secs(2);
const MAX_DELAY: Duration = Duration::from_secs(60);

/// Delay between attempts to reach a server, doubling after every failure
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    initial: Duration,
    max: Duration,
    next: Duration,
}

impl ReconnectBackoff {
    /// Starts at 2 seconds and doubles up to a 60 second ceiling
    pub fn new() -> ReconnectBackoff {
        ReconnectBackoff::with_limits(INITIAL_DELAY, MAX_DELAY)
    }

    pub fn with_limits(initial: Duration, max: Duration) -> ReconnectBackoff {
        ReconnectBackoff {
            initial,
            max,
            next: initial,
        }
    }

    /// Returns the delay to wait before the next attempt
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = min(self.next * 2, self.max);
        delay
    }

    /// Called once a connection succeeds
    pub fn reset(&mut self) {
        self.next = self.initial;
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        ReconnectBackoff::new()
    }
}
