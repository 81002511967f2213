use std::time::Duration;

/// Reconnect state machine driving the single task that owns both the
/// inbound `EventLoop` and the outbound `AsyncClient` handle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReconnectState {
    /// Establishing (or re-establishing) the MQTT connection.
    Init,
    /// Connected: polling inbound events and publishing outbound commands.
    Work,
    /// A connection error occurred; backing off before the next attempt.
    Error,
}

/// Exponential backoff for broker reconnects: starts at 2s, doubles each
/// failure, capped so a long outage doesn't push the retry interval into
/// the ridiculous.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    cap: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, cap: Duration) -> Self {
        Self { current: initial, cap }
    }

    /// Returns the delay to wait before the next attempt and advances the
    /// internal state for the attempt after that.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.cap);
        delay
    }

    pub fn reset(&mut self, initial: Duration) {
        self.current = initial;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let mut backoff = Backoff::new(Duration::from_secs(2), Duration::from_secs(10));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_secs(4));
        assert_eq!(backoff.next_delay(), Duration::from_secs(8));
        assert_eq!(backoff.next_delay(), Duration::from_secs(10));
        assert_eq!(backoff.next_delay(), Duration::from_secs(10));
    }

    #[test]
    fn backoff_reset_returns_to_initial() {
        let mut backoff = Backoff::new(Duration::from_secs(2), Duration::from_secs(60));
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset(Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
    }
}
