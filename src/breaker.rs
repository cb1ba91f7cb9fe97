//! Outbound circuit breaker
//!
//! A sliding-window counter consulted before every send. When more than
//! `max_messages` sends happen inside one window the breaker trips: the
//! bot posts a final notice and the process is terminated. This guards
//! against runaway reply loops (two bots answering each other), it is not
//! a retry mechanism.

use crate::config::CircuitBreakerConfig;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Notice posted to the channel that caused the trip
pub fn tripped_message(max_messages: u32, window: Duration) -> String {
    format!(
        "*CIRCUIT BREAKER TRIPPED*\nMore than {} messages were sent in under {} seconds\n\nSelf destruct sequence initiated. Goodbye.",
        max_messages,
        window.as_secs()
    )
}

/// Result of consulting the breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerDecision {
    /// The send may proceed
    Pass,
    /// This send exceeded the threshold; the breaker is now open
    Tripped,
    /// The breaker tripped earlier; nothing may be sent
    Open,
}

#[derive(Debug)]
struct WindowState {
    window_start: Option<Instant>,
    count: u32,
    tripped: bool,
}

/// Sliding-window send counter
#[derive(Debug)]
pub struct CircuitBreaker {
    max_messages: u32,
    window: Duration,
    state: Mutex<WindowState>,
}

impl CircuitBreaker {
    pub fn new(max_messages: u32, window: Duration) -> Self {
        Self {
            max_messages,
            window,
            state: Mutex::new(WindowState {
                window_start: None,
                count: 0,
                tripped: false,
            }),
        }
    }

    pub fn from_config(config: &CircuitBreakerConfig) -> Self {
        Self::new(config.max_messages, config.window())
    }

    pub fn max_messages(&self) -> u32 {
        self.max_messages
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record a send attempt now
    pub fn check(&self) -> BreakerDecision {
        self.check_at(Instant::now())
    }

    /// Record a send attempt at `now`
    ///
    /// A send that opens a new window always passes, since the count is
    /// reset to 1 by that send.
    pub fn check_at(&self, now: Instant) -> BreakerDecision {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if state.tripped {
            return BreakerDecision::Open;
        }

        state.count += 1;
        let expired = match state.window_start {
            None => true,
            Some(start) => now.saturating_duration_since(start) > self.window,
        };

        if expired {
            state.window_start = Some(now);
            state.count = 1;
            BreakerDecision::Pass
        } else if state.count > self.max_messages {
            state.tripped = true;
            BreakerDecision::Tripped
        } else {
            BreakerDecision::Pass
        }
    }

    /// Sends counted in the current window
    pub fn count(&self) -> u32 {
        self.state.lock().map(|s| s.count).unwrap_or(0)
    }

    pub fn is_tripped(&self) -> bool {
        self.state.lock().map(|s| s.tripped).unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_send_opens_window() {
        let cb = CircuitBreaker::new(1, Duration::from_secs(10));
        assert_eq!(cb.check_at(Instant::now()), BreakerDecision::Pass);
        assert_eq!(cb.count(), 1);
    }

    #[test]
    fn test_second_send_in_window_trips() {
        let cb = CircuitBreaker::new(1, Duration::from_secs(10));
        let t0 = Instant::now();
        assert_eq!(cb.check_at(t0), BreakerDecision::Pass);
        assert_eq!(
            cb.check_at(t0 + Duration::from_secs(1)),
            BreakerDecision::Tripped
        );
        assert!(cb.is_tripped());
    }

    #[test]
    fn test_send_after_window_resets() {
        let cb = CircuitBreaker::new(1, Duration::from_secs(10));
        let t0 = Instant::now();
        assert_eq!(cb.check_at(t0), BreakerDecision::Pass);

        let later = t0 + Duration::from_secs(11);
        assert_eq!(cb.check_at(later), BreakerDecision::Pass);
        assert_eq!(cb.count(), 1);

        // The reset send started a new window, so the next one inside it trips
        assert_eq!(
            cb.check_at(later + Duration::from_secs(1)),
            BreakerDecision::Tripped
        );
    }

    #[test]
    fn test_threshold_allows_max_messages() {
        let cb = CircuitBreaker::new(3, Duration::from_secs(60));
        let t0 = Instant::now();
        for i in 0..3 {
            assert_eq!(
                cb.check_at(t0 + Duration::from_millis(i)),
                BreakerDecision::Pass
            );
        }
        assert_eq!(
            cb.check_at(t0 + Duration::from_millis(10)),
            BreakerDecision::Tripped
        );
    }

    #[test]
    fn test_open_after_trip() {
        let cb = CircuitBreaker::new(1, Duration::from_secs(10));
        let t0 = Instant::now();
        cb.check_at(t0);
        cb.check_at(t0);
        assert_eq!(
            cb.check_at(t0 + Duration::from_secs(60)),
            BreakerDecision::Open
        );
    }

    #[test]
    fn test_tripped_message() {
        let msg = tripped_message(30, Duration::from_secs(10));
        assert!(msg.contains("More than 30 messages"));
        assert!(msg.contains("under 10 seconds"));
    }
}
