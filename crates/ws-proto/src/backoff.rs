//! Reconnect backoff as a pure function: testable without a socket, unlike
//! an inline `reconnect_delay` field mutated directly inside a WS loop
//! (`kite::ws`'s approach).

use std::time::Duration;

pub const INITIAL: Duration = Duration::from_secs(1);
pub const CAP: Duration = Duration::from_secs(60);

/// Doubles `current`, capped at 60s: 1, 2, 4, 8, 16, 32, 60, 60, ...
pub fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(CAP)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_doubles_then_caps_at_sixty_seconds() {
        let mut delay = INITIAL;
        let expected_secs = [2, 4, 8, 16, 32, 60, 60, 60];
        for expected in expected_secs {
            delay = next_backoff(delay);
            assert_eq!(delay, Duration::from_secs(expected));
        }
    }

    #[test]
    fn initial_backoff_is_one_second() {
        assert_eq!(INITIAL, Duration::from_secs(1));
    }
}
