//! Timing constants for the phase machine and dispatch loops

use std::time::Duration;

/// Minimum time the lobby stays open before a game may start
pub const REGISTRATION_DWELL: Duration = Duration::from_secs(10);

/// Minimum duration of one game turn
pub const TURN_DURATION: Duration = Duration::from_secs(1);

/// How long final results stay up before registration reopens
pub const RESULTS_DWELL: Duration = Duration::from_secs(3);

/// Bounded wait of a single receive; doubles as the tick granularity
pub const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Phase timers used by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub registration: Duration,
    pub turn: Duration,
    pub results: Duration,
    pub poll: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            registration: REGISTRATION_DWELL,
            turn: TURN_DURATION,
            results: RESULTS_DWELL,
            poll: RECV_TIMEOUT,
        }
    }
}
