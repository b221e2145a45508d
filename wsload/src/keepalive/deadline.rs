use std::time::Duration;
use tokio::time::Instant;

/// Rolling liveness deadline: last inbound activity plus a fixed window.
///
/// The deadline only moves forward. An older activity timestamp never pulls
/// it back; only `reset` may.
#[derive(Debug, Clone, Copy)]
pub struct LivenessDeadline {
    window: Duration,
    last_activity: Instant,
}

impl LivenessDeadline {
    pub fn new(now: Instant, window: Duration) -> Self {
        Self {
            window,
            last_activity: now,
        }
    }

    /// Record inbound activity observed at `now`.
    pub fn extend(&mut self, now: Instant) {
        if now > self.last_activity {
            self.last_activity = now;
        }
    }

    pub fn reset(&mut self, now: Instant) {
        self.last_activity = now;
    }

    pub fn at(&self) -> Instant {
        self.last_activity + self.window
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.at()
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.at().saturating_duration_since(now)
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }
}
