//! Run countdown and the stop-send bookkeeping that follows its expiry.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownStatus {
    /// No deadline armed
    Idle,
    /// Deadline armed and not yet reached
    Active(Duration),
    /// The deadline was reached on this tick; the timer has disarmed itself
    Expired,
}

/// Single one-shot deadline. Arming replaces any previous deadline.
#[derive(Debug, Clone, Default)]
pub struct CountdownTimer {
    deadline: Option<Instant>,
}

impl CountdownTimer {
    pub fn new() -> Self {
        Self { deadline: None }
    }

    pub fn arm(&mut self, duration_seconds: u32, now: Instant) {
        let deadline = now + Duration::from_secs(u64::from(duration_seconds));
        if self.deadline.is_some() {
            log::debug!("Replacing active countdown with {}s", duration_seconds);
        }
        self.deadline = Some(deadline);
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Remaining time without advancing the timer
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(now))
    }

    /// Advance to `now`. `Expired` is reported exactly once per armed deadline.
    pub fn tick(&mut self, now: Instant) -> CountdownStatus {
        match self.deadline {
            None => CountdownStatus::Idle,
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                CountdownStatus::Expired
            }
            Some(deadline) => CountdownStatus::Active(deadline - now),
        }
    }
}

/// Outstanding stop command owed to the controller after an expiry.
///
/// Writes have no acknowledgement, so a stop counts as delivered once a write
/// succeeds. Failed attempts are retried on later ticks up to `limit` times.
#[derive(Debug, Clone)]
pub struct StopRetry {
    attempts: u32,
    limit: u32,
}

impl StopRetry {
    pub fn new(limit: u32) -> Self {
        Self {
            attempts: 0,
            limit: limit.max(1),
        }
    }

    /// Count one send attempt; false once the limit is used up
    pub fn begin_attempt(&mut self) -> bool {
        if self.attempts >= self.limit {
            return false;
        }
        self.attempts += 1;
        true
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn exhausted(&self) -> bool {
        self.attempts >= self.limit
    }
}
