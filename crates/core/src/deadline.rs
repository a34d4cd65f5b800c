//! Per-request time budgeting.
//!
//! A capture request has one overall deadline. Each outbound phase asks for
//! its default budget and receives whatever fits in the time left, never
//! less than a fixed floor so a nearly expired request still makes one
//! short attempt instead of failing outright.

use std::time::Duration;

use tokio::time::Instant;

use crate::config::Timeouts;

#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    floor: Duration,
}

impl Deadline {
    pub fn starting_now(overall: Duration, floor: Duration) -> Self {
        Self { at: Instant::now() + overall, floor }
    }

    pub fn from_timeouts(timeouts: &Timeouts) -> Self {
        Self::starting_now(timeouts.overall(), timeouts.min_budget())
    }

    /// Time left before the overall deadline; zero once passed.
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// `max(floor, min(phase_default, remaining))`.
    pub fn budget(&self, phase_default: Duration) -> Duration {
        phase_default.min(self.remaining()).max(self.floor)
    }

    /// Post-navigation settle wait: `min(idle_time, idle_timeout, remaining)`.
    /// Zero means skip.
    pub fn settle(&self, idle_time: Duration, idle_timeout: Duration) -> Duration {
        idle_time.min(idle_timeout).min(self.remaining())
    }

    pub fn floor(&self) -> Duration {
        self.floor
    }
}
