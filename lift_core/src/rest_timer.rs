//! Single-slot rest countdown between sets.
//!
//! The timer is a small state machine: `Idle -> Counting -> Idle`. It never
//! stores a decrementing counter. Remaining time is always derived from the
//! wall-clock start of the countdown, so a process that was suspended for a
//! while sees the correct value on its next poll instead of resuming where
//! its ticks left off.
//!
//! Every call to [`RestTimer::start`] bumps a generation counter. Whoever
//! drives the 1-second cadence (see `engine`) remembers the generation it
//! was started for and stops as soon as it no longer matches.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Point-in-time view of the rest timer, suitable for display
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize)]
pub struct RestStatus {
    pub active: bool,
    pub remaining_secs: u32,
    pub generation: u64,
}

/// Result of polling the timer on a tick boundary
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestTick {
    /// Nothing was counting
    Idle,
    /// Still counting, with this many whole seconds left (always > 0)
    Counting(u32),
    /// The countdown reached zero on this poll and is now idle
    Expired,
}

#[derive(Clone, Copy, Debug)]
enum Countdown {
    Idle,
    Counting {
        started_at: DateTime<Utc>,
        duration_secs: u32,
    },
}

#[derive(Clone, Debug)]
pub struct RestTimer {
    countdown: Countdown,
    generation: u64,
}

impl Default for RestTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl RestTimer {
    pub fn new() -> Self {
        Self {
            countdown: Countdown::Idle,
            generation: 0,
        }
    }

    /// Start a countdown, discarding any countdown already running.
    ///
    /// Returns the new generation, or `None` when `secs` is zero (a zero
    /// rest never becomes active).
    pub fn start(&mut self, secs: u32, now: DateTime<Utc>) -> Option<u64> {
        self.generation += 1;
        if secs == 0 {
            self.countdown = Countdown::Idle;
            return None;
        }
        self.countdown = Countdown::Counting {
            started_at: now,
            duration_secs: secs,
        };
        tracing::debug!(secs, generation = self.generation, "rest timer started");
        Some(self.generation)
    }

    /// Stop the countdown immediately. Returns whether one was running.
    pub fn cancel(&mut self) -> bool {
        let was_counting = self.is_counting();
        self.countdown = Countdown::Idle;
        if was_counting {
            tracing::debug!(generation = self.generation, "rest timer cancelled");
        }
        was_counting
    }

    /// Re-evaluate the countdown against `now`, going idle once it hits zero
    pub fn poll(&mut self, now: DateTime<Utc>) -> RestTick {
        match self.countdown {
            Countdown::Idle => RestTick::Idle,
            Countdown::Counting {
                started_at,
                duration_secs,
            } => match remaining_secs(started_at, duration_secs, now) {
                0 => {
                    self.countdown = Countdown::Idle;
                    tracing::debug!(generation = self.generation, "rest timer expired");
                    RestTick::Expired
                }
                left => RestTick::Counting(left),
            },
        }
    }

    /// Current status without changing state
    pub fn status(&self, now: DateTime<Utc>) -> RestStatus {
        let remaining = match self.countdown {
            Countdown::Idle => 0,
            Countdown::Counting {
                started_at,
                duration_secs,
            } => remaining_secs(started_at, duration_secs, now),
        };
        RestStatus {
            active: remaining > 0,
            remaining_secs: remaining,
            generation: self.generation,
        }
    }

    pub fn is_counting(&self) -> bool {
        matches!(self.countdown, Countdown::Counting { .. })
    }
}

/// Whole seconds left, rounded up, within `[0, duration_secs]`
fn remaining_secs(started_at: DateTime<Utc>, duration_secs: u32, now: DateTime<Utc>) -> u32 {
    // A clock that moved backwards counts as no time elapsed
    let elapsed_ms = (now - started_at).num_milliseconds().max(0);
    let left_ms = i64::from(duration_secs) * 1000 - elapsed_ms;
    if left_ms <= 0 {
        0
    } else {
        ((left_ms + 999) / 1000) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_counts_down_and_never_goes_negative() {
        let mut now = Utc::now();
        let mut timer = RestTimer::new();
        timer.start(45, now);

        for _ in 0..50 {
            now += Duration::seconds(1);
            timer.poll(now);
        }

        let status = timer.status(now);
        assert_eq!(status.remaining_secs, 0);
        assert!(!status.active);
        assert!(!timer.is_counting());
    }

    #[test]
    fn test_expires_exactly_once() {
        let start = Utc::now();
        let mut timer = RestTimer::new();
        timer.start(2, start);

        assert_eq!(timer.poll(start + Duration::seconds(1)), RestTick::Counting(1));
        assert_eq!(timer.poll(start + Duration::seconds(2)), RestTick::Expired);
        assert_eq!(timer.poll(start + Duration::seconds(3)), RestTick::Idle);
    }

    #[test]
    fn test_partial_seconds_round_up() {
        let start = Utc::now();
        let mut timer = RestTimer::new();
        timer.start(10, start);

        let status = timer.status(start + Duration::milliseconds(2_500));
        assert_eq!(status.remaining_secs, 8);
        assert!(status.active);
    }

    #[test]
    fn test_suspension_is_measured_by_wall_clock() {
        let start = Utc::now();
        let mut timer = RestTimer::new();
        timer.start(60, start);

        // A single poll after a long gap, as after a backgrounded process
        assert_eq!(timer.poll(start + Duration::seconds(40)), RestTick::Counting(20));
        assert_eq!(timer.poll(start + Duration::minutes(5)), RestTick::Expired);
    }

    #[test]
    fn test_restart_replaces_previous_countdown() {
        let start = Utc::now();
        let mut timer = RestTimer::new();
        let first = timer.start(60, start).unwrap();

        let later = start + Duration::seconds(10);
        let second = timer.start(30, later).unwrap();

        assert!(second > first);
        let status = timer.status(later);
        assert_eq!(status.remaining_secs, 30);
        assert_eq!(status.generation, second);
    }

    #[test]
    fn test_cancel_zeroes_immediately() {
        let start = Utc::now();
        let mut timer = RestTimer::new();
        timer.start(90, start);

        assert!(timer.cancel());
        assert_eq!(timer.status(start).remaining_secs, 0);
        assert_eq!(timer.poll(start), RestTick::Idle);
        assert!(!timer.cancel());
    }

    #[test]
    fn test_zero_rest_never_activates() {
        let start = Utc::now();
        let mut timer = RestTimer::new();

        assert_eq!(timer.start(0, start), None);
        assert!(!timer.status(start).active);
    }

    #[test]
    fn test_clock_moving_backwards_keeps_full_duration() {
        let start = Utc::now();
        let mut timer = RestTimer::new();
        timer.start(30, start);

        assert_eq!(timer.status(start - Duration::seconds(5)).remaining_secs, 30);
    }
}
