// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Debounce and coalescing for watcher pings.
//!
//! A burst of pings within the window W collapses into one dirty report.
//! Overlapping bursts extend the window, but never past 5×W from the first
//! ping, which bounds report latency under a continuous stream of changes.

use std::time::{Duration, Instant};

/// Debounce policy: window W with a 5×W extension cap
#[derive(Debug, Clone, Copy)]
pub struct Debouncer {
    window: Duration,
    cap: Duration,
}

/// An open debounce window for one folder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenWindow {
    pub first_ping: Instant,
    pub deadline: Instant,
}

impl Debouncer {
    pub fn new(window: Duration, cap: Duration) -> Self {
        Self { window, cap }
    }

    /// Account for one ping; returns the deadline the caller should arm.
    pub fn ping(&self, state: &mut Option<OpenWindow>, now: Instant) -> Instant {
        match state {
            None => {
                let deadline = now + self.window;
                *state = Some(OpenWindow { first_ping: now, deadline });
                deadline
            }
            Some(open) => {
                let extended = now + self.window;
                let capped = open.first_ping + self.cap;
                open.deadline = extended.min(capped);
                open.deadline
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn debouncer() -> Debouncer {
        Debouncer::new(Duration::from_millis(100), Duration::from_millis(500))
    }

    #[test]
    fn first_ping_opens_window() {
        let mut state = None;
        let now = Instant::now();
        let deadline = debouncer().ping(&mut state, now);
        assert_eq!(deadline, now + Duration::from_millis(100));
        assert!(state.is_some());
    }

    #[test]
    fn later_ping_extends_deadline() {
        let d = debouncer();
        let mut state = None;
        let start = Instant::now();
        d.ping(&mut state, start);
        let deadline = d.ping(&mut state, start + Duration::from_millis(50));
        assert_eq!(deadline, start + Duration::from_millis(150));
    }

    #[test]
    fn continuous_pings_hit_the_cap() {
        let d = debouncer();
        let mut state = None;
        let start = Instant::now();
        d.ping(&mut state, start);

        // Pings every 50ms forever: the deadline must stop at first + 5×W.
        let mut deadline = start;
        for i in 1..20 {
            deadline = d.ping(&mut state, start + Duration::from_millis(50 * i));
        }
        assert_eq!(deadline, start + Duration::from_millis(500));
    }

    #[test]
    fn window_reset_after_quiescence_starts_fresh() {
        let d = debouncer();
        let mut state = None;
        let start = Instant::now();
        d.ping(&mut state, start);

        // The caller clears the state when the deadline fires.
        state = None;
        let later = start + Duration::from_secs(10);
        let deadline = d.ping(&mut state, later);
        assert_eq!(deadline, later + Duration::from_millis(100));
        assert_eq!(state.unwrap().first_ping, later);
    }
}
