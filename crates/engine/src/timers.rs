// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deadline wheel for the engine loop.
//!
//! All windows (debounce, keep-alive, agent-active, health cadence, retry
//! backoff) are deadlines here, fired by the periodic tick. Tests drive a
//! fake clock instead of sleeping.

use fidx_core::TimerKey;
use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};

/// Pending deadlines keyed by what they mean
#[derive(Debug, Default)]
pub struct TimerWheel {
    timers: HashMap<TimerKey, Instant>,
}

impl TimerWheel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or move) a deadline
    pub fn set(&mut self, key: TimerKey, fires_at: Instant) {
        self.timers.insert(key, fires_at);
    }

    /// Set a deadline relative to `now`
    pub fn set_after(&mut self, key: TimerKey, now: Instant, delay: Duration) {
        self.set(key, now + delay);
    }

    pub fn cancel(&mut self, key: &TimerKey) {
        self.timers.remove(key);
    }

    pub fn deadline(&self, key: &TimerKey) -> Option<Instant> {
        self.timers.get(key).copied()
    }

    /// Drop all deadlines referring to a folder
    pub fn cancel_folder(&mut self, folder: &Path) {
        self.timers.retain(|key, _| match key {
            TimerKey::Debounce(path) | TimerKey::ScanRetry(path) => path != folder,
            _ => true,
        });
    }

    /// Remove and return every deadline that has fired
    pub fn fired(&mut self, now: Instant) -> Vec<TimerKey> {
        let fired: Vec<TimerKey> = self
            .timers
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &fired {
            self.timers.remove(key);
        }
        fired
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn fired_removes_due_deadlines_only() {
        let mut wheel = TimerWheel::new();
        let now = Instant::now();
        wheel.set(TimerKey::AgentActive, now + Duration::from_secs(1));
        wheel.set(
            TimerKey::Debounce(PathBuf::from("/f")),
            now + Duration::from_secs(5),
        );

        assert!(wheel.fired(now).is_empty());

        let fired = wheel.fired(now + Duration::from_secs(2));
        assert_eq!(fired, vec![TimerKey::AgentActive]);
        assert!(!wheel.is_empty());
    }

    #[test]
    fn set_moves_existing_deadline() {
        let mut wheel = TimerWheel::new();
        let now = Instant::now();
        wheel.set(TimerKey::AgentActive, now + Duration::from_secs(1));
        wheel.set(TimerKey::AgentActive, now + Duration::from_secs(10));

        assert!(wheel.fired(now + Duration::from_secs(5)).is_empty());
        assert_eq!(
            wheel.fired(now + Duration::from_secs(10)),
            vec![TimerKey::AgentActive]
        );
    }

    #[test]
    fn cancel_folder_drops_only_that_folder() {
        let mut wheel = TimerWheel::new();
        let now = Instant::now();
        wheel.set(TimerKey::Debounce(PathBuf::from("/a")), now);
        wheel.set(TimerKey::ScanRetry(PathBuf::from("/a")), now);
        wheel.set(TimerKey::Debounce(PathBuf::from("/b")), now);
        wheel.set(TimerKey::AgentActive, now);

        wheel.cancel_folder(Path::new("/a"));

        let mut fired = wheel.fired(now);
        fired.sort_by_key(|k| format!("{k:?}"));
        assert_eq!(fired.len(), 2);
    }
}
