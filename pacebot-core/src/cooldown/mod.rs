//! src/cooldown/mod.rs
//!
//! Per-process cooldown tracking keyed by (command, channel) scope.
//! Entries are ephemeral: a restart clears them, which is acceptable
//! because cooldowns are a chat throttle, not an access control.
//!
//! A placement records its own expiry, so a later check does not need to
//! know which cooldown value (channel default or per-command override)
//! produced it. All mutation happens under one sync lock with no await
//! points, keeping `try_acquire` atomic on a multi-threaded runtime.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// Result of a cooldown check.
#[derive(Debug, Clone, PartialEq)]
pub enum CooldownVerdict {
    Allowed,
    /// Blocked; `remaining_seconds` is how long until the scope frees up.
    Blocked { remaining_seconds: f64 },
}

impl CooldownVerdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, CooldownVerdict::Allowed)
    }
}

/// Builds the composite scope key used for cooldown tracking.
pub fn scope_key(command: &str, channel_id: &str) -> String {
    format!("{}|{}", command.to_lowercase(), channel_id)
}

#[derive(Default)]
pub struct CooldownTracker {
    expires: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-mutating check: would a use of `scope` be allowed right now?
    /// A cooldown of zero and a never-seen scope always allow.
    pub fn check(&self, scope: &str, cooldown_seconds: u32) -> CooldownVerdict {
        self.check_at(scope, cooldown_seconds, Utc::now())
    }

    /// Places `scope` on cooldown for `cooldown_seconds` starting now.
    pub fn place(&self, scope: &str, cooldown_seconds: u32) {
        self.place_at(scope, cooldown_seconds, Utc::now());
    }

    /// Atomic check-and-set: on `Allowed` the scope is placed on cooldown
    /// before the lock is released, so two near-simultaneous messages can
    /// never both pass.
    pub fn try_acquire(&self, scope: &str, cooldown_seconds: u32) -> CooldownVerdict {
        self.try_acquire_at(scope, cooldown_seconds, Utc::now())
    }

    fn check_at(&self, scope: &str, cooldown_seconds: u32, now: DateTime<Utc>) -> CooldownVerdict {
        if cooldown_seconds == 0 {
            return CooldownVerdict::Allowed;
        }
        verdict_for(self.expires.lock().get(scope), now)
    }

    fn place_at(&self, scope: &str, cooldown_seconds: u32, now: DateTime<Utc>) {
        if cooldown_seconds == 0 {
            return;
        }
        self.expires
            .lock()
            .insert(scope.to_string(), now + Duration::seconds(cooldown_seconds as i64));
    }

    fn try_acquire_at(
        &self,
        scope: &str,
        cooldown_seconds: u32,
        now: DateTime<Utc>,
    ) -> CooldownVerdict {
        if cooldown_seconds == 0 {
            return CooldownVerdict::Allowed;
        }
        let mut expires = self.expires.lock();
        let verdict = verdict_for(expires.get(scope), now);
        if verdict.is_allowed() {
            expires.insert(
                scope.to_string(),
                now + Duration::seconds(cooldown_seconds as i64),
            );
        }
        verdict
    }
}

fn verdict_for(expiry: Option<&DateTime<Utc>>, now: DateTime<Utc>) -> CooldownVerdict {
    match expiry {
        Some(expiry) if *expiry > now => {
            let remaining_ms = expiry.signed_duration_since(now).num_milliseconds();
            CooldownVerdict::Blocked {
                remaining_seconds: remaining_ms as f64 / 1000.0,
            }
        }
        _ => CooldownVerdict::Allowed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remaining(verdict: CooldownVerdict) -> f64 {
        match verdict {
            CooldownVerdict::Blocked { remaining_seconds } => remaining_seconds,
            CooldownVerdict::Allowed => panic!("expected a blocked verdict"),
        }
    }

    #[test]
    fn check_place_check_blocks_until_window_passes() {
        let tracker = CooldownTracker::new();
        let scope = scope_key("help", "123");
        let t0 = Utc::now();

        assert!(tracker.check_at(&scope, 10, t0).is_allowed());
        tracker.place_at(&scope, 10, t0);

        let left = remaining(tracker.check_at(&scope, 10, t0 + Duration::seconds(2)));
        assert!((left - 8.0).abs() < 0.01, "expected ~8s, got {left}");

        assert!(tracker.check_at(&scope, 10, t0 + Duration::seconds(11)).is_allowed());
    }

    #[test]
    fn remaining_seconds_is_fractional() {
        let tracker = CooldownTracker::new();
        let scope = scope_key("help", "123");
        let t0 = Utc::now();

        tracker.place_at(&scope, 10, t0);
        let left = remaining(tracker.check_at(&scope, 10, t0 + Duration::milliseconds(2500)));
        assert!((left - 7.5).abs() < 0.01, "expected ~7.5s, got {left}");
    }

    #[test]
    fn zero_cooldown_always_allows() {
        let tracker = CooldownTracker::new();
        let scope = scope_key("ping", "abc");

        tracker.place(&scope, 10);
        assert!(tracker.check(&scope, 0).is_allowed());
        assert!(tracker.try_acquire(&scope, 0).is_allowed());
    }

    #[test]
    fn never_seen_scope_allows() {
        let tracker = CooldownTracker::new();
        assert!(tracker.check(&scope_key("help", "nowhere"), 30).is_allowed());
    }

    #[test]
    fn try_acquire_rejects_the_second_caller() {
        let tracker = CooldownTracker::new();
        let scope = scope_key("help", "123");
        let t0 = Utc::now();

        assert!(tracker.try_acquire_at(&scope, 10, t0).is_allowed());
        assert!(!tracker.try_acquire_at(&scope, 10, t0).is_allowed());
    }

    #[test]
    fn scopes_are_independent() {
        let tracker = CooldownTracker::new();
        let t0 = Utc::now();

        assert!(tracker.try_acquire_at(&scope_key("help", "123"), 10, t0).is_allowed());
        assert!(tracker.try_acquire_at(&scope_key("help", "456"), 10, t0).is_allowed());
        assert!(tracker.try_acquire_at(&scope_key("rules", "123"), 10, t0).is_allowed());
    }

    #[test]
    fn placement_expiry_survives_a_check_with_a_different_value() {
        // A check against an existing placement honors the expiry that was
        // recorded, not the value the checker happens to pass.
        let tracker = CooldownTracker::new();
        let scope = scope_key("help", "123");
        let t0 = Utc::now();

        tracker.place_at(&scope, 5, t0);
        let left = remaining(tracker.check_at(&scope, 60, t0 + Duration::seconds(1)));
        assert!((left - 4.0).abs() < 0.01, "expected ~4s, got {left}");
    }
}
