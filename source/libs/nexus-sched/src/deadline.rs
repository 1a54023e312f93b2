// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Absolute timeouts for blocking waits
//! OWNERS: @kernel-sched-team
//! STATUS: Functional
//! API_STABILITY: Stable
//! TEST_COVERAGE: 3 unit tests + tests/deadline.rs
//! PUBLIC API: Deadline, TICKS_PER_MS, clock::now_ticks (std)
//! INVARIANTS: One tick is one microsecond of the monotonic clock

/// Monotonic clock ticks per millisecond.
pub const TICKS_PER_MS: u64 = 1_000;

/// Absolute point on the monotonic clock.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Deadline {
    pub ticks: u64,
}

impl Deadline {
    pub const fn from_ticks(ticks: u64) -> Self {
        Self { ticks }
    }

    pub const fn from_ms(ms: u64) -> Self {
        Self { ticks: ms.saturating_mul(TICKS_PER_MS) }
    }

    /// Deadline `ms` milliseconds after `now`.
    pub const fn after(now: u64, ms: u64) -> Self {
        Self { ticks: now.saturating_add(ms.saturating_mul(TICKS_PER_MS)) }
    }

    pub const fn is_expired(&self, now: u64) -> bool {
        now >= self.ticks
    }

    /// Deadline `ms` milliseconds from the current host clock.
    #[cfg(feature = "std")]
    pub fn in_ms(ms: u64) -> Self {
        Self::after(clock::now_ticks(), ms)
    }

    #[cfg(feature = "std")]
    pub fn has_passed(&self) -> bool {
        self.is_expired(clock::now_ticks())
    }
}

/// Host monotonic clock in ticks since first use.
#[cfg(feature = "std")]
pub mod clock {
    use std::sync::OnceLock;
    use std::time::Instant;

    static EPOCH: OnceLock<Instant> = OnceLock::new();

    pub fn now_ticks() -> u64 {
        let epoch = EPOCH.get_or_init(Instant::now);
        u64::try_from(epoch.elapsed().as_micros()).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn after_adds_scaled_offset() {
        assert_eq!(Deadline::after(500, 3).ticks, 3_500);
        assert_eq!(Deadline::after(u64::MAX, 1).ticks, u64::MAX);
    }

    #[test]
    fn expiry_is_inclusive() {
        let d = Deadline::from_ticks(10);
        assert!(!d.is_expired(9));
        assert!(d.is_expired(10));
    }

    #[cfg(feature = "std")]
    #[test]
    fn host_clock_is_monotonic() {
        let a = clock::now_ticks();
        let b = clock::now_ticks();
        assert!(b >= a);
        assert!(!Deadline::in_ms(10_000).has_passed());
    }
}
