#![forbid(unsafe_code)]

//! Trailing-edge debouncing for scroll-driven range changes.
//!
//! Continuous scrolling produces range changes far faster than a page fetch
//! completes. [`Debouncer`] keeps only the most recent value and releases it
//! once no new value has arrived for the configured delay.
//!
//! # Design
//!
//! The timer is an explicit deadline owned by the debouncer rather than a
//! callback scheduled elsewhere. Each [`Debouncer::call_at`] replaces the
//! pending value and pushes the deadline out; the host loop asks
//! [`Debouncer::next_deadline`] how long it may sleep and calls
//! [`Debouncer::poll_at`] when it wakes. Because nothing fires unless the
//! owner polls, [`Debouncer::dispose`] is a hard stop: after it, no value is
//! ever released.
//!
//! ```text
//! call(A)@0   call(B)@50   call(C)@100   call(D)@150         poll@700
//!    ├──────────┼────────────┼─────────────┼───── 550ms ──────►│ D
//!  (A dropped) (B dropped)  (C dropped)
//! ```
//!
//! # Example
//!
//! ```
//! use std::time::{Duration, Instant};
//! use qgrid_window::Debouncer;
//!
//! let mut debouncer = Debouncer::new(Duration::from_millis(550));
//! let t0 = Instant::now();
//! debouncer.call_at("first", t0);
//! debouncer.call_at("second", t0 + Duration::from_millis(100));
//!
//! assert_eq!(debouncer.poll_at(t0 + Duration::from_millis(600)), None);
//! assert_eq!(debouncer.poll_at(t0 + Duration::from_millis(650)), Some("second"));
//! ```

use std::time::{Duration, Instant};

use qgrid_core::RowRange;

/// Debouncer for visible row ranges.
pub type RangeDebouncer = Debouncer<RowRange>;

#[derive(Debug, Clone)]
struct PendingCall<T> {
    value: T,
    deadline: Instant,
}

/// Lifetime counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebounceStats {
    /// Calls accepted.
    pub calls: u64,
    /// Values released.
    pub fired: u64,
    /// Values replaced by a newer call before firing.
    pub superseded: u64,
}

/// Trailing-edge debouncer with an owned deadline.
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    delay: Duration,
    pending: Option<PendingCall<T>>,
    disposed: bool,
    stats: DebounceStats,
}

impl<T> Debouncer<T> {
    /// Create a debouncer with the given quiet period.
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
            disposed: false,
            stats: DebounceStats {
                calls: 0,
                fired: 0,
                superseded: 0,
            },
        }
    }

    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Record `value` now.
    pub fn call(&mut self, value: T) -> bool {
        self.call_at(value, Instant::now())
    }

    /// Record `value` at `now`, replacing any pending value and restarting
    /// the timer. Returns `false` (and drops `value`) once disposed.
    pub fn call_at(&mut self, value: T, now: Instant) -> bool {
        if self.disposed {
            return false;
        }
        self.stats.calls += 1;
        if self.pending.is_some() {
            self.stats.superseded += 1;
        }
        self.pending = Some(PendingCall {
            value,
            deadline: now + self.delay,
        });
        true
    }

    /// Release the pending value if its deadline has passed.
    pub fn poll(&mut self) -> Option<T> {
        self.poll_at(Instant::now())
    }

    /// Release the pending value if its deadline is at or before `now`.
    pub fn poll_at(&mut self, now: Instant) -> Option<T> {
        if self.disposed {
            return None;
        }
        match &self.pending {
            Some(call) if call.deadline <= now => {}
            _ => return None,
        }
        let call = self.pending.take()?;
        self.stats.fired += 1;
        Some(call.value)
    }

    /// When the pending value becomes due, if any.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|call| call.deadline)
    }

    /// Time left until the pending value is due, measured from `now`.
    #[must_use]
    pub fn time_until_due(&self, now: Instant) -> Option<Duration> {
        self.next_deadline()
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Drop the pending value without firing it. Returns it, if any.
    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take().map(|call| call.value)
    }

    /// Cancel any pending value and refuse all further calls.
    pub fn dispose(&mut self) {
        self.pending = None;
        self.disposed = true;
    }

    #[must_use]
    pub const fn is_disposed(&self) -> bool {
        self.disposed
    }

    #[must_use]
    pub const fn stats(&self) -> DebounceStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn range(start: usize, end: usize) -> RowRange {
        RowRange::new(start, end).unwrap()
    }

    #[test]
    fn rapid_calls_collapse_to_last() {
        let mut d = RangeDebouncer::new(ms(550));
        let t0 = Instant::now();
        d.call_at(range(0, 20), t0);
        d.call_at(range(10, 30), t0 + ms(50));
        d.call_at(range(20, 40), t0 + ms(100));
        d.call_at(range(30, 50), t0 + ms(150));

        let mut fired = Vec::new();
        let mut t = 0;
        while t <= 2_000 {
            if let Some(r) = d.poll_at(t0 + ms(t)) {
                fired.push((t, r));
            }
            t += 10;
        }

        assert_eq!(fired, vec![(700, range(30, 50))]);
        assert_eq!(d.stats().calls, 4);
        assert_eq!(d.stats().superseded, 3);
        assert_eq!(d.stats().fired, 1);
    }

    #[test]
    fn not_due_before_delay() {
        let mut d = Debouncer::new(ms(550));
        let t0 = Instant::now();
        d.call_at(1, t0);
        assert_eq!(d.poll_at(t0 + ms(549)), None);
        assert!(d.is_pending());
        assert_eq!(d.poll_at(t0 + ms(550)), Some(1));
        assert!(!d.is_pending());
    }

    #[test]
    fn fires_once_per_quiet_period() {
        let mut d = Debouncer::new(ms(100));
        let t0 = Instant::now();
        d.call_at('a', t0);
        assert_eq!(d.poll_at(t0 + ms(100)), Some('a'));
        assert_eq!(d.poll_at(t0 + ms(500)), None);

        d.call_at('b', t0 + ms(600));
        assert_eq!(d.poll_at(t0 + ms(700)), Some('b'));
    }

    #[test]
    fn each_call_restarts_timer() {
        let mut d = Debouncer::new(ms(100));
        let t0 = Instant::now();
        d.call_at(1, t0);
        d.call_at(2, t0 + ms(90));
        assert_eq!(d.next_deadline(), Some(t0 + ms(190)));
        assert_eq!(d.time_until_due(t0 + ms(150)), Some(ms(40)));
        assert_eq!(d.poll_at(t0 + ms(100)), None);
        assert_eq!(d.poll_at(t0 + ms(190)), Some(2));
    }

    #[test]
    fn cancel_drops_pending() {
        let mut d = Debouncer::new(ms(100));
        let t0 = Instant::now();
        d.call_at(5, t0);
        assert_eq!(d.cancel(), Some(5));
        assert_eq!(d.poll_at(t0 + ms(1_000)), None);
        assert_eq!(d.next_deadline(), None);
    }

    #[test]
    fn dispose_prevents_any_firing() {
        let mut d = Debouncer::new(ms(100));
        let t0 = Instant::now();
        d.call_at(5, t0);
        d.dispose();

        assert_eq!(d.poll_at(t0 + ms(1_000)), None);
        assert!(!d.call_at(6, t0 + ms(1_000)));
        assert_eq!(d.poll_at(t0 + ms(5_000)), None);
        assert!(d.is_disposed());
        assert_eq!(d.stats().fired, 0);
    }

    #[test]
    fn zero_delay_fires_on_next_poll() {
        let mut d = Debouncer::new(Duration::ZERO);
        let t0 = Instant::now();
        d.call_at("x", t0);
        assert_eq!(d.poll_at(t0), Some("x"));
    }
}
