//! Push scheduling: when a rendered frame goes out to the transport.

use std::num::NonZeroU32;
use std::time::{Duration, Instant};

/// Default coalescing factor for dense lines: push every 3rd valid line.
pub const DEFAULT_PUSH_EVERY: NonZeroU32 = match NonZeroU32::new(3) {
    Some(n) => n,
    None => unreachable!(),
};

/// Default cap for the fixed-rate loop.
pub const DEFAULT_FRAME_RATE: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushPolicy {
    /// Every accepted render is pushed.
    Immediate,
    /// Push on every Nth accepted render, then start counting again.
    EveryNth(NonZeroU32),
}

impl PushPolicy {
    /// `EveryNth(n)`, or `Immediate` when `n` is 0 or 1.
    #[must_use]
    pub fn every(n: u32) -> Self {
        match NonZeroU32::new(n) {
            Some(n) if n.get() > 1 => Self::EveryNth(n),
            _ => Self::Immediate,
        }
    }
}

impl Default for PushPolicy {
    fn default() -> Self {
        Self::EveryNth(DEFAULT_PUSH_EVERY)
    }
}

/// Counts accepted renders and decides which of them are pushed.
///
/// Rejected input never reaches the scheduler, so it never advances the
/// counter.
#[derive(Debug, Clone)]
pub struct UpdateScheduler {
    policy: PushPolicy,
    pending: u32,
    pushed: u64,
    skipped: u64,
}

impl UpdateScheduler {
    #[must_use]
    pub fn new(policy: PushPolicy) -> Self {
        Self {
            policy,
            pending: 0,
            pushed: 0,
            skipped: 0,
        }
    }

    #[must_use]
    pub fn policy(&self) -> PushPolicy {
        self.policy
    }

    /// Record one accepted render. Returns `true` if it should be pushed.
    pub fn frame_ready(&mut self) -> bool {
        let push = match self.policy {
            PushPolicy::Immediate => true,
            PushPolicy::EveryNth(n) => {
                self.pending += 1;
                if self.pending >= n.get() {
                    self.pending = 0;
                    true
                } else {
                    false
                }
            }
        };
        if push {
            self.pushed += 1;
        } else {
            self.skipped += 1;
        }
        push
    }

    /// Number of renders that were pushed.
    #[must_use]
    pub fn pushed(&self) -> u64 {
        self.pushed
    }

    /// Number of renders held back by coalescing.
    #[must_use]
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl Default for UpdateScheduler {
    fn default() -> Self {
        Self::new(PushPolicy::default())
    }
}

/// Fixed-period ticker for the polling loop.
///
/// Ticks are scheduled from the previous deadline rather than from "now", so
/// the rate does not drift. If the loop falls more than a period behind, the
/// schedule restarts from the current instant instead of bursting.
#[derive(Debug)]
pub struct FrameClock {
    period: Duration,
    next: Instant,
}

impl FrameClock {
    /// A clock ticking `hz` times per second. `hz` of 0 is treated as 1.
    #[must_use]
    pub fn from_rate(hz: u32) -> Self {
        let period = Duration::from_secs(1) / hz.max(1);
        Self {
            period,
            next: Instant::now() + period,
        }
    }

    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Time left until the next tick, zero if it is already due.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.next.saturating_duration_since(Instant::now())
    }

    /// Sleep until the next tick and schedule the one after it.
    pub fn wait(&mut self) {
        let now = Instant::now();
        if let Some(left) = self.next.checked_duration_since(now) {
            std::thread::sleep(left);
            self.next += self.period;
        } else if now.duration_since(self.next) > self.period {
            self.next = now + self.period;
        } else {
            self.next += self.period;
        }
    }
}
