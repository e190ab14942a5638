//! The simulated-time wheel: a monotonic clock plus a deadline queue keyed by process.

use std::collections::HashMap;

use crate::process::ProcessId;

/// A point in simulated time, picosecond resolution.
pub type Instant = u64;

/// When a process should next wake up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    /// Wake at the start of the current delta cycle, pre-empting any numeric deadline.
    Immediate,
    /// Wake once `now` reaches this absolute timestamp.
    At(Instant),
}

impl Deadline {
    fn absolute(&self, now: Instant) -> Instant {
        match self {
            Deadline::Immediate => now,
            Deadline::At(t) => *t,
        }
    }
}

/// An optional delay, as passed to [`Timeline::delay`]. `None` means "immediate".
pub type Delay = Option<Instant>;

/// Monotonic simulated clock and the deadlines processes are waiting on.
#[derive(Default)]
pub struct Timeline {
    now: Instant,
    deadlines: HashMap<ProcessId, Deadline>,
}

impl Timeline {
    pub fn new() -> Self {
        Self { now: 0, deadlines: HashMap::new() }
    }

    pub fn now(&self) -> Instant {
        self.now
    }

    pub fn reset(&mut self) {
        self.now = 0;
        self.deadlines.clear();
    }

    /// Register `process` to wake at absolute time `deadline`.
    ///
    /// Panics if `process` is already registered; the timeline never silently
    /// overwrites a pending wakeup (the spec treats this as programmer misuse).
    pub fn at(&mut self, deadline: Deadline, process: ProcessId) {
        if let Deadline::At(t) = deadline {
            assert!(t >= self.now, "deadline {t} precedes current time {}", self.now);
        }
        let prev = self.deadlines.insert(process, deadline);
        assert!(prev.is_none(), "process {process:?} is already registered on the timeline");
    }

    /// `at(now + amount, process)`, or `at(now, process)` if `amount` is `None`.
    pub fn delay(&mut self, amount: Delay, process: ProcessId) {
        let deadline = match amount {
            None => Deadline::Immediate,
            Some(d) => Deadline::At(self.now + d),
        };
        self.at(deadline, process);
    }

    /// Release every process sharing the earliest deadline, advance `now` to it.
    ///
    /// An `Immediate` deadline always wins over any numeric deadline, even one
    /// that equals `now` numerically. Returns `false` if nothing is registered.
    pub fn advance(&mut self) -> Vec<ProcessId> {
        if self.deadlines.is_empty() {
            return Vec::new();
        }

        let has_immediate = self.deadlines.values().any(|d| matches!(d, Deadline::Immediate));
        let nearest = if has_immediate {
            self.now
        } else {
            self.deadlines
                .values()
                .map(|d| d.absolute(self.now))
                .min()
                .expect("checked non-empty above")
        };

        let woken: Vec<ProcessId> = if has_immediate {
            self.deadlines
                .iter()
                .filter(|(_, d)| matches!(d, Deadline::Immediate))
                .map(|(p, _)| *p)
                .collect()
        } else {
            self.deadlines
                .iter()
                .filter(|(_, d)| d.absolute(self.now) == nearest)
                .map(|(p, _)| *p)
                .collect()
        };

        for p in &woken {
            self.deadlines.remove(p);
        }
        self.now = nearest;
        woken
    }

    /// Whether any process is currently registered to wake in the future.
    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_releases_earliest_set_together() {
        let mut tl = Timeline::new();
        tl.at(Deadline::At(10), ProcessId::Rtl(0));
        tl.at(Deadline::At(10), ProcessId::Rtl(1));
        tl.at(Deadline::At(20), ProcessId::Rtl(2));

        let mut woken = tl.advance();
        woken.sort_by_key(|p| match p {
            ProcessId::Rtl(i) => *i,
            ProcessId::Testbench(i) => *i,
        });
        assert_eq!(woken, vec![ProcessId::Rtl(0), ProcessId::Rtl(1)]);
        assert_eq!(tl.now(), 10);
    }

    #[test]
    fn immediate_preempts_numeric_at_same_time() {
        let mut tl = Timeline::new();
        tl.at(Deadline::At(0), ProcessId::Rtl(0));
        tl.at(Deadline::Immediate, ProcessId::Rtl(1));

        let woken = tl.advance();
        assert_eq!(woken, vec![ProcessId::Rtl(1)]);
        assert_eq!(tl.now(), 0);
        // The numeric deadline at 0 is still pending.
        assert!(!tl.is_empty());
    }

    #[test]
    fn empty_timeline_returns_nothing() {
        let mut tl = Timeline::new();
        assert!(tl.advance().is_empty());
    }

    #[test]
    #[should_panic]
    fn double_registration_panics() {
        let mut tl = Timeline::new();
        tl.at(Deadline::At(5), ProcessId::Rtl(0));
        tl.at(Deadline::At(6), ProcessId::Rtl(0));
    }
}
