//! Per-signal committed/staged value and its waiter set.

use crate::design::SignalId;
use crate::process::ProcessId;

/// A waiter's wake condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Wake on any change to `curr`.
    Any,
    /// Wake only when `curr` becomes exactly this value (edge-sensitive).
    Equals(u64),
}

impl Trigger {
    fn satisfied_by(&self, curr: u64) -> bool {
        match self {
            Trigger::Any => true,
            Trigger::Equals(v) => *v == curr,
        }
    }
}

/// The committed/staged value pair for one signal, plus everyone waiting on it.
///
/// `waiters` is a plain `Vec`, not a map: the kernel's determinism guarantee
/// (bit-identical traces regardless of hash iteration order) depends on never
/// iterating a hash-ordered collection where that order could leak into
/// observable output, and linear scans over small waiter lists are cheap.
pub struct SignalState {
    pub id: SignalId,
    pub curr: u64,
    pub next: u64,
    waiters: Vec<(ProcessId, Trigger)>,
}

impl SignalState {
    pub fn new(id: SignalId, init: u64) -> Self {
        Self { id, curr: init, next: init, waiters: Vec::new() }
    }

    pub fn reset(&mut self, init: u64) {
        self.curr = init;
        self.next = init;
        self.waiters.clear();
    }

    /// Stage `value`. A no-op if it equals the already-staged `next` (this is
    /// what keeps setting a signal to its current value from ever marking it
    /// pending).
    pub fn set(&mut self, value: u64) -> bool {
        if self.next == value {
            return false;
        }
        self.next = value;
        true
    }

    /// Publish `next` into `curr` and wake satisfied waiters.
    ///
    /// Returns `true` iff `curr` actually changed — the sole signal the
    /// kernel's convergence detector needs.
    pub fn commit(&mut self) -> (bool, Vec<ProcessId>) {
        if self.curr == self.next {
            return (false, Vec::new());
        }
        self.curr = self.next;

        let woken: Vec<ProcessId> = self
            .waiters
            .iter()
            .filter(|(_, trigger)| trigger.satisfied_by(self.curr))
            .map(|(pid, _)| *pid)
            .collect();
        (true, woken)
    }

    pub fn add_trigger(&mut self, process: ProcessId, trigger: Trigger) {
        if let Some((_, existing)) = self.waiters.iter().find(|(p, _)| *p == process) {
            assert_eq!(
                *existing, trigger,
                "process {process:?} re-added to signal {:?} with a different trigger",
                self.id
            );
            return;
        }
        self.waiters.push((process, trigger));
    }

    pub fn remove_trigger(&mut self, process: ProcessId) {
        let idx = self
            .waiters
            .iter()
            .position(|(p, _)| *p == process)
            .unwrap_or_else(|| panic!("process {process:?} is not waiting on signal {:?}", self.id));
        self.waiters.remove(idx);
    }
}
