//! The built-in clock-generator process: the common case a harness or test
//! builds a design around, rather than every caller hand-writing an
//! `RtlProcess` that toggles a signal on a timer.

use crate::design::SignalId;
use crate::process::{ProcessHandle, ProcessId, RtlProcess};
use crate::state::StateStore;

/// Toggles `signal` between 0 and 1 on a fixed period, first edge at
/// `phase + period / 2`, every `period / 2` ticks thereafter.
///
/// `period` must be even: the reference simulator only ever generates 50%
/// duty-cycle clocks, so an odd period is rejected at construction rather
/// than silently rounded to one that isn't.
pub struct ClockProcess {
    id: ProcessId,
    signal: SignalId,
    half_period: u64,
    phase: u64,
    passive: bool,
    runnable: bool,
}

impl ClockProcess {
    pub(crate) fn new(id: ProcessId, signal: SignalId, phase: u64, period: u64, passive: bool) -> Self {
        assert!(period > 0 && period % 2 == 0, "clock period must be a positive even tick count, got {period}");
        Self { id, signal, half_period: period / 2, phase, passive, runnable: false }
    }
}

impl ProcessHandle for ClockProcess {
    fn runnable(&self) -> bool {
        self.runnable
    }

    fn set_runnable(&mut self, runnable: bool) {
        self.runnable = runnable;
    }

    fn passive(&self) -> bool {
        self.passive
    }

    fn reset(&mut self, state: &mut StateStore) {
        state.wait_interval(self.id, Some(self.phase + self.half_period));
    }
}

impl RtlProcess for ClockProcess {
    fn run(&mut self, state: &mut StateStore) {
        let curr = state.read_signal(self.signal);
        state.set(self.signal, if curr == 0 { 1 } else { 0 });
        state.wait_interval(self.id, Some(self.half_period));
    }
}
