//! The delta-cycle kernel loop: two-phase eval/commit convergence, testbench
//! interleaving, and the advance-time step.

use tracing::{debug, trace};

use crate::clock::ClockProcess;
use crate::design::{Design, SignalId};
use crate::process::{ProcessId, ProcessHandle, RtlProcess, TestbenchProcess};
use crate::state::StateStore;
use crate::trace::{ChangeSet, TraceSink};

/// A soft cap on convergence-loop iterations within a single delta cycle.
///
/// This exists purely so a pathological combinational ring (two inverters
/// feeding each other, say) fails fast and loudly in development instead of
/// hanging the process. It is compiled out of release builds and must never
/// change observable behavior for a design that actually converges — see the
/// open question on convergence bounding in the design notes.
#[cfg(debug_assertions)]
const CONVERGENCE_SOFT_CAP: u32 = 1_000_000;

/// A registered trace sink, addressable for scoped detachment.
struct SinkSlot {
    id: u64,
    sink: Box<dyn TraceSink>,
}

/// The simulation kernel: owns the design's state and every registered
/// process, and drives them forward in simulated time.
pub struct Engine {
    state: StateStore,
    rtl_processes: Vec<Box<dyn RtlProcess>>,
    testbenches: Vec<Box<dyn TestbenchProcess>>,
    sinks: Vec<SinkSlot>,
    next_sink_id: u64,
}

/// A handle returned by [`Engine::attach_sink`], used to detach it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkHandle(u64);

impl Engine {
    pub fn new(design: &Design) -> Self {
        Self {
            state: StateStore::new(design),
            rtl_processes: Vec::new(),
            testbenches: Vec::new(),
            sinks: Vec::new(),
            next_sink_id: 0,
        }
    }

    pub fn state(&mut self) -> &mut StateStore {
        &mut self.state
    }

    /// Register a clock/RTL-class process. Returns its stable [`ProcessId`].
    pub fn add_rtl_process(&mut self, process: Box<dyn RtlProcess>) -> ProcessId {
        self.rtl_processes.push(process);
        ProcessId::Rtl(self.rtl_processes.len() - 1)
    }

    /// Register a testbench process. Returns its stable [`ProcessId`].
    pub fn add_testbench_process(&mut self, process: Box<dyn TestbenchProcess>) -> ProcessId {
        self.testbenches.push(process);
        ProcessId::Testbench(self.testbenches.len() - 1)
    }

    /// Register a built-in clock process that toggles `signal` every
    /// `period / 2` ticks, first edge at `phase + period / 2`. `passive`
    /// controls whether this clock alone keeps the simulation alive.
    pub fn add_clock_process(&mut self, signal: SignalId, phase: u64, period: u64, passive: bool) -> ProcessId {
        let id = ProcessId::Rtl(self.rtl_processes.len());
        let mut clock = Box::new(ClockProcess::new(id, signal, phase, period, passive));
        clock.reset(&mut self.state);
        self.rtl_processes.push(clock);
        id
    }

    /// Restore the state store and every registered process to its initial state.
    pub fn reset(&mut self) {
        self.state.reset();
        for p in &mut self.rtl_processes {
            p.reset(&mut self.state);
        }
        for p in &mut self.testbenches {
            p.reset(&mut self.state);
        }
    }

    pub fn now(&self) -> u64 {
        self.state.timeline().now()
    }

    fn set_runnable(&mut self, id: ProcessId, runnable: bool) {
        match id {
            ProcessId::Rtl(i) => self.rtl_processes[i].set_runnable(runnable),
            ProcessId::Testbench(i) => self.testbenches[i].set_runnable(runnable),
        }
    }

    /// One RTL step: eval every runnable clock/RTL process, commit, repeat
    /// until no state object reports a change.
    fn step_rtl(&mut self, mut changed: Option<&mut ChangeSet>) {
        #[cfg(debug_assertions)]
        let mut iterations: u32 = 0;

        loop {
            for i in 0..self.rtl_processes.len() {
                if self.rtl_processes[i].runnable() {
                    self.rtl_processes[i].set_runnable(false);
                    self.rtl_processes[i].run(&mut self.state);
                }
            }

            let (converged, woken) = self.state.commit(changed.as_deref_mut());
            for pid in woken {
                self.set_runnable(pid, true);
            }

            if converged {
                break;
            }

            #[cfg(debug_assertions)]
            {
                iterations += 1;
                assert!(
                    iterations < CONVERGENCE_SOFT_CAP,
                    "delta cycle failed to converge after {CONVERGENCE_SOFT_CAP} passes; \
                     likely a combinational cycle with no stable fixed point"
                );
            }
        }
    }

    /// One testbench step: settle RTL, then run testbenches to quiescence,
    /// re-settling RTL after every testbench mutation, then flush the
    /// change set to every attached sink.
    fn step_tb(&mut self) {
        let mut changed = if self.sinks.is_empty() { None } else { Some(ChangeSet::new()) };

        self.step_rtl(changed.as_mut());

        let mut converged = false;
        while !converged {
            converged = true;
            for i in 0..self.testbenches.len() {
                if self.testbenches[i].runnable() {
                    self.testbenches[i].set_runnable(false);
                    while self.testbenches[i].run(&mut self.state) {
                        converged = false;
                        self.step_rtl(changed.as_mut());
                    }
                }
            }
        }

        if let Some(changed) = changed {
            self.flush(changed);
        }
    }

    fn flush(&mut self, changed: ChangeSet) {
        let now = self.now();
        trace!(now, changes = changed.len(), "flushing change set to trace sinks");
        for record in changed.iter() {
            match *record {
                crate::trace::ChangeRecord::Signal(id) => {
                    let slot = self
                        .state
                        .slot_for_signal(id)
                        .expect("a recorded signal change implies the signal was interned");
                    let value = self.state.signal_curr_by_slot(slot);
                    for slot in &mut self.sinks {
                        slot.sink.update_signal(now, id, value);
                    }
                }
                crate::trace::ChangeRecord::Memory(id, addr) => {
                    let value = self.state.memory_value_at(id, addr);
                    for slot in &mut self.sinks {
                        slot.sink.update_memory(now, id, addr, value);
                    }
                }
            }
        }
    }

    /// Run one testbench step, then advance the timeline to the next
    /// deadline. Returns whether any process is still non-passive (i.e.
    /// whether the simulation is still live).
    pub fn advance(&mut self) -> bool {
        self.step_tb();

        let woken = self.state.timeline_mut().advance();
        debug!(now = self.now(), woken = woken.len(), "advanced timeline");
        for pid in woken {
            self.set_runnable(pid, true);
        }

        self.rtl_processes.iter().any(|p| !p.passive())
            || self.testbenches.iter().any(|p| !p.passive())
    }

    /// Attach a trace sink for the remainder of the run (or until detached).
    pub fn attach_sink(&mut self, sink: Box<dyn TraceSink>) -> SinkHandle {
        let id = self.next_sink_id;
        self.next_sink_id += 1;
        self.sinks.push(SinkSlot { id, sink });
        debug!(sink = id, "trace sink attached");
        SinkHandle(id)
    }

    /// Detach and close a previously attached sink.
    pub fn detach_sink(&mut self, handle: SinkHandle) {
        let now = self.now();
        if let Some(pos) = self.sinks.iter().position(|s| s.id == handle.0) {
            let mut slot = self.sinks.remove(pos);
            slot.sink.close(now);
            debug!(sink = handle.0, now, "trace sink detached");
        }
    }

    /// Attach a sink for a scoped segment of the run: it is guaranteed to be
    /// detached (and closed) when the returned guard drops, even on a panic
    /// unwind, mirroring the reference implementation's `@contextmanager`
    /// scoped registration.
    pub fn attach_scoped(&mut self, sink: Box<dyn TraceSink>) -> ScopedSink<'_> {
        let handle = self.attach_sink(sink);
        ScopedSink { engine: self, handle: Some(handle) }
    }
}

/// RAII guard returned by [`Engine::attach_scoped`].
pub struct ScopedSink<'e> {
    engine: &'e mut Engine,
    handle: Option<SinkHandle>,
}

impl Drop for ScopedSink<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.engine.detach_sink(handle);
        }
    }
}

impl std::ops::Deref for ScopedSink<'_> {
    type Target = Engine;

    fn deref(&self) -> &Engine {
        self.engine
    }
}

impl std::ops::DerefMut for ScopedSink<'_> {
    fn deref_mut(&mut self) -> &mut Engine {
        self.engine
    }
}
