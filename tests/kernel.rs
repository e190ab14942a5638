//! End-to-end tests driving the kernel through its public API: clock
//! generation, masked memory writes, edge triggers, feed-forward
//! convergence, passive shutdown, and out-of-range memory tolerance.

use std::cell::RefCell;
use std::rc::Rc;

use deltasim::{
    Design, Engine, MemoryDescriptor, MemoryId, ProcessHandle, ProcessId, RtlProcess, SignalDescriptor, SignalId,
    StateStore, TestbenchProcess, TraceSink, Trigger,
};

#[derive(Default)]
struct Recorded {
    signal_events: Vec<(u64, SignalId, u64)>,
}

/// A trace sink that records every update, cloneable so the engine can own
/// one handle while the test keeps another to inspect afterward.
#[derive(Clone, Default)]
struct RecordingSink {
    inner: Rc<RefCell<Recorded>>,
}

impl RecordingSink {
    fn signal_events(&self) -> Vec<(u64, SignalId, u64)> {
        self.inner.borrow().signal_events.clone()
    }
}

impl TraceSink for RecordingSink {
    fn update_signal(&mut self, timestamp: u64, signal: SignalId, value: u64) {
        self.inner.borrow_mut().signal_events.push((timestamp, signal, value));
    }

    fn update_memory(&mut self, _timestamp: u64, _memory: MemoryId, _addr: usize, _value: u64) {}

    fn close(&mut self, _timestamp: u64) {}
}

/// A comb-style process that drives `output = !input`, reacting only when
/// `input` changes. Used to build feed-forward chains in tests without
/// pulling in a real RTL compiler.
struct StageProcess {
    id: ProcessId,
    input: SignalId,
    output: SignalId,
    runnable: bool,
}

impl StageProcess {
    fn new(id: ProcessId, input: SignalId, output: SignalId) -> Self {
        Self { id, input, output, runnable: false }
    }
}

impl ProcessHandle for StageProcess {
    fn runnable(&self) -> bool {
        self.runnable
    }

    fn set_runnable(&mut self, runnable: bool) {
        self.runnable = runnable;
    }

    fn passive(&self) -> bool {
        true
    }

    fn reset(&mut self, state: &mut StateStore) {
        state.add_trigger(self.id, self.input, Trigger::Any);
    }
}

impl RtlProcess for StageProcess {
    fn run(&mut self, state: &mut StateStore) {
        let v = state.read_signal(self.input);
        state.set(self.output, if v == 0 { 1 } else { 0 });
    }
}

/// An RTL process that copies `input` to `output` on every change, counting
/// how many times it actually ran so a test can confirm a testbench's
/// writes each drove their own RTL re-settle pass.
struct EchoRtl {
    id: ProcessId,
    input: SignalId,
    output: SignalId,
    runnable: bool,
    runs: Rc<RefCell<u32>>,
}

impl EchoRtl {
    fn new(id: ProcessId, input: SignalId, output: SignalId, runs: Rc<RefCell<u32>>) -> Self {
        Self { id, input, output, runnable: false, runs }
    }
}

impl ProcessHandle for EchoRtl {
    fn runnable(&self) -> bool {
        self.runnable
    }

    fn set_runnable(&mut self, runnable: bool) {
        self.runnable = runnable;
    }

    fn passive(&self) -> bool {
        true
    }

    fn reset(&mut self, state: &mut StateStore) {
        state.add_trigger(self.id, self.input, Trigger::Any);
    }
}

impl RtlProcess for EchoRtl {
    fn run(&mut self, state: &mut StateStore) {
        *self.runs.borrow_mut() += 1;
        let v = state.read_signal(self.input);
        state.set(self.output, v);
    }
}

/// A testbench that drives `target` through a fixed sequence of values, one
/// per `run()` call, reporting `true` (more to do) until the sequence is
/// exhausted — the shape `Engine::step_tb` expects to loop on.
struct DriverTb {
    target: SignalId,
    values: Vec<u64>,
    idx: usize,
    runnable: bool,
}

impl DriverTb {
    fn new(target: SignalId, values: Vec<u64>) -> Self {
        Self { target, values, idx: 0, runnable: false }
    }
}

impl ProcessHandle for DriverTb {
    fn runnable(&self) -> bool {
        self.runnable
    }

    fn set_runnable(&mut self, runnable: bool) {
        self.runnable = runnable;
    }

    fn passive(&self) -> bool {
        false
    }

    fn reset(&mut self, _state: &mut StateStore) {
        self.idx = 0;
        self.runnable = true;
    }
}

impl TestbenchProcess for DriverTb {
    fn run(&mut self, state: &mut StateStore) -> bool {
        if self.idx >= self.values.len() {
            return false;
        }
        state.set(self.target, self.values[self.idx]);
        self.idx += 1;
        true
    }
}

#[test]
fn clock_toggles_on_period_and_phase() {
    let mut design = Design::new();
    let clk = design.add_signal(SignalDescriptor { name: "clk".to_string(), width: 1, init: 0 });

    let mut engine = Engine::new(&design);
    engine.add_clock_process(clk, 0, 10, false);
    engine.reset();

    let recorder = RecordingSink::default();
    engine.attach_sink(Box::new(recorder.clone()));

    // advance() runs already-scheduled wakeups, *then* advances the
    // timeline to the next deadline — so a toggle scheduled for t=5 is only
    // flushed on the advance() call after the one that moves `now` to 5.
    for _ in 0..6 {
        engine.advance();
    }

    let values: Vec<(u64, u64)> = recorder.signal_events().iter().map(|(ts, _, v)| (*ts, *v)).collect();
    assert_eq!(values, vec![(5, 1), (10, 0), (15, 1), (20, 0), (25, 1)]);
}

#[test]
fn masked_writes_in_one_phase_merge_before_commit() {
    let mut design = Design::new();
    let mem = design.add_memory(MemoryDescriptor { name: "scratch".to_string(), width: 8, depth: 4, init: vec![] });

    let mut engine = Engine::new(&design);
    engine.reset();

    engine.state().write_memory(mem, 1, 0xFF, Some(0x0F));
    engine.state().write_memory(mem, 1, 0xA0, Some(0xF0));
    engine.state().commit(None);

    assert_eq!(engine.state().read_memory(mem, 1), 0xAF);
}

#[test]
fn equals_trigger_wakes_only_on_the_rising_edge() {
    let mut design = Design::new();
    let sig = design.add_signal(SignalDescriptor { name: "flag".to_string(), width: 1, init: 0 });

    let mut engine = Engine::new(&design);
    engine.reset();

    let waiter = ProcessId::Rtl(0);
    engine.state().add_trigger(waiter, sig, Trigger::Equals(1));

    engine.state().set(sig, 1);
    let (_, woken) = engine.state().commit(None);
    assert_eq!(woken, vec![waiter]);

    // Already at 1: re-staging the same value is a no-op, so nothing wakes.
    engine.state().set(sig, 1);
    let (changed, woken) = engine.state().commit(None);
    assert!(!changed);
    assert!(woken.is_empty());
}

#[test]
fn feed_forward_chain_converges_to_the_expected_values() {
    let mut design = Design::new();
    // mid/y start at deliberately stale values so settling to NOT(x)/NOT(mid)
    // requires both stages to actually fire, not just happen to match init.
    let x = design.add_signal(SignalDescriptor { name: "x".to_string(), width: 1, init: 0 });
    let mid = design.add_signal(SignalDescriptor { name: "mid".to_string(), width: 1, init: 1 });
    let y = design.add_signal(SignalDescriptor { name: "y".to_string(), width: 1, init: 0 });

    let mut engine = Engine::new(&design);
    engine.add_rtl_process(Box::new(StageProcess::new(ProcessId::Rtl(0), x, mid)));
    engine.add_rtl_process(Box::new(StageProcess::new(ProcessId::Rtl(1), mid, y)));
    engine.reset();

    engine.state().set(x, 1);
    engine.advance();

    // mid = NOT(x) = NOT(1) = 0; y = NOT(mid) = NOT(0) = 1.
    assert_eq!(engine.state().read_signal(mid), 0);
    assert_eq!(engine.state().read_signal(y), 1);
}

#[test]
fn a_single_passive_clock_with_no_testbenches_is_not_live() {
    let mut design = Design::new();
    let clk = design.add_signal(SignalDescriptor { name: "clk".to_string(), width: 1, init: 0 });

    let mut engine = Engine::new(&design);
    engine.add_clock_process(clk, 0, 10, true);
    engine.reset();

    assert!(!engine.advance());
}

#[test]
fn out_of_range_memory_access_is_tolerant() {
    let mut design = Design::new();
    let mem = design.add_memory(MemoryDescriptor {
        name: "scratch".to_string(),
        width: 8,
        depth: 16,
        init: vec![],
    });

    let mut engine = Engine::new(&design);
    engine.reset();

    assert_eq!(engine.state().read_memory(mem, 100), 0);
    engine.state().write_memory(mem, 100, 0xFF, None);
    let (converged, _) = engine.state().commit(None);
    assert!(converged);
    assert_eq!(engine.state().read_memory(mem, 100), 0);
}

#[test]
fn testbench_process_drives_rtl_through_advance_to_quiescence() {
    let mut design = Design::new();
    let x = design.add_signal(SignalDescriptor { name: "x".to_string(), width: 8, init: 0 });
    // Deliberately stale so the assertion only passes if the echo actually ran.
    let y = design.add_signal(SignalDescriptor { name: "y".to_string(), width: 8, init: 99 });

    let runs = Rc::new(RefCell::new(0u32));
    let mut engine = Engine::new(&design);
    engine.add_rtl_process(Box::new(EchoRtl::new(ProcessId::Rtl(0), x, y, runs.clone())));
    engine.add_testbench_process(Box::new(DriverTb::new(x, vec![1, 2, 3])));
    engine.reset();

    // A single advance() drives the testbench to completion: each of its three
    // writes to `x` must trigger its own RTL re-settle pass (run() returning
    // true loops step_tb back into step_rtl) before the testbench is asked
    // for the next value.
    assert!(engine.advance());

    assert_eq!(engine.state().read_signal(y), 3);
    assert_eq!(*runs.borrow(), 3);
}
