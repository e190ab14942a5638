//! The slot table: owns every signal and memory state object, the shared
//! pending set, and the timeline.

use crate::design::{Design, MemoryDescriptor, MemoryId, SignalDescriptor, SignalId};
use crate::process::ProcessId;
use crate::state::memory::MemoryState;
use crate::state::signal::{SignalState, Trigger};
use crate::timeline::{Deadline, Delay, Timeline};
use crate::trace::ChangeSet;

enum Slot {
    Signal(SignalState),
    Memory(MemoryState),
}

/// Owns all signal/memory state, the pending-commit set, and the timeline.
///
/// Signals are interned on first reference (`get_signal`); memories are
/// pre-registered at construction, mirroring the data model's lifecycle
/// rule that no state object is created mid-run.
pub struct StateStore {
    signal_descs: Vec<SignalDescriptor>,
    memory_descs: Vec<MemoryDescriptor>,
    signal_slot: Vec<Option<usize>>,
    memory_slot: Vec<usize>,
    slots: Vec<Slot>,
    /// Insertion-ordered pending set: a `Vec` plus a membership bitset, never
    /// a hash-based collection — see the module docs on why iteration order
    /// here must be deterministic.
    pending: Vec<usize>,
    pending_flag: Vec<bool>,
    timeline: Timeline,
}

/// `desc.init` zero-padded (or truncated) to exactly `desc.depth` words, so a
/// `Design` built with a shorter initializer still gets a full-depth memory.
fn padded_init(desc: &MemoryDescriptor) -> Vec<u64> {
    let mut init = desc.init.clone();
    init.resize(desc.depth, 0);
    init
}

impl StateStore {
    pub fn new(design: &Design) -> Self {
        let signal_descs: Vec<_> = design.signals().map(|(_, d)| d.clone()).collect();
        let memory_descs: Vec<_> = design.memories().map(|(_, d)| d.clone()).collect();

        let mut slots = Vec::new();
        let mut memory_slot = Vec::with_capacity(memory_descs.len());
        for (i, desc) in memory_descs.iter().enumerate() {
            let id = MemoryId::new(i as u32);
            slots.push(Slot::Memory(MemoryState::new(id, desc.width, padded_init(desc))));
            memory_slot.push(slots.len() - 1);
        }

        let signal_slot = vec![None; signal_descs.len()];

        Self {
            signal_descs,
            memory_descs,
            signal_slot,
            memory_slot,
            slots,
            pending: Vec::new(),
            pending_flag: Vec::new(),
            timeline: Timeline::new(),
        }
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn timeline_mut(&mut self) -> &mut Timeline {
        &mut self.timeline
    }

    /// Restore every signal/memory to its declared initial value, clear the
    /// pending set, and reset the timeline.
    pub fn reset(&mut self) {
        self.timeline.reset();
        for (i, desc) in self.signal_descs.iter().enumerate() {
            if let Some(slot) = self.signal_slot[i] {
                if let Slot::Signal(s) = &mut self.slots[slot] {
                    s.reset(desc.init);
                }
            }
        }
        for i in 0..self.memory_descs.len() {
            let slot = self.memory_slot[i];
            let init = padded_init(&self.memory_descs[i]);
            if let Slot::Memory(m) = &mut self.slots[slot] {
                m.reset(&init);
            }
        }
        self.pending.clear();
        self.pending_flag.clear();
    }

    /// Intern `id`, allocating its slot on first reference.
    pub fn get_signal(&mut self, id: SignalId) -> usize {
        if let Some(slot) = self.signal_slot[id.index()] {
            return slot;
        }
        let desc = &self.signal_descs[id.index()];
        self.slots.push(Slot::Signal(SignalState::new(id, desc.init)));
        let slot = self.slots.len() - 1;
        self.signal_slot[id.index()] = Some(slot);
        slot
    }

    fn memory_slot_index(&self, id: MemoryId) -> usize {
        self.memory_slot[id.index()]
    }

    fn signal_mut(&mut self, slot: usize) -> &mut SignalState {
        match &mut self.slots[slot] {
            Slot::Signal(s) => s,
            Slot::Memory(_) => panic!("slot {slot} is a memory, not a signal"),
        }
    }

    fn memory_mut(&mut self, slot: usize) -> &mut MemoryState {
        match &mut self.slots[slot] {
            Slot::Memory(m) => m,
            Slot::Signal(_) => panic!("slot {slot} is a signal, not a memory"),
        }
    }

    fn mark_pending(&mut self, slot: usize) {
        if slot >= self.pending_flag.len() {
            self.pending_flag.resize(slot + 1, false);
        }
        if !self.pending_flag[slot] {
            self.pending_flag[slot] = true;
            self.pending.push(slot);
        }
    }

    /// Stage a new value for `id`. A no-op if it equals the already-staged value.
    pub fn set(&mut self, id: SignalId, value: u64) {
        let slot = self.get_signal(id);
        if self.signal_mut(slot).set(value) {
            self.mark_pending(slot);
        }
    }

    /// Read the committed value of `id`, interning it if this is the first reference.
    pub fn read_signal(&mut self, id: SignalId) -> u64 {
        let slot = self.get_signal(id);
        self.signal_mut(slot).curr
    }

    pub fn read_memory(&mut self, id: MemoryId, addr: usize) -> u64 {
        let slot = self.memory_slot_index(id);
        self.memory_mut(slot).read(addr)
    }

    pub fn write_memory(&mut self, id: MemoryId, addr: usize, value: u64, mask: Option<u64>) {
        let slot = self.memory_slot_index(id);
        if self.memory_mut(slot).write(addr, value, mask) {
            self.mark_pending(slot);
        }
    }

    pub fn add_trigger(&mut self, process: ProcessId, signal: SignalId, trigger: Trigger) {
        let slot = self.get_signal(signal);
        self.signal_mut(slot).add_trigger(process, trigger);
    }

    pub fn remove_trigger(&mut self, process: ProcessId, signal: SignalId) {
        let slot = self.get_signal(signal);
        self.signal_mut(slot).remove_trigger(process);
    }

    pub fn add_memory_trigger(&mut self, process: ProcessId, memory: MemoryId) {
        let slot = self.memory_slot_index(memory);
        self.memory_mut(slot).add_trigger(process);
    }

    pub fn remove_memory_trigger(&mut self, process: ProcessId, memory: MemoryId) {
        let slot = self.memory_slot_index(memory);
        self.memory_mut(slot).remove_trigger(process);
    }

    pub fn wait_interval(&mut self, process: ProcessId, interval: Delay) {
        self.timeline.delay(interval, process);
    }

    pub fn wait_until(&mut self, process: ProcessId, deadline: Deadline) {
        self.timeline.at(deadline, process);
    }

    /// Iterate the pending set once: for each entry, optionally record a
    /// change, then commit it. Returns `true` iff *nothing* changed this
    /// pass (i.e. the delta cycle has converged).
    pub fn commit(&mut self, mut changed: Option<&mut ChangeSet>) -> (bool, Vec<ProcessId>) {
        let pending = std::mem::take(&mut self.pending);
        self.pending_flag.clear();

        let mut converged = true;
        let mut woken = Vec::new();

        for slot in pending {
            match &mut self.slots[slot] {
                Slot::Signal(s) => {
                    if let Some(changed) = changed.as_deref_mut() {
                        changed.record_signal(s.id, slot);
                    }
                    let (did_change, mut w) = s.commit();
                    if did_change {
                        converged = false;
                    }
                    woken.append(&mut w);
                }
                Slot::Memory(m) => {
                    let touched = m.commit();
                    if let Some(changed) = changed.as_deref_mut() {
                        for addr in &touched {
                            changed.record_memory_write(m.id, *addr);
                        }
                    }
                    if !touched.is_empty() {
                        converged = false;
                        woken.extend_from_slice(m.waiters());
                    }
                }
            }
        }

        (converged, woken)
    }

    /// Read a signal's current value by slot (used when flushing a change
    /// set, where the slot index is already known).
    pub(crate) fn signal_curr_by_slot(&self, slot: usize) -> u64 {
        match &self.slots[slot] {
            Slot::Signal(s) => s.curr,
            Slot::Memory(_) => panic!("slot {slot} is a memory, not a signal"),
        }
    }

    pub(crate) fn slot_for_signal(&self, id: SignalId) -> Option<usize> {
        self.signal_slot[id.index()]
    }

    pub(crate) fn memory_value_at(&self, id: MemoryId, addr: usize) -> u64 {
        let slot = self.memory_slot_index(id);
        match &self.slots[slot] {
            Slot::Memory(m) => m.peek(addr),
            Slot::Signal(_) => panic!("slot {slot} is a signal, not a memory"),
        }
    }
}
