//! A concrete [`TraceSink`] that renders the change stream as a VCD file,
//! using the `vcd` crate — the Rust ecosystem's counterpart to the Python
//! reference implementation's `pyvcd` dependency.
//!
//! Grounded directly in `_VCDWriter` from the reference `pysim.py`: one VCD
//! variable per traced signal (sized to its bit width) and one variable per
//! memory word (so each address shows up as its own trace), with the same
//! whitespace-in-name and untraced-memory validation performed eagerly at
//! construction time rather than discovered mid-run.

use std::io::Write;

use vcd::{IdCode, SimulationCommand, TimescaleUnit, Value, Writer};

use crate::design::{Design, MemoryId, SignalId};
use crate::error::SinkError;
use crate::trace::TraceSink;

fn bits_msb_first(value: u64, width: u32) -> Vec<Value> {
    (0..width)
        .rev()
        .map(|bit| if (value >> bit) & 1 == 1 { Value::V1 } else { Value::V0 })
        .collect()
}

fn check_name(scope: &str, name: &str) -> Result<(), SinkError> {
    if name.chars().any(char::is_whitespace) {
        return Err(SinkError::Whitespace { scope: scope.to_string(), name: name.to_string() });
    }
    Ok(())
}

fn io_err(path: &str, source: std::io::Error) -> SinkError {
    SinkError::Io { path: path.to_string(), source }
}

struct SignalVar {
    code: IdCode,
    width: u32,
}

struct MemoryVar {
    width: u32,
    /// One VCD variable per address, in address order.
    words: Vec<IdCode>,
}

/// Renders a run's change stream to a VCD file.
///
/// Indexed by `SignalId`/`MemoryId` declaration order, like `Design` itself —
/// a signal or memory never traced by this sink simply has no entry and its
/// updates are dropped, mirroring how the reference sink only tracks
/// variables it registered.
pub struct VcdTraceSink<W: Write> {
    writer: Writer<W>,
    signal_vars: Vec<Option<SignalVar>>,
    memory_vars: Vec<Option<MemoryVar>>,
}

impl<W: Write> VcdTraceSink<W> {
    /// Build a sink tracing exactly `signals` and `memories` from `design`.
    ///
    /// Every entry in `memories` must have been registered with `design`;
    /// anything else is a [`SinkError::UntracedMemory`]. Any traced signal
    /// or memory whose name contains whitespace is a [`SinkError::Whitespace`]
    /// — VCD identifiers cannot contain it.
    pub fn new(
        design: &Design,
        sink: W,
        signals: &[SignalId],
        memories: &[MemoryId],
    ) -> Result<Self, SinkError> {
        let signal_count = design.signals().count();
        let memory_count = design.memories().count();

        let mut writer = Writer::new(sink);
        writer.timescale(1, TimescaleUnit::PS).map_err(|e| io_err("<vcd>", e))?;
        writer.add_module("top").map_err(|e| io_err("<vcd>", e))?;

        let mut signal_vars: Vec<Option<SignalVar>> = Vec::new();
        signal_vars.resize_with(signal_count, || None);
        for &id in signals {
            let desc = design.signal(id);
            check_name("top", &desc.name)?;
            let code = writer.add_wire(desc.width, &desc.name).map_err(|e| io_err(&desc.name, e))?;
            signal_vars[id.index()] = Some(SignalVar { code, width: desc.width });
        }

        let mut memory_vars: Vec<Option<MemoryVar>> = Vec::new();
        memory_vars.resize_with(memory_count, || None);
        for &id in memories {
            if id.index() >= memory_count {
                return Err(SinkError::UntracedMemory(id));
            }
            let desc = design.memory(id);
            check_name("top", &desc.name)?;
            let mut words = Vec::with_capacity(desc.depth);
            for addr in 0..desc.depth {
                let var_name = format!("{}_{addr}", desc.name);
                let code = writer.add_wire(desc.width, &var_name).map_err(|e| io_err(&var_name, e))?;
                words.push(code);
            }
            memory_vars[id.index()] = Some(MemoryVar { width: desc.width, words });
        }

        writer.upscope().map_err(|e| io_err("<vcd>", e))?;
        writer.enddefinitions().map_err(|e| io_err("<vcd>", e))?;

        // Dump the reset value of every traced signal/memory word so the
        // file is self-contained from timestamp zero.
        writer.begin(SimulationCommand::Dumpvars).map_err(|e| io_err("<vcd>", e))?;
        for (id, var) in design.signals().filter_map(|(id, _)| signal_vars[id.index()].as_ref().map(|v| (id, v))) {
            let init = design.signal(id).init;
            writer.change_vector(var.code, &bits_msb_first(init, var.width)).map_err(|e| io_err("<vcd>", e))?;
        }
        for (id, var) in design.memories().filter_map(|(id, _)| memory_vars[id.index()].as_ref().map(|v| (id, v))) {
            let desc = design.memory(id);
            for (addr, code) in var.words.iter().enumerate() {
                let init = desc.init.get(addr).copied().unwrap_or(0);
                writer.change_vector(*code, &bits_msb_first(init, var.width)).map_err(|e| io_err("<vcd>", e))?;
            }
        }
        writer.end().map_err(|e| io_err("<vcd>", e))?;

        Ok(Self { writer, signal_vars, memory_vars })
    }
}

impl<W: Write> TraceSink for VcdTraceSink<W> {
    fn update_signal(&mut self, timestamp: u64, signal: SignalId, value: u64) {
        let Some(Some(var)) = self.signal_vars.get(signal.index()) else { return };
        self.writer.timestamp(timestamp).expect("vcd write failed: timestamp");
        self.writer
            .change_vector(var.code, &bits_msb_first(value, var.width))
            .expect("vcd write failed: change_vector");
    }

    fn update_memory(&mut self, timestamp: u64, memory: MemoryId, addr: usize, value: u64) {
        let Some(Some(var)) = self.memory_vars.get(memory.index()) else { return };
        let Some(code) = var.words.get(addr) else { return };
        self.writer.timestamp(timestamp).expect("vcd write failed: timestamp");
        self.writer
            .change_vector(*code, &bits_msb_first(value, var.width))
            .expect("vcd write failed: change_vector");
    }

    fn close(&mut self, timestamp: u64) {
        self.writer.timestamp(timestamp).expect("vcd write failed: timestamp");
        self.writer.flush().expect("vcd write failed: flush");
    }
}
