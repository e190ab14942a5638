//! An event-driven delta-cycle simulation kernel for elaborated synchronous
//! hardware designs: signals, memories, a two-phase eval/commit loop, and
//! cooperative scheduling of clock, RTL, and testbench processes.
//!
//! The kernel (`timeline`, `state`, `process`, `kernel`, `trace`) makes no
//! assumption about where a [`design::Design`] comes from or what a
//! [`trace::TraceSink`] does with a change stream; `vcd_sink` and `config`
//! are concrete, swappable collaborators built on top of it.

pub mod clock;
pub mod config;
pub mod design;
pub mod error;
pub mod kernel;
pub mod process;
pub mod state;
pub mod timeline;
pub mod trace;
pub mod vcd_sink;

pub use clock::ClockProcess;
pub use config::HarnessConfig;
pub use design::{Design, MemoryDescriptor, MemoryId, SignalDescriptor, SignalId};
pub use error::SinkError;
pub use kernel::{Engine, ScopedSink, SinkHandle};
pub use process::{ProcessHandle, ProcessId, RtlProcess, TestbenchProcess};
pub use state::{StateStore, Trigger};
pub use timeline::{Deadline, Delay, Instant};
pub use trace::{ChangeRecord, ChangeSet, CountingSink, TraceSink};
pub use vcd_sink::VcdTraceSink;
