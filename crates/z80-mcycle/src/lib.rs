//! T-state accurate Z80 bus protocol.
//!
//! Two cooperating state machines advance together once per T-state:
//!
//! - the [`BusCycleController`] owns the external pins. It sequences each
//!   machine cycle (opcode fetch, memory and I/O transfers, internal cycles,
//!   bus release), samples WAIT and the data bus on the falling edge and
//!   BUSREQ on the rising edge;
//! - the [`InstructionSequencer`] decodes opcodes and, for every tick,
//!   names the registers the [`Datapath`] should read and write and the
//!   machine cycle it wants next.
//!
//! [`Z80`] wires them to a register file and exposes them through
//! [`emu_core::Cpu`] and [`emu_core::Observable`]. Each call to `tick()`
//! advances exactly one T-state.

mod bus;
mod config;
mod controller;
mod controls;
mod cpu;
mod datapath;
mod error;
mod latch;
mod registers;
mod sequencer;
mod signals;
mod trace;

pub use bus::{BusWrite, SimpleBus};
pub use config::{Z80Config, MAX_TRACE_DEPTH};
pub use controller::{BusCycleController, BusState, ControllerOutputs, ControllerStatus, CycleRequest};
pub use controls::{
    AluFunction, IncDecAction, IndexMode, Register8, Register16, RegisterBank, SequencerControls,
};
pub use cpu::Z80;
pub use datapath::{AddressAlu, Datapath, DatapathOutputs, RegisterFile};
pub use error::{ConfigError, ExecError, InvariantViolation};
pub use latch::TransparentLatch;
pub use registers::Registers;
pub use sequencer::{InstructionSequencer, SequencerOutputs, SequencerState};
pub use signals::{BusControlLines, BusRequestInputs, MachineCycleKind, TState};
pub use trace::{machine_cycles, CycleSummary, TickRecord, TraceBuffer};
