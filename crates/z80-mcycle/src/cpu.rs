//! Z80 CPU core: controller, sequencer and datapath clocked together.

use emu_core::{ClockPhase, Cpu, Observable, PinBus, Ticks, Value};

use crate::config::Z80Config;
use crate::controller::{BusCycleController, ControllerOutputs, ControllerStatus, CycleRequest};
use crate::datapath::{Datapath, DatapathOutputs, RegisterFile};
use crate::error::ExecError;
use crate::registers::Registers;
use crate::sequencer::{InstructionSequencer, SequencerOutputs, SequencerState};
use crate::signals::{BusControlLines, BusRequestInputs};
use crate::trace::{machine_cycles, CycleSummary, TickRecord, TraceBuffer};

/// One combinational pass over all three parts for a sub-phase.
struct Evaluation {
    status: ControllerStatus,
    sequencer: SequencerOutputs,
    datapath: DatapathOutputs,
    request: CycleRequest,
    controller: ControllerOutputs,
}

/// Z80 CPU.
///
/// The CPU does not own the bus. Each `tick()` drives the pins for the
/// High and Low halves of one T-state through a [`PinBus`], then clocks
/// every register at the rising edge that ends the tick.
pub struct Z80<D: Datapath = RegisterFile> {
    // === Machines ===
    controller: BusCycleController,
    sequencer: InstructionSequencer,
    datapath: D,

    // === Timing ===
    /// Total T-states elapsed.
    total_ticks: Ticks,
    /// Data bus as seen in the last Low sub-phase.
    data_in: u8,

    // === Observation ===
    config: Z80Config,
    trace: TraceBuffer,
    /// Sub-phases whose lines broke a bus invariant.
    violations: u64,
}

impl Z80 {
    /// Create a new Z80 with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(Z80Config::default())
    }

    #[must_use]
    pub fn with_config(config: Z80Config) -> Self {
        Self::with_datapath(RegisterFile::new(), config)
    }

    /// Create a Z80 with preset register contents.
    #[cfg(feature = "test-utils")]
    #[must_use]
    pub fn from_registers(regs: &Registers) -> Self {
        Self::with_datapath(RegisterFile::from_registers(regs), Z80Config::default())
    }
}

impl Default for Z80 {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Datapath> Z80<D> {
    /// Create a Z80 driving a caller-supplied datapath.
    #[must_use]
    pub fn with_datapath(datapath: D, config: Z80Config) -> Self {
        Self {
            controller: BusCycleController::new(),
            sequencer: InstructionSequencer::new(),
            datapath,
            total_ticks: Ticks::ZERO,
            data_in: 0xFF,
            trace: TraceBuffer::new(config.trace_depth),
            config,
            violations: 0,
        }
    }

    /// Total T-states elapsed since creation.
    #[must_use]
    pub const fn total_ticks(&self) -> Ticks {
        self.total_ticks
    }

    #[must_use]
    pub const fn controller(&self) -> &BusCycleController {
        &self.controller
    }

    #[must_use]
    pub const fn sequencer(&self) -> &InstructionSequencer {
        &self.sequencer
    }

    #[must_use]
    pub const fn datapath(&self) -> &D {
        &self.datapath
    }

    #[must_use]
    pub const fn config(&self) -> &Z80Config {
        &self.config
    }

    #[must_use]
    pub const fn trace(&self) -> &TraceBuffer {
        &self.trace
    }

    /// Machine cycles completed within the trace window.
    #[must_use]
    pub fn machine_cycles(&self) -> Vec<CycleSummary> {
        machine_cycles(&self.trace.to_vec())
    }

    /// Sub-phases so far whose lines failed [`BusControlLines::check_invariants`].
    /// Always zero unless `check_invariants` is configured.
    #[must_use]
    pub const fn invariant_violations(&self) -> u64 {
        self.violations
    }

    /// Fails once the sequencer has trapped on an undefined opcode.
    pub fn check(&self) -> Result<(), ExecError> {
        match self.sequencer.trapped_opcode() {
            Some(opcode) => Err(ExecError::UndefinedOpcode {
                opcode,
                pc: self.datapath.registers().pc.wrapping_sub(1),
            }),
            None => Ok(()),
        }
    }

    /// Tick until HALT, a trap, or `limit` ticks.
    ///
    /// Returns the number of ticks run. A stall on WAIT or BUSREQ is not an
    /// error in itself; it shows up here as [`ExecError::TickLimit`].
    pub fn run_until_idle<B: PinBus<BusControlLines, BusRequestInputs>>(
        &mut self,
        bus: &mut B,
        limit: u64,
    ) -> Result<u64, ExecError> {
        for ran in 0..limit {
            if self.sequencer.state().is_stopped() {
                self.check()?;
                return Ok(ran);
            }
            self.tick(bus);
        }
        if self.sequencer.state().is_stopped() {
            self.check()?;
            return Ok(limit);
        }
        Err(ExecError::TickLimit { ticks: limit })
    }

    fn evaluate(&self, phase: ClockPhase, data_in: u8) -> Evaluation {
        let status = self.controller.status(data_in);
        let sequencer = self.sequencer.evaluate(&status);
        let datapath = self.datapath.resolve(&sequencer.controls, status.read_data);
        let request = CycleRequest {
            kind: sequencer.request,
            extend: sequencer.extend,
            address: datapath.address,
            data: datapath.data,
            refresh_address: self.datapath.refresh_address(),
        };
        let controller = self.controller.evaluate(phase, &request);
        Evaluation {
            status,
            sequencer,
            datapath,
            request,
            controller,
        }
    }

    fn check_lines(&mut self, lines: &BusControlLines, phase: ClockPhase) {
        let checked = lines.check_invariants();
        if self.config.check_invariants {
            if let Err(violation) = checked {
                self.violations += 1;
                log::error!(
                    "tick {} {phase:?}: {violation} ({:?} {})",
                    self.total_ticks,
                    self.controller.state(),
                    lines.strobe_string()
                );
            }
        }
        debug_assert!(
            checked.is_ok(),
            "line invariant broken at tick {} {phase:?}: {checked:?}",
            self.total_ticks
        );
    }

    fn clock<B: PinBus<BusControlLines, BusRequestInputs>>(&mut self, bus: &mut B) {
        let high = self.evaluate(ClockPhase::High, self.data_in);
        self.check_lines(&high.controller.lines, ClockPhase::High);
        let high_inputs = bus.respond(&high.controller.lines, ClockPhase::High);
        self.controller.falling_edge(&high_inputs);

        let low = self.evaluate(ClockPhase::Low, high_inputs.data_in);
        self.check_lines(&low.controller.lines, ClockPhase::Low);
        let low_inputs = bus.respond(&low.controller.lines, ClockPhase::Low);
        self.data_in = low_inputs.data_in;

        let settled = self.evaluate(ClockPhase::Low, low_inputs.data_in);
        debug_assert_eq!(
            settled.controller.lines, low.controller.lines,
            "lines changed after the device responded"
        );

        self.trace.push(TickRecord {
            tick: self.total_ticks.get(),
            lines: [high.controller.lines, low.controller.lines],
            inputs: [high_inputs, low_inputs],
            bus_state: settled.status.state,
            kind: settled.status.kind,
            t_state: settled.status.t_state,
            act: settled.status.act,
            cycle_done: settled.controller.cycle_done,
            bus_requested: self.controller.bus_requested(),
            seq_state: self.sequencer.state(),
        });

        match (high_inputs.reset, low_inputs.reset) {
            (true, true) => {
                log::debug!("reset at tick {}", self.total_ticks);
                self.reset();
            }
            (true, false) | (false, true) => {
                log::warn!("reset held for half a tick at {}, ignored", self.total_ticks);
                self.commit(&settled, &low_inputs);
            }
            (false, false) => self.commit(&settled, &low_inputs),
        }
        self.total_ticks = self.total_ticks.next();
    }

    fn commit(&mut self, eval: &Evaluation, inputs: &BusRequestInputs) {
        self.controller.rising_edge(&eval.controller, &eval.request, inputs);
        self.sequencer.commit(&eval.sequencer);
        self.datapath.commit(&eval.sequencer.controls, &eval.datapath);
    }
}

impl<D: Datapath> Cpu for Z80<D> {
    type Registers = Registers;
    type Outputs = BusControlLines;
    type Inputs = BusRequestInputs;

    fn tick<B: PinBus<BusControlLines, BusRequestInputs>>(&mut self, bus: &mut B) {
        self.clock(bus);
    }

    fn pc(&self) -> u32 {
        u32::from(self.datapath.registers().pc)
    }

    fn registers(&self) -> Registers {
        self.datapath.registers()
    }

    fn is_halted(&self) -> bool {
        self.sequencer.state() == SequencerState::Halt
    }

    /// Return all three parts to their reset state. The tick count and
    /// trace survive.
    fn reset(&mut self) {
        self.controller.reset();
        self.sequencer.reset();
        self.datapath.reset();
        self.data_in = 0xFF;
    }
}

/// All query paths supported by the Z80.
const Z80_QUERY_PATHS: &[&str] = &[
    // Main registers
    "a", "f", "b", "c", "d", "e", "h", "l",
    // Register pairs
    "bc", "de", "hl",
    // Index registers
    "ix", "iy",
    // Other registers
    "sp", "pc", "i", "r",
    // Internal registers
    "wz", "tmp",
    // Bus-cycle controller
    "bus.kind", "bus.t_state", "bus.state", "bus.wait_ticks",
    // Sequencer
    "seq.state", "seq.sub_step", "opcode", "index_mode", "register_bank",
    // CPU state
    "halted", "ticks",
];

impl<D: Datapath> Observable for Z80<D> {
    fn query(&self, path: &str) -> Option<Value> {
        let regs = self.datapath.registers();
        match path {
            // Main registers
            "a" => Some(regs.a.into()),
            "f" => Some(regs.f.into()),
            "b" => Some(regs.b.into()),
            "c" => Some(regs.c.into()),
            "d" => Some(regs.d.into()),
            "e" => Some(regs.e.into()),
            "h" => Some(regs.h.into()),
            "l" => Some(regs.l.into()),

            // Register pairs
            "bc" => Some(regs.bc().into()),
            "de" => Some(regs.de().into()),
            "hl" => Some(regs.hl().into()),

            // Index registers
            "ix" => Some(regs.ix.into()),
            "iy" => Some(regs.iy.into()),

            // Other registers
            "sp" => Some(regs.sp.into()),
            "pc" => Some(regs.pc.into()),
            "i" => Some(regs.i.into()),
            "r" => Some(regs.r.into()),

            // Internal registers
            "wz" => Some(regs.wz().into()),
            "tmp" => Some(regs.tmp.into()),

            // Bus-cycle controller
            "bus.kind" => Some(self.controller.state().kind().to_string().into()),
            "bus.t_state" => Some(self.controller.t_state().get().into()),
            "bus.state" => Some(format!("{:?}", self.controller.state()).into()),
            "bus.wait_ticks" => Some(u64::from(self.controller.wait_ticks()).into()),

            // Sequencer
            "seq.state" => Some(format!("{:?}", self.sequencer.state()).into()),
            "seq.sub_step" => Some(self.sequencer.sub_step().into()),
            "opcode" => Some(self.sequencer.opcode().into()),
            "index_mode" => Some(format!("{:?}", self.sequencer.index_mode()).into()),
            "register_bank" => Some(format!("{:?}", self.sequencer.register_bank()).into()),

            // CPU state
            "halted" => Some(self.is_halted().into()),
            "ticks" => Some(self.total_ticks.get().into()),

            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        Z80_QUERY_PATHS
    }
}
