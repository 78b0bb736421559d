//! Instruction sequencer.
//!
//! Steps through each instruction one T-state at a time, in lockstep with
//! the bus-cycle controller. Every tick it publishes a fresh
//! [`SequencerControls`] record, the machine cycle it wants next, and
//! whether the current cycle should be stretched by one T-state.
//!
//! The sequencer only advances on ticks where the controller reports
//! `act`. On any other tick it keeps driving the read side of its current
//! state and commits nothing.

mod decode;

use serde::{Deserialize, Serialize};

use crate::controller::ControllerStatus;
use crate::controls::{
    AluFunction, IncDecAction, IndexMode, Register8, Register16, RegisterBank, SequencerControls,
};
use crate::latch::TransparentLatch;
use crate::signals::MachineCycleKind;

/// Named sequencer states. Decoding happens inside the last T-state of
/// each machine cycle rather than in a state of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SequencerState {
    Reset,
    FetchT1,
    /// The controller may stall here for wait states.
    FetchT2,
    FetchT3,
    FetchT4,
    OperandT1,
    OperandT2,
    OperandT3,
    MemReadT1,
    MemReadT2,
    MemReadT3,
    MemWriteT1,
    MemWriteT2,
    MemWriteT3,
    /// First T-state of an internal cycle.
    Internal,
    /// An extra T-state appended to the previous cycle.
    Extended,
    /// Terminal until reset.
    Halt,
    /// Undefined opcode. Terminal until reset.
    Trap,
}

impl SequencerState {
    /// True for the sink states that request no further cycles.
    #[must_use]
    pub const fn is_stopped(self) -> bool {
        matches!(self, Self::Halt | Self::Trap)
    }
}

/// Everything the sequencer latches at the rising edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SequencerRegs {
    state: SequencerState,
    sub_step: u8,
    opcode: TransparentLatch<u8>,
    index: IndexMode,
    bank: RegisterBank,
    /// Address pair for a pending MemRead/MemWrite.
    mem_address: Register16,
    /// Destination of a MemRead, source of a MemWrite.
    mem_register: Register8,
    /// Controls to present during the next extension T-state.
    shadow: Option<SequencerControls>,
    trapped: Option<u8>,
}

impl SequencerRegs {
    const fn new() -> Self {
        Self {
            state: SequencerState::Reset,
            sub_step: 0,
            opcode: TransparentLatch::new(0),
            index: IndexMode::None,
            bank: RegisterBank::Primary,
            mem_address: Register16::None,
            mem_register: Register8::None,
            shadow: None,
            trapped: None,
        }
    }
}

/// One tick's worth of sequencer output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencerOutputs {
    pub controls: SequencerControls,
    /// Cycle to run once the controller finishes the current one.
    pub request: MachineCycleKind,
    /// Stretch the current cycle by one T-state.
    pub extend: bool,
    next: SequencerRegs,
}

impl SequencerOutputs {
    /// State after the coming rising edge.
    #[must_use]
    pub const fn next_state(&self) -> SequencerState {
        self.next.state
    }
}

/// Builder for one evaluation. Starts from defaults and the current
/// registered state; handlers override only what their step needs.
struct Step {
    controls: SequencerControls,
    request: MachineCycleKind,
    extend: bool,
    next: SequencerRegs,
    latch_enable: bool,
}

impl Step {
    fn new(regs: &SequencerRegs) -> Self {
        Self {
            controls: SequencerControls::new(regs.index, regs.bank),
            request: MachineCycleKind::None,
            extend: false,
            next: *regs,
            latch_enable: regs.opcode.is_enabled(),
        }
    }

    /// A default record for a future tick of this instruction.
    fn blank(&self) -> SequencerControls {
        SequencerControls::new(self.next.index, self.next.bank)
    }

    fn index(&self) -> IndexMode {
        self.next.index
    }

    fn goto(&mut self, state: SequencerState) {
        self.next.state = state;
    }

    /// Begin a new instruction: clears index mode and the step counter.
    fn fetch_instruction(&mut self) {
        self.fetch_opcode();
        self.next.index = IndexMode::None;
        self.next.sub_step = 0;
    }

    /// Fetch another opcode byte for the current instruction.
    fn fetch_opcode(&mut self) {
        self.request = MachineCycleKind::OpcodeFetch;
        self.latch_enable = true;
        self.goto(SequencerState::FetchT1);
    }

    /// Read the byte at PC.
    fn read_operand(&mut self) {
        self.request = MachineCycleKind::MemRead;
        self.goto(SequencerState::OperandT1);
    }

    fn read_memory(&mut self, address: Register16, dest: Register8) {
        self.request = MachineCycleKind::MemRead;
        self.next.mem_address = address;
        self.next.mem_register = dest;
        self.goto(SequencerState::MemReadT1);
    }

    fn write_memory(&mut self, address: Register16, source: Register8) {
        self.request = MachineCycleKind::MemWrite;
        self.next.mem_address = address;
        self.next.mem_register = source;
        self.goto(SequencerState::MemWriteT1);
    }

    fn internal(&mut self) {
        self.request = MachineCycleKind::Internal;
        self.goto(SequencerState::Internal);
    }

    /// Stretch the current cycle, presenting `shadow` in the extra T-state.
    fn extend(&mut self, shadow: SequencerControls) {
        self.extend = true;
        self.next.shadow = Some(shadow);
        self.goto(SequencerState::Extended);
    }

    /// Write the byte the controller is presenting into `dest`.
    fn capture_read_data(&mut self, dest: Register8) {
        self.controls.read_reg8 = Register8::ControllerReadData;
        self.controls.write_reg8 = dest;
    }

    fn halt(&mut self) {
        self.goto(SequencerState::Halt);
    }

    fn trap(&mut self, opcode: u8) {
        self.next.trapped = Some(opcode);
        self.goto(SequencerState::Trap);
    }

    fn finish(self, regs: &SequencerRegs, read_data: u8) -> SequencerOutputs {
        let mut next = self.next;
        next.opcode = regs.opcode.clocked(read_data, self.latch_enable);
        SequencerOutputs {
            controls: self.controls,
            request: self.request,
            extend: self.extend,
            next,
        }
    }
}

/// The instruction sequencer.
#[derive(Debug, Clone)]
pub struct InstructionSequencer {
    regs: SequencerRegs,
}

impl Default for InstructionSequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl InstructionSequencer {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            regs: SequencerRegs::new(),
        }
    }

    pub fn reset(&mut self) {
        self.regs = SequencerRegs::new();
    }

    #[must_use]
    pub const fn state(&self) -> SequencerState {
        self.regs.state
    }

    #[must_use]
    pub const fn sub_step(&self) -> u8 {
        self.regs.sub_step
    }

    /// The opcode byte held for decoding.
    #[must_use]
    pub const fn opcode(&self) -> u8 {
        self.regs.opcode.held()
    }

    #[must_use]
    pub const fn index_mode(&self) -> IndexMode {
        self.regs.index
    }

    #[must_use]
    pub const fn register_bank(&self) -> RegisterBank {
        self.regs.bank
    }

    /// The undefined opcode that stopped execution, if any.
    #[must_use]
    pub const fn trapped_opcode(&self) -> Option<u8> {
        self.regs.trapped
    }

    /// Work out this tick's controls and request. No side effects.
    #[must_use]
    pub fn evaluate(&self, status: &ControllerStatus) -> SequencerOutputs {
        let regs = &self.regs;
        let mut step = Step::new(regs);

        match regs.state {
            SequencerState::Reset => {
                step.next.bank = RegisterBank::Primary;
                step.fetch_instruction();
                return step.finish(regs, status.read_data);
            }
            SequencerState::FetchT1 => {
                step.controls.read_reg16 = Register16::PC;
                step.goto(SequencerState::FetchT2);
            }
            SequencerState::FetchT2 => {
                step.controls.read_reg16 = Register16::PC;
                step.controls.write_reg16 = Register16::PC;
                step.controls.inc_dec = IncDecAction::Increment;
                step.controls.increment_refresh = true;
                step.latch_enable = false;
                step.goto(SequencerState::FetchT3);
            }
            SequencerState::FetchT3 => step.goto(SequencerState::FetchT4),
            SequencerState::FetchT4 => decode::execute(&mut step, regs),

            SequencerState::OperandT1 => {
                step.controls.read_reg16 = Register16::PC;
                step.goto(SequencerState::OperandT2);
            }
            SequencerState::OperandT2 => {
                step.controls.read_reg16 = Register16::PC;
                step.goto(SequencerState::OperandT3);
            }
            SequencerState::OperandT3 => {
                step.controls.read_reg16 = Register16::PC;
                step.controls.write_reg16 = Register16::PC;
                step.controls.inc_dec = IncDecAction::Increment;
                decode::execute(&mut step, regs);
            }

            SequencerState::MemReadT1 | SequencerState::MemReadT2 | SequencerState::MemReadT3 => {
                step.controls.read_reg16 = regs.mem_address;
                match regs.state {
                    SequencerState::MemReadT1 => step.goto(SequencerState::MemReadT2),
                    SequencerState::MemReadT2 => step.goto(SequencerState::MemReadT3),
                    _ => decode::execute(&mut step, regs),
                }
            }
            SequencerState::MemWriteT1 | SequencerState::MemWriteT2 | SequencerState::MemWriteT3 => {
                step.controls.read_reg16 = regs.mem_address;
                step.controls.read_reg8 = regs.mem_register;
                match regs.state {
                    SequencerState::MemWriteT1 => step.goto(SequencerState::MemWriteT2),
                    SequencerState::MemWriteT2 => step.goto(SequencerState::MemWriteT3),
                    _ => decode::execute(&mut step, regs),
                }
            }

            SequencerState::Internal => decode::execute(&mut step, regs),
            SequencerState::Extended => {
                let blank = step.blank();
                step.controls = regs.shadow.unwrap_or(blank);
                step.next.shadow = None;
                decode::execute(&mut step, regs);
            }

            SequencerState::Halt | SequencerState::Trap => {}
        }

        if !status.act {
            return SequencerOutputs {
                controls: step.controls.read_only(),
                request: MachineCycleKind::None,
                extend: false,
                next: *regs,
            };
        }
        step.finish(regs, status.read_data)
    }

    /// Rising edge: take on the state computed by [`Self::evaluate`].
    pub fn commit(&mut self, outputs: &SequencerOutputs) {
        let next = outputs.next;
        if next.state != self.regs.state {
            match next.state {
                SequencerState::FetchT3 => log::debug!("decode {:#04X} ({:?})", next.opcode.held(), next.index),
                SequencerState::Halt => log::debug!("halted"),
                SequencerState::Trap => {
                    log::error!("undefined opcode {:#04X}, sequencer trapped", next.opcode.held());
                }
                _ => log::trace!("{:?} -> {:?}", self.regs.state, next.state),
            }
        }
        self.regs = next;
    }
}

/// Address-ALU add of one byte of the base pair into an internal register.
fn address_add(blank: SequencerControls, function: AluFunction, dest: Register8) -> SequencerControls {
    SequencerControls {
        read_reg16: Register16::HL,
        read_reg8: Register8::AddrAluResult,
        write_reg8: dest,
        alu_function: function,
        ..blank
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::BusState;
    use crate::signals::TState;

    fn status(act: bool, read_data: u8) -> ControllerStatus {
        ControllerStatus {
            state: BusState::Idle,
            kind: MachineCycleKind::None,
            t_state: TState::T1,
            act,
            read_data,
        }
    }

    /// Advance with `act` set, feeding `byte` as the read data.
    fn step(seq: &mut InstructionSequencer, byte: u8) -> SequencerOutputs {
        let out = seq.evaluate(&status(true, byte));
        seq.commit(&out);
        out
    }

    /// Run an opcode fetch of `opcode` from Reset or a fetch boundary and
    /// return the outputs of the decode tick.
    fn fetch(seq: &mut InstructionSequencer, opcode: u8) -> SequencerOutputs {
        assert_eq!(seq.state(), SequencerState::FetchT1);
        step(seq, 0xFF);
        step(seq, opcode);
        step(seq, 0xFF);
        step(seq, 0xFF)
    }

    fn started() -> InstructionSequencer {
        let mut seq = InstructionSequencer::new();
        let out = step(&mut seq, 0);
        assert_eq!(out.request, MachineCycleKind::OpcodeFetch);
        seq
    }

    #[test]
    fn reset_advances_without_act() {
        let mut seq = InstructionSequencer::new();
        let out = seq.evaluate(&status(false, 0));
        seq.commit(&out);
        assert_eq!(seq.state(), SequencerState::FetchT1);
    }

    #[test]
    fn holds_without_act() {
        let mut seq = started();
        step(&mut seq, 0);
        assert_eq!(seq.state(), SequencerState::FetchT2);
        let out = seq.evaluate(&status(false, 0x00));
        assert!(!out.controls.has_effects());
        assert_eq!(out.controls.read_reg16, Register16::PC);
        seq.commit(&out);
        assert_eq!(seq.state(), SequencerState::FetchT2);
    }

    #[test]
    fn opcode_latch_freezes_at_t2() {
        let mut seq = started();
        step(&mut seq, 0x11);
        let out = step(&mut seq, 0x0E);
        assert!(out.controls.increment_refresh);
        assert_eq!(out.controls.inc_dec, IncDecAction::Increment);
        step(&mut seq, 0x22);
        assert_eq!(seq.opcode(), 0x0E);
    }

    #[test]
    fn nop_restarts_fetch() {
        let mut seq = started();
        let out = fetch(&mut seq, 0x00);
        assert_eq!(out.request, MachineCycleKind::OpcodeFetch);
        assert_eq!(seq.state(), SequencerState::FetchT1);
        assert_eq!(seq.sub_step(), 0);
    }

    #[test]
    fn prefix_latches_index_and_keeps_sub_step() {
        let mut seq = started();
        fetch(&mut seq, 0xDD);
        assert_eq!(seq.index_mode(), IndexMode::X);
        assert_eq!(seq.sub_step(), 0);
        fetch(&mut seq, 0xFD);
        assert_eq!(seq.index_mode(), IndexMode::Y);
        fetch(&mut seq, 0x00);
        assert_eq!(seq.index_mode(), IndexMode::None);
    }

    #[test]
    fn register_move_is_single_tick() {
        let mut seq = started();
        let out = fetch(&mut seq, 0x41); // LD B,C
        assert_eq!(out.controls.read_reg8, Register8::C);
        assert_eq!(out.controls.write_reg8, Register8::B);
        assert_eq!(out.request, MachineCycleKind::OpcodeFetch);
    }

    #[test]
    fn indexed_move_uses_index_halves() {
        let mut seq = started();
        fetch(&mut seq, 0xDD);
        let out = fetch(&mut seq, 0x44); // LD B,IXH
        assert_eq!(out.controls.read_reg8, Register8::IXH);
        assert_eq!(out.controls.write_reg8, Register8::B);
    }

    #[test]
    fn immediate_load_captures_operand() {
        let mut seq = started();
        let out = fetch(&mut seq, 0x0E); // LD C,n
        assert_eq!(out.request, MachineCycleKind::MemRead);
        assert_eq!(seq.state(), SequencerState::OperandT1);
        step(&mut seq, 0xFF);
        step(&mut seq, 0xFF);
        let out = step(&mut seq, 0xAB);
        assert_eq!(out.controls.read_reg8, Register8::ControllerReadData);
        assert_eq!(out.controls.write_reg8, Register8::C);
        assert_eq!(out.controls.write_reg16, Register16::PC);
        assert_eq!(out.request, MachineCycleKind::OpcodeFetch);
    }

    #[test]
    fn halt_is_terminal() {
        let mut seq = started();
        let out = fetch(&mut seq, 0x76);
        assert_eq!(out.request, MachineCycleKind::None);
        assert_eq!(seq.state(), SequencerState::Halt);
        for _ in 0..4 {
            let out = step(&mut seq, 0);
            assert_eq!(out.request, MachineCycleKind::None);
        }
        assert_eq!(seq.state(), SequencerState::Halt);
    }

    #[test]
    fn undefined_opcode_traps() {
        let mut seq = started();
        fetch(&mut seq, 0xC3);
        assert_eq!(seq.state(), SequencerState::Trap);
        assert_eq!(seq.trapped_opcode(), Some(0xC3));
    }

    #[test]
    fn indexed_immediate_store_extends_twice() {
        let mut seq = started();
        fetch(&mut seq, 0xFD);
        fetch(&mut seq, 0x36);
        // Displacement.
        step(&mut seq, 0xFF);
        step(&mut seq, 0xFF);
        let out = step(&mut seq, 0x10);
        assert_eq!(out.controls.alu_function, AluFunction::LoadOffset);
        assert_eq!(out.request, MachineCycleKind::MemRead);
        // Immediate.
        step(&mut seq, 0xFF);
        step(&mut seq, 0xFF);
        let out = step(&mut seq, 0x99);
        assert!(out.extend);
        assert_eq!(out.controls.write_reg8, Register8::Tmp);
        assert_eq!(seq.state(), SequencerState::Extended);

        let out = step(&mut seq, 0xFF);
        assert!(out.extend);
        assert_eq!(out.controls.alu_function, AluFunction::AddLow);
        assert_eq!(out.controls.write_reg8, Register8::Z);
        assert!(out.controls.use_index_y);

        let out = step(&mut seq, 0xFF);
        assert!(!out.extend);
        assert_eq!(out.controls.alu_function, AluFunction::AddHigh);
        assert_eq!(out.controls.write_reg8, Register8::W);
        assert_eq!(out.request, MachineCycleKind::MemWrite);
        assert_eq!(seq.state(), SequencerState::MemWriteT1);

        let out = step(&mut seq, 0xFF);
        assert_eq!(out.controls.read_reg16, Register16::WZ);
        assert_eq!(out.controls.read_reg8, Register8::Tmp);
    }
}
