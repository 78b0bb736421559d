//! Opcode decode and per-instruction step tables.
//!
//! `execute` runs at the last T-state of each machine cycle (and in every
//! internal or extended T-state). It dispatches on the latched opcode and
//! the instruction's step counter.

use super::{address_add, SequencerRegs, Step};
use crate::controls::{AluFunction, IndexMode, Register8, Register16};

/// Register field value that selects (HL) instead of a register.
const MEMORY_OPERAND: u8 = 6;

pub(super) fn execute(step: &mut Step, regs: &SequencerRegs) {
    let opcode = regs.opcode.held();
    let sub_step = regs.sub_step;

    match opcode {
        0xDD => prefix(step, IndexMode::X),
        0xFD => prefix(step, IndexMode::Y),
        _ => {
            step.next.sub_step = sub_step.wrapping_add(1);
            match opcode {
                0x00 => step.fetch_instruction(),
                0x76 => step.halt(),
                0x40..=0x7F => ld_r_r(step, opcode, sub_step),
                op if op & 0xC7 == 0x06 => ld_r_n(step, opcode, sub_step),
                _ => step.trap(opcode),
            }
        }
    }
}

fn prefix(step: &mut Step, index: IndexMode) {
    step.next.index = index;
    step.fetch_opcode();
}

/// A plain register for a non-memory field. Never substituted: the
/// register half of an (IX+d) form is always the unprefixed one.
fn plain(field: u8) -> Register8 {
    Register8::from_r(field, IndexMode::None).unwrap_or(Register8::None)
}

/// LD r,r' and its (HL)/(IX+d) load and store forms.
fn ld_r_r(step: &mut Step, opcode: u8, sub_step: u8) {
    let dst = (opcode >> 3) & 7;
    let src = opcode & 7;

    if dst == MEMORY_OPERAND {
        store(step, sub_step, plain(src));
    } else if src == MEMORY_OPERAND {
        load(step, sub_step, plain(dst));
    } else {
        let index = step.index();
        step.controls.read_reg8 = Register8::from_r(src, index).unwrap_or(Register8::None);
        step.controls.write_reg8 = Register8::from_r(dst, index).unwrap_or(Register8::None);
        step.fetch_instruction();
    }
}

/// Steps shared by the indexed load and store forms up to the point where
/// WZ holds the effective address: displacement read, then a 5 T-state
/// internal cycle with the two address-ALU adds in its first two T-states.
///
/// Returns true once WZ is ready for the memory cycle.
fn indexed_address(step: &mut Step, sub_step: u8) -> bool {
    match sub_step {
        0 => step.read_operand(),
        1 => {
            step.controls.read_reg8 = Register8::ControllerReadData;
            step.controls.alu_function = AluFunction::LoadOffset;
            step.internal();
        }
        2 => {
            step.controls = address_add(step.controls, AluFunction::AddLow, Register8::Z);
            let shadow = address_add(step.blank(), AluFunction::AddHigh, Register8::W);
            step.extend(shadow);
        }
        3..=5 => step.extend(step.blank()),
        _ => return true,
    }
    false
}

/// LD r,(HL) or LD r,(IX+d).
fn load(step: &mut Step, sub_step: u8, dst: Register8) {
    if step.index() == IndexMode::None {
        match sub_step {
            0 => step.read_memory(Register16::HL, dst),
            _ => {
                step.capture_read_data(dst);
                step.fetch_instruction();
            }
        }
        return;
    }

    match sub_step {
        0..=6 => {
            if indexed_address(step, sub_step) {
                step.read_memory(Register16::WZ, dst);
            }
        }
        _ => {
            step.capture_read_data(dst);
            step.fetch_instruction();
        }
    }
}

/// LD (HL),r or LD (IX+d),r.
fn store(step: &mut Step, sub_step: u8, src: Register8) {
    if step.index() == IndexMode::None {
        match sub_step {
            0 => step.write_memory(Register16::HL, src),
            _ => step.fetch_instruction(),
        }
        return;
    }

    match sub_step {
        0..=6 => {
            if indexed_address(step, sub_step) {
                step.write_memory(Register16::WZ, src);
            }
        }
        _ => step.fetch_instruction(),
    }
}

/// LD r,n and LD (HL),n / LD (IX+d),n.
fn ld_r_n(step: &mut Step, opcode: u8, sub_step: u8) {
    let field = (opcode >> 3) & 7;
    let index = step.index();

    if let Some(dst) = Register8::from_r(field, index) {
        match sub_step {
            0 => step.read_operand(),
            _ => {
                step.capture_read_data(dst);
                step.fetch_instruction();
            }
        }
        return;
    }

    if index == IndexMode::None {
        match sub_step {
            0 => step.read_operand(),
            1 => {
                step.capture_read_data(Register8::Tmp);
                step.write_memory(Register16::HL, Register8::Tmp);
            }
            _ => step.fetch_instruction(),
        }
        return;
    }

    // The displacement and immediate come first, so the address adds ride
    // on two extra T-states of the immediate read.
    match sub_step {
        0 => step.read_operand(),
        1 => {
            step.controls.read_reg8 = Register8::ControllerReadData;
            step.controls.alu_function = AluFunction::LoadOffset;
            step.read_operand();
        }
        2 => {
            step.capture_read_data(Register8::Tmp);
            let shadow = address_add(step.blank(), AluFunction::AddLow, Register8::Z);
            step.extend(shadow);
        }
        3 => {
            let shadow = address_add(step.blank(), AluFunction::AddHigh, Register8::W);
            step.extend(shadow);
        }
        4 => step.write_memory(Register16::WZ, Register8::Tmp),
        _ => step.fetch_instruction(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_never_substitutes() {
        assert_eq!(plain(4), Register8::H);
        assert_eq!(plain(5), Register8::L);
        assert_eq!(plain(MEMORY_OPERAND), Register8::None);
    }
}
