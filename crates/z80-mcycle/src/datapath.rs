//! Register file, increment/decrement unit and address ALU.
//!
//! The sequencer never touches register storage directly. It names
//! registers through [`SequencerControls`] and the datapath does the rest:
//! reads are combinational within the tick, writes land at the rising edge.

#![allow(clippy::cast_possible_truncation)] // Intentional truncation for low byte extraction.

use crate::controls::{AluFunction, IndexMode, Register8, Register16, RegisterBank, SequencerControls};
use crate::registers::Registers;

/// Everything the datapath drives during one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DatapathOutputs {
    /// Address-side value, `0xFFFF` when nothing is selected.
    pub address: u16,
    /// Shared 8-bit data path, `0xFF` when nothing is selected.
    pub data: u8,
    /// Increment/decrement unit output, fed from `address`.
    pub inc_dec: u16,
    /// Address ALU sum for this tick.
    pub alu_result: u8,
    /// Carry out of `alu_result`.
    pub alu_carry: bool,
}

/// The register/ALU side of the CPU as seen through the control bus.
pub trait Datapath {
    /// Drive this tick's values. Must not change any state.
    ///
    /// `read_data` is what the bus-cycle controller is presenting, used
    /// when the data path selects [`Register8::ControllerReadData`].
    fn resolve(&self, controls: &SequencerControls, read_data: u8) -> DatapathOutputs;

    /// Capture the selected writes at the rising edge.
    fn commit(&mut self, controls: &SequencerControls, outputs: &DatapathOutputs);

    /// Address driven during the refresh half of an opcode fetch.
    fn refresh_address(&self) -> u16;

    /// Snapshot of every register.
    fn registers(&self) -> Registers;

    /// Clear all storage.
    fn reset(&mut self);
}

/// Displacement adder used for `(IX+d)` and `(IY+d)` addressing.
///
/// The effective address is built one byte at a time: the displacement is
/// added to the low byte of the base, then its sign extension and the carry
/// are added to the high byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AddressAlu {
    offset: u8,
    carry: bool,
}

impl AddressAlu {
    fn sum(self, input: u8) -> (u8, bool) {
        let total = u16::from(self.offset) + u16::from(input) + u16::from(self.carry);
        (total as u8, total > 0xFF)
    }

    /// Combinational result for the given command and address-side value.
    #[must_use]
    pub fn output(self, function: AluFunction, address: u16) -> (u8, bool) {
        match function {
            AluFunction::AddLow => self.sum(address as u8),
            AluFunction::AddHigh => self.sum((address >> 8) as u8),
            AluFunction::Idle | AluFunction::LoadOffset => (self.offset, self.carry),
        }
    }

    /// State after the rising edge.
    #[must_use]
    pub fn clocked(self, function: AluFunction, data: u8, carry_out: bool) -> Self {
        match function {
            AluFunction::Idle => self,
            AluFunction::LoadOffset => Self {
                offset: data,
                carry: false,
            },
            AluFunction::AddLow | AluFunction::AddHigh => Self {
                offset: if self.offset & 0x80 != 0 { 0xFF } else { 0x00 },
                carry: carry_out,
            },
        }
    }
}

/// Reference register file with dual banks.
///
/// Banked registers are two-entry arrays indexed by
/// [`RegisterBank::index`]. IX, IY, SP, PC, I, R and TMP are not banked.
#[derive(Debug, Clone, Default)]
pub struct RegisterFile {
    a: [u8; 2],
    f: [u8; 2],
    b: [u8; 2],
    c: [u8; 2],
    d: [u8; 2],
    e: [u8; 2],
    h: [u8; 2],
    l: [u8; 2],
    w: [u8; 2],
    z: [u8; 2],
    ix: u16,
    iy: u16,
    sp: u16,
    pc: u16,
    i: u8,
    r: u8,
    tmp: u8,
    alu: AddressAlu,
}

fn index_of(controls: &SequencerControls) -> IndexMode {
    if controls.use_index_x {
        IndexMode::X
    } else if controls.use_index_y {
        IndexMode::Y
    } else {
        IndexMode::None
    }
}

impl RegisterFile {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register file preloaded from a snapshot.
    #[must_use]
    pub fn from_registers(regs: &Registers) -> Self {
        Self {
            a: [regs.a, regs.a_alt],
            f: [regs.f, regs.f_alt],
            b: [regs.b, regs.b_alt],
            c: [regs.c, regs.c_alt],
            d: [regs.d, regs.d_alt],
            e: [regs.e, regs.e_alt],
            h: [regs.h, regs.h_alt],
            l: [regs.l, regs.l_alt],
            w: [regs.w, regs.w_alt],
            z: [regs.z, regs.z_alt],
            ix: regs.ix,
            iy: regs.iy,
            sp: regs.sp,
            pc: regs.pc,
            i: regs.i,
            r: regs.r,
            tmp: regs.tmp,
            alu: AddressAlu::default(),
        }
    }

    fn read8(&self, reg: Register8, bank: RegisterBank) -> Option<u8> {
        let n = bank.index();
        let value = match reg {
            Register8::I => self.i,
            Register8::R => self.r,
            Register8::W => self.w[n],
            Register8::Z => self.z[n],
            Register8::B => self.b[n],
            Register8::C => self.c[n],
            Register8::D => self.d[n],
            Register8::E => self.e[n],
            Register8::H => self.h[n],
            Register8::L => self.l[n],
            Register8::A => self.a[n],
            Register8::F => self.f[n],
            Register8::IXH => (self.ix >> 8) as u8,
            Register8::IXL => self.ix as u8,
            Register8::IYH => (self.iy >> 8) as u8,
            Register8::IYL => self.iy as u8,
            Register8::Tmp => self.tmp,
            Register8::None | Register8::AddrAluResult | Register8::ControllerReadData => {
                return None;
            }
        };
        Some(value)
    }

    fn write8(&mut self, reg: Register8, bank: RegisterBank, value: u8) {
        debug_assert!(
            !matches!(reg, Register8::AddrAluResult | Register8::ControllerReadData),
            "{reg:?} is read-only"
        );
        let n = bank.index();
        match reg {
            Register8::I => self.i = value,
            Register8::R => self.r = value,
            Register8::W => self.w[n] = value,
            Register8::Z => self.z[n] = value,
            Register8::B => self.b[n] = value,
            Register8::C => self.c[n] = value,
            Register8::D => self.d[n] = value,
            Register8::E => self.e[n] = value,
            Register8::H => self.h[n] = value,
            Register8::L => self.l[n] = value,
            Register8::A => self.a[n] = value,
            Register8::F => self.f[n] = value,
            Register8::IXH => self.ix = (self.ix & 0x00FF) | u16::from(value) << 8,
            Register8::IXL => self.ix = (self.ix & 0xFF00) | u16::from(value),
            Register8::IYH => self.iy = (self.iy & 0x00FF) | u16::from(value) << 8,
            Register8::IYL => self.iy = (self.iy & 0xFF00) | u16::from(value),
            Register8::Tmp => self.tmp = value,
            Register8::None | Register8::AddrAluResult | Register8::ControllerReadData => {}
        }
    }

    fn read16(&self, pair: Register16, controls: &SequencerControls) -> u16 {
        let n = controls.register_bank.index();
        let join = |hi: u8, lo: u8| u16::from(hi) << 8 | u16::from(lo);
        match (pair, index_of(controls)) {
            (Register16::None, _) => 0xFFFF,
            (Register16::WZ, _) => join(self.w[n], self.z[n]),
            (Register16::BC, _) => join(self.b[n], self.c[n]),
            (Register16::DE, _) => join(self.d[n], self.e[n]),
            (Register16::HL, IndexMode::None) => join(self.h[n], self.l[n]),
            (Register16::HL, IndexMode::X) => self.ix,
            (Register16::HL, IndexMode::Y) => self.iy,
            (Register16::SP, _) => self.sp,
            (Register16::PC, _) => self.pc,
        }
    }

    fn write16(&mut self, pair: Register16, controls: &SequencerControls, value: u16) {
        let n = controls.register_bank.index();
        let (hi, lo) = ((value >> 8) as u8, value as u8);
        match (pair, index_of(controls)) {
            (Register16::None, _) => {}
            (Register16::WZ, _) => (self.w[n], self.z[n]) = (hi, lo),
            (Register16::BC, _) => (self.b[n], self.c[n]) = (hi, lo),
            (Register16::DE, _) => (self.d[n], self.e[n]) = (hi, lo),
            (Register16::HL, IndexMode::None) => (self.h[n], self.l[n]) = (hi, lo),
            (Register16::HL, IndexMode::X) => self.ix = value,
            (Register16::HL, IndexMode::Y) => self.iy = value,
            (Register16::SP, _) => self.sp = value,
            (Register16::PC, _) => self.pc = value,
        }
    }
}

/// True if the 8-bit and 16-bit write selects name overlapping storage.
fn writes_conflict(controls: &SequencerControls) -> bool {
    let reg = controls.write_reg8;
    match (controls.write_reg16, index_of(controls)) {
        (Register16::HL, IndexMode::X) => matches!(reg, Register8::IXH | Register8::IXL),
        (Register16::HL, IndexMode::Y) => matches!(reg, Register8::IYH | Register8::IYL),
        (pair, _) => reg.is_half_of(pair),
    }
}

impl Datapath for RegisterFile {
    fn resolve(&self, controls: &SequencerControls, read_data: u8) -> DatapathOutputs {
        let address = self.read16(controls.read_reg16, controls);
        let (alu_result, alu_carry) = self.alu.output(controls.alu_function, address);
        let data = match controls.read_reg8 {
            Register8::None => 0xFF,
            Register8::AddrAluResult => alu_result,
            Register8::ControllerReadData => read_data,
            reg => self.read8(reg, controls.register_bank).unwrap_or(0xFF),
        };
        DatapathOutputs {
            address,
            data,
            inc_dec: controls.inc_dec.apply(address),
            alu_result,
            alu_carry,
        }
    }

    fn commit(&mut self, controls: &SequencerControls, outputs: &DatapathOutputs) {
        let conflict = writes_conflict(controls);
        debug_assert!(!conflict, "conflicting register writes: {controls:?}");
        if conflict {
            log::warn!(
                "dropping conflicting writes to {:?} and {:?}",
                controls.write_reg8,
                controls.write_reg16
            );
        } else {
            self.write16(controls.write_reg16, controls, outputs.inc_dec);
            self.write8(controls.write_reg8, controls.register_bank, outputs.data);
        }
        self.alu = self
            .alu
            .clocked(controls.alu_function, outputs.data, outputs.alu_carry);
        if controls.increment_refresh {
            self.r = (self.r & 0x80) | (self.r.wrapping_add(1) & 0x7F);
        }
    }

    fn refresh_address(&self) -> u16 {
        u16::from(self.i) << 8 | u16::from(self.r)
    }

    fn registers(&self) -> Registers {
        Registers {
            a: self.a[0],
            f: self.f[0],
            b: self.b[0],
            c: self.c[0],
            d: self.d[0],
            e: self.e[0],
            h: self.h[0],
            l: self.l[0],
            a_alt: self.a[1],
            f_alt: self.f[1],
            b_alt: self.b[1],
            c_alt: self.c[1],
            d_alt: self.d[1],
            e_alt: self.e[1],
            h_alt: self.h[1],
            l_alt: self.l[1],
            ix: self.ix,
            iy: self.iy,
            sp: self.sp,
            pc: self.pc,
            i: self.i,
            r: self.r,
            w: self.w[0],
            z: self.z[0],
            w_alt: self.w[1],
            z_alt: self.z[1],
            tmp: self.tmp,
        }
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}
