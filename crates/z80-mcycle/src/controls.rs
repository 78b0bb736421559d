//! The control-bus contract between the sequencer and the datapath.
//!
//! The sequencer publishes one [`SequencerControls`] record per tick. Every
//! field is a closed selector, so the datapath's muxes are exhaustive
//! matches and there is no implicit default case.

use serde::{Deserialize, Serialize};

/// 8-bit register selector, including pseudo-selectors for values that are
/// not stored in the register file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Register8 {
    /// Nothing selected. On the read side the data path floats to `0xFF`.
    #[default]
    None,
    I,
    R,
    W,
    Z,
    B,
    C,
    D,
    E,
    H,
    L,
    A,
    F,
    IXH,
    IXL,
    IYH,
    IYL,
    /// Temporary holding register, not architecturally visible.
    Tmp,
    /// Read side only: the address ALU's output for this tick.
    AddrAluResult,
    /// Read side only: the byte the bus-cycle controller is presenting.
    ControllerReadData,
}

impl Register8 {
    /// Decode a 3-bit `r` field.
    ///
    /// Returns `None` for field value 6, which names the memory operand
    /// rather than a register. Under an index mode H and L become the
    /// halves of the index register.
    #[must_use]
    pub const fn from_r(field: u8, index: IndexMode) -> Option<Self> {
        let reg = match field & 0x07 {
            0 => Self::B,
            1 => Self::C,
            2 => Self::D,
            3 => Self::E,
            4 => match index {
                IndexMode::None => Self::H,
                IndexMode::X => Self::IXH,
                IndexMode::Y => Self::IYH,
            },
            5 => match index {
                IndexMode::None => Self::L,
                IndexMode::X => Self::IXL,
                IndexMode::Y => Self::IYL,
            },
            6 => return None,
            _ => Self::A,
        };
        Some(reg)
    }

    /// True if this register is one byte of `pair`.
    #[must_use]
    pub const fn is_half_of(self, pair: Register16) -> bool {
        matches!(
            (self, pair),
            (Self::W | Self::Z, Register16::WZ)
                | (Self::B | Self::C, Register16::BC)
                | (Self::D | Self::E, Register16::DE)
                | (Self::H | Self::L, Register16::HL)
        )
    }
}

/// 16-bit register-pair selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Register16 {
    /// Nothing selected. On the read side the address floats to `0xFFFF`.
    #[default]
    None,
    WZ,
    BC,
    DE,
    /// Replaced by IX or IY when an index mode is active.
    HL,
    SP,
    PC,
}

/// What the increment/decrement unit does to the address-side value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IncDecAction {
    /// Pass through unchanged.
    #[default]
    Zero,
    Increment,
    Decrement,
}

impl IncDecAction {
    #[must_use]
    pub const fn apply(self, value: u16) -> u16 {
        match self {
            Self::Zero => value,
            Self::Increment => value.wrapping_add(1),
            Self::Decrement => value.wrapping_sub(1),
        }
    }
}

/// Primary or alternate register set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RegisterBank {
    #[default]
    Primary,
    Alternate,
}

impl RegisterBank {
    /// Index into a two-entry bank array.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Primary => 0,
            Self::Alternate => 1,
        }
    }
}

/// Address ALU command for displacement arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AluFunction {
    #[default]
    Idle,
    /// Take the data-path byte as the displacement and clear the carry.
    LoadOffset,
    /// Add the low byte of the address-side value to the displacement.
    AddLow,
    /// Add the high byte of the address-side value to the sign extension
    /// of the displacement, plus the carry from [`AluFunction::AddLow`].
    AddHigh,
}

/// Which index register, if any, stands in for HL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IndexMode {
    #[default]
    None,
    /// After a `DD` prefix.
    X,
    /// After an `FD` prefix.
    Y,
}

/// Selector record presented to the datapath for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SequencerControls {
    /// Drives the shared 8-bit data path.
    pub read_reg8: Register8,
    /// Captures the data path at the rising edge.
    pub write_reg8: Register8,
    /// Drives the address side and the inc/dec unit's input.
    pub read_reg16: Register16,
    /// Captures the inc/dec unit's output at the rising edge.
    pub write_reg16: Register16,
    pub inc_dec: IncDecAction,
    pub use_index_x: bool,
    pub use_index_y: bool,
    pub register_bank: RegisterBank,
    pub alu_function: AluFunction,
    /// Bump the low seven bits of R at the rising edge.
    pub increment_refresh: bool,
}

impl SequencerControls {
    /// A default record carrying the instruction-wide index mode and bank.
    #[must_use]
    pub fn new(index: IndexMode, register_bank: RegisterBank) -> Self {
        Self {
            use_index_x: index == IndexMode::X,
            use_index_y: index == IndexMode::Y,
            register_bank,
            ..Self::default()
        }
    }

    /// The same record with every registered effect removed.
    ///
    /// Used while the controller stalls: the read side keeps driving the
    /// address and data path but nothing commits.
    #[must_use]
    pub fn read_only(&self) -> Self {
        Self {
            write_reg8: Register8::None,
            write_reg16: Register16::None,
            inc_dec: IncDecAction::Zero,
            alu_function: AluFunction::Idle,
            increment_refresh: false,
            ..*self
        }
    }

    /// True if any field commits state at the next rising edge.
    #[must_use]
    pub fn has_effects(&self) -> bool {
        self.write_reg8 != Register8::None
            || self.write_reg16 != Register16::None
            || self.alu_function != AluFunction::Idle
            || self.increment_refresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn r_field_decodes_with_index_substitution() {
        assert_eq!(Register8::from_r(0, IndexMode::None), Some(Register8::B));
        assert_eq!(Register8::from_r(7, IndexMode::None), Some(Register8::A));
        assert_eq!(Register8::from_r(6, IndexMode::X), None);
        assert_eq!(Register8::from_r(4, IndexMode::X), Some(Register8::IXH));
        assert_eq!(Register8::from_r(5, IndexMode::Y), Some(Register8::IYL));
        assert_eq!(Register8::from_r(4, IndexMode::None), Some(Register8::H));
    }

    #[test]
    fn inc_dec_wraps() {
        assert_eq!(IncDecAction::Increment.apply(0xFFFF), 0x0000);
        assert_eq!(IncDecAction::Decrement.apply(0x0000), 0xFFFF);
        assert_eq!(IncDecAction::Zero.apply(0x1234), 0x1234);
    }

    #[test]
    fn new_record_carries_index_and_bank_only() {
        let controls = SequencerControls::new(IndexMode::Y, RegisterBank::Alternate);
        assert!(controls.use_index_y);
        assert!(!controls.use_index_x);
        assert_eq!(controls.register_bank, RegisterBank::Alternate);
        assert!(!controls.has_effects());
    }

    #[test]
    fn read_only_strips_commits() {
        let controls = SequencerControls {
            read_reg16: Register16::PC,
            write_reg16: Register16::PC,
            inc_dec: IncDecAction::Increment,
            read_reg8: Register8::ControllerReadData,
            write_reg8: Register8::C,
            increment_refresh: true,
            ..SequencerControls::default()
        };
        let held = controls.read_only();
        assert!(!held.has_effects());
        assert_eq!(held.read_reg16, Register16::PC);
        assert_eq!(held.read_reg8, Register8::ControllerReadData);
    }

    #[test]
    fn pair_halves() {
        assert!(Register8::W.is_half_of(Register16::WZ));
        assert!(!Register8::A.is_half_of(Register16::HL));
        assert!(!Register8::IXH.is_half_of(Register16::HL));
    }
}
