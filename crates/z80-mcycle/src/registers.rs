//! Z80 register snapshot.

#![allow(clippy::cast_possible_truncation)] // Intentional truncation for low byte extraction.

use serde::{Deserialize, Serialize};

/// Z80 registers snapshot for observation and presets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Registers {
    // Main registers
    pub a: u8,
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,

    // Alternate registers
    pub a_alt: u8,
    pub f_alt: u8,
    pub b_alt: u8,
    pub c_alt: u8,
    pub d_alt: u8,
    pub e_alt: u8,
    pub h_alt: u8,
    pub l_alt: u8,

    // Index registers
    pub ix: u16,
    pub iy: u16,

    // Other registers
    pub sp: u16,
    pub pc: u16,
    pub i: u8,
    pub r: u8,

    // Internal registers
    /// WZ, banked like BC/DE/HL. Holds computed effective addresses.
    pub w: u8,
    pub z: u8,
    pub w_alt: u8,
    pub z_alt: u8,
    /// Holds an immediate byte on its way to memory.
    pub tmp: u8,
}

const fn pair(hi: u8, lo: u8) -> u16 {
    (hi as u16) << 8 | lo as u16
}

impl Registers {
    /// Get AF register pair.
    #[must_use]
    pub const fn af(&self) -> u16 {
        pair(self.a, self.f)
    }

    /// Get BC register pair.
    #[must_use]
    pub const fn bc(&self) -> u16 {
        pair(self.b, self.c)
    }

    /// Get DE register pair.
    #[must_use]
    pub const fn de(&self) -> u16 {
        pair(self.d, self.e)
    }

    /// Get HL register pair.
    #[must_use]
    pub const fn hl(&self) -> u16 {
        pair(self.h, self.l)
    }

    /// Get the internal WZ pair.
    #[must_use]
    pub const fn wz(&self) -> u16 {
        pair(self.w, self.z)
    }

    pub fn set_bc(&mut self, value: u16) {
        self.b = (value >> 8) as u8;
        self.c = value as u8;
    }

    pub fn set_de(&mut self, value: u16) {
        self.d = (value >> 8) as u8;
        self.e = value as u8;
    }

    pub fn set_hl(&mut self, value: u16) {
        self.h = (value >> 8) as u8;
        self.l = value as u8;
    }

    pub fn set_wz(&mut self, value: u16) {
        self.w = (value >> 8) as u8;
        self.z = value as u8;
    }
}
