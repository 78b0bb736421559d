//! Wire-level vocabulary: machine-cycle kinds, T-states and the pins.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::InvariantViolation;

/// The semantic type of a bus cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MachineCycleKind {
    /// No cycle requested. The controller idles.
    #[default]
    None,
    /// M1: opcode fetch followed by a refresh.
    OpcodeFetch,
    MemRead,
    MemWrite,
    IoRead,
    IoWrite,
    /// No bus activity, one T-state per tick of extension.
    Internal,
    /// The bus is handed to an external requester.
    BusRelease,
}

impl fmt::Display for MachineCycleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "-",
            Self::OpcodeFetch => "M1",
            Self::MemRead => "MR",
            Self::MemWrite => "MW",
            Self::IoRead => "IR",
            Self::IoWrite => "IW",
            Self::Internal => "IN",
            Self::BusRelease => "BR",
        };
        f.write_str(name)
    }
}

/// Position within a machine cycle, starting at 1.
///
/// Wait ticks repeat the T-state they stall in; extension ticks continue
/// counting past the cycle's nominal length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct TState(pub u8);

impl TState {
    pub const T1: Self = Self(1);

    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for TState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Lines the CPU drives. All strobes are modelled active-high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BusControlLines {
    pub address: u16,
    pub data_out: u8,
    pub mem_request: bool,
    pub io_request: bool,
    pub read: bool,
    pub write: bool,
    /// M1.
    pub opcode_fetch: bool,
    /// RFSH.
    pub refresh: bool,
    pub bus_ack: bool,
    /// The CPU drives the data bus.
    pub data_direction: bool,
    /// Address, data and strobes are tri-stated.
    pub high_impedance: bool,
}

impl BusControlLines {
    /// Check the mutual-exclusion rules that hold on every half-tick.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        if self.read && self.write {
            return Err(InvariantViolation::ReadAndWrite);
        }
        if self.mem_request && self.io_request {
            return Err(InvariantViolation::MemAndIoRequest);
        }
        if self.high_impedance && self.data_direction {
            return Err(InvariantViolation::FloatingWhileDriving);
        }
        if self.high_impedance && (self.read || self.write) {
            return Err(InvariantViolation::FloatingWhileStrobing);
        }
        if self.opcode_fetch && self.refresh {
            return Err(InvariantViolation::FetchAndRefresh);
        }
        if self.bus_ack && !self.high_impedance {
            return Err(InvariantViolation::AckWithoutRelease);
        }
        Ok(())
    }

    /// Active strobes as a fixed-width letter field, e.g. `1M.R.....` for
    /// the read half of an opcode fetch.
    #[must_use]
    pub fn strobe_string(&self) -> String {
        let flag = |on: bool, c: char| if on { c } else { '.' };
        [
            flag(self.opcode_fetch, '1'),
            flag(self.mem_request, 'M'),
            flag(self.io_request, 'I'),
            flag(self.read, 'R'),
            flag(self.write, 'W'),
            flag(self.refresh, 'F'),
            flag(self.data_direction, 'D'),
            flag(self.high_impedance, 'Z'),
            flag(self.bus_ack, 'A'),
        ]
        .iter()
        .collect()
    }
}

/// Lines the environment drives into the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusRequestInputs {
    /// WAIT. Sampled at the falling edge.
    pub wait: bool,
    /// BUSREQ. Sampled at the rising edge.
    pub bus_request: bool,
    pub data_in: u8,
    /// RESET. Only honoured when held for both halves of a tick.
    pub reset: bool,
}

impl Default for BusRequestInputs {
    fn default() -> Self {
        Self {
            wait: false,
            bus_request: false,
            data_in: 0xFF,
            reset: false,
        }
    }
}
