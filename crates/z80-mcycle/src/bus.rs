//! Pin-level memory and I/O device for tests and tracing.

use std::collections::BTreeSet;

use emu_core::{ClockPhase, PinBus};
use serde::Serialize;

use crate::signals::{BusControlLines, BusRequestInputs};

/// A write seen on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BusWrite {
    pub tick: u64,
    pub address: u16,
    pub value: u8,
}

/// Flat 64KB RAM plus 256 I/O ports, with scripted WAIT, BUSREQ and RESET.
///
/// The bus keeps its own tick count, advanced after every Low sub-phase,
/// so schedules are expressed in CPU ticks from power-on.
#[derive(Debug, Clone)]
pub struct SimpleBus {
    memory: Vec<u8>,
    ports: [u8; 256],
    tick: u64,

    // === Schedules ===
    wait: BTreeSet<u64>,
    bus_request: BTreeSet<u64>,
    /// Half-tick indices: `tick * 2` for High, `tick * 2 + 1` for Low.
    reset: BTreeSet<u64>,

    // === Observed writes ===
    writes: Vec<BusWrite>,
    io_writes: Vec<BusWrite>,
    /// WR was asserted in the previous sub-phase.
    write_strobe: bool,
}

impl Default for SimpleBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SimpleBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            memory: vec![0; 0x1_0000],
            ports: [0xFF; 256],
            tick: 0,
            wait: BTreeSet::new(),
            bus_request: BTreeSet::new(),
            reset: BTreeSet::new(),
            writes: Vec::new(),
            io_writes: Vec::new(),
            write_strobe: false,
        }
    }

    /// A bus with `program` loaded at address 0.
    #[must_use]
    pub fn with_program(program: &[u8]) -> Self {
        let mut bus = Self::new();
        bus.load(0, program);
        bus
    }

    /// Copy `bytes` into memory starting at `address`, wrapping at 64K.
    pub fn load(&mut self, address: u16, bytes: &[u8]) {
        let mut addr = address;
        for &byte in bytes {
            self.memory[usize::from(addr)] = byte;
            addr = addr.wrapping_add(1);
        }
    }

    #[must_use]
    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    #[must_use]
    pub fn peek(&self, address: u16) -> u8 {
        self.memory[usize::from(address)]
    }

    /// Value returned by IN from `port`.
    pub fn set_port(&mut self, port: u8, value: u8) {
        self.ports[usize::from(port)] = value;
    }

    /// Ticks elapsed so far.
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Memory writes in order.
    #[must_use]
    pub fn writes(&self) -> &[BusWrite] {
        &self.writes
    }

    /// I/O writes in order.
    #[must_use]
    pub fn io_writes(&self) -> &[BusWrite] {
        &self.io_writes
    }

    /// Assert WAIT during each of `ticks`.
    #[must_use]
    pub fn with_wait(mut self, ticks: impl IntoIterator<Item = u64>) -> Self {
        self.wait.extend(ticks);
        self
    }

    /// Assert BUSREQ during each of `ticks`.
    #[must_use]
    pub fn with_bus_request(mut self, ticks: impl IntoIterator<Item = u64>) -> Self {
        self.bus_request.extend(ticks);
        self
    }

    /// Hold RESET for both halves of each of `ticks`.
    #[must_use]
    pub fn with_reset(mut self, ticks: impl IntoIterator<Item = u64>) -> Self {
        for tick in ticks {
            self.reset.insert(tick * 2);
            self.reset.insert(tick * 2 + 1);
        }
        self
    }

    /// Pulse RESET for a single sub-phase.
    #[must_use]
    pub fn with_reset_pulse(mut self, tick: u64, phase: ClockPhase) -> Self {
        self.reset.insert(tick * 2 + u64::from(phase.is_low()));
        self
    }

    fn read(&self, lines: &BusControlLines) -> u8 {
        if lines.high_impedance || !lines.read {
            0xFF
        } else if lines.mem_request {
            self.memory[usize::from(lines.address)]
        } else if lines.io_request {
            self.ports[usize::from(lines.address & 0xFF)]
        } else {
            0xFF
        }
    }

    fn write(&mut self, lines: &BusControlLines) {
        let strobe = lines.write && !lines.high_impedance;
        if strobe && !self.write_strobe {
            let write = BusWrite {
                tick: self.tick,
                address: lines.address,
                value: lines.data_out,
            };
            if lines.mem_request {
                self.memory[usize::from(lines.address)] = lines.data_out;
                self.writes.push(write);
            } else if lines.io_request {
                self.io_writes.push(write);
            }
        }
        self.write_strobe = strobe;
    }
}

impl PinBus<BusControlLines, BusRequestInputs> for SimpleBus {
    fn respond(&mut self, lines: &BusControlLines, phase: ClockPhase) -> BusRequestInputs {
        let half = self.tick * 2 + u64::from(phase.is_low());
        self.write(lines);
        let inputs = BusRequestInputs {
            wait: self.wait.contains(&self.tick),
            bus_request: self.bus_request.contains(&self.tick),
            data_in: self.read(lines),
            reset: self.reset.contains(&half),
        };
        if phase.is_low() {
            self.tick += 1;
        }
        inputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_lines(address: u16) -> BusControlLines {
        BusControlLines {
            address,
            mem_request: true,
            read: true,
            ..BusControlLines::default()
        }
    }

    #[test]
    fn answers_memory_reads() {
        let mut bus = SimpleBus::with_program(&[0x0E, 0xAB]);
        let inputs = bus.respond(&read_lines(1), ClockPhase::High);
        assert_eq!(inputs.data_in, 0xAB);
    }

    #[test]
    fn floats_without_read_strobe() {
        let mut bus = SimpleBus::with_program(&[0x00]);
        let lines = BusControlLines {
            mem_request: true,
            ..BusControlLines::default()
        };
        assert_eq!(bus.respond(&lines, ClockPhase::High).data_in, 0xFF);
        let hiz = BusControlLines {
            high_impedance: true,
            ..read_lines(0)
        };
        assert_eq!(bus.respond(&hiz, ClockPhase::Low).data_in, 0xFF);
    }

    #[test]
    fn io_reads_use_low_address_byte() {
        let mut bus = SimpleBus::new();
        bus.set_port(0xFE, 0x1F);
        let lines = BusControlLines {
            address: 0x12FE,
            io_request: true,
            read: true,
            ..BusControlLines::default()
        };
        assert_eq!(bus.respond(&lines, ClockPhase::Low).data_in, 0x1F);
    }

    #[test]
    fn records_each_write_strobe_once() {
        let mut bus = SimpleBus::new();
        let lines = BusControlLines {
            address: 0x4000,
            data_out: 0x99,
            mem_request: true,
            write: true,
            data_direction: true,
            ..BusControlLines::default()
        };
        bus.respond(&lines, ClockPhase::High);
        bus.respond(&lines, ClockPhase::Low);
        bus.respond(&lines, ClockPhase::High);
        bus.respond(&BusControlLines::default(), ClockPhase::Low);
        assert_eq!(
            bus.writes(),
            &[BusWrite {
                tick: 0,
                address: 0x4000,
                value: 0x99
            }]
        );
        assert_eq!(bus.peek(0x4000), 0x99);
    }

    #[test]
    fn schedules_follow_tick_count() {
        let mut bus = SimpleBus::new().with_wait([1]).with_reset_pulse(2, ClockPhase::Low);
        let idle = BusControlLines::default();
        assert!(!bus.respond(&idle, ClockPhase::High).wait);
        bus.respond(&idle, ClockPhase::Low);
        assert!(bus.respond(&idle, ClockPhase::High).wait);
        bus.respond(&idle, ClockPhase::Low);
        assert!(!bus.respond(&idle, ClockPhase::High).reset);
        assert!(bus.respond(&idle, ClockPhase::Low).reset);
        assert_eq!(bus.tick(), 3);
    }
}
