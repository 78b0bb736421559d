//! Bus-cycle controller.
//!
//! Turns the sequencer's machine-cycle requests into per-half-tick pin
//! waveforms, and arbitrates wait states and bus requests. The controller
//! knows nothing about instructions; it only sees a [`CycleRequest`] each
//! tick and decides when one machine cycle ends and the next begins.
//!
//! Sampling points:
//! - WAIT and the data bus are sampled at the falling edge (mid-tick).
//! - BUSREQ is sampled at the rising edge (end of tick).
//! - Opcode bytes are latched at the rising edge that ends T2 of M1.

use emu_core::ClockPhase;
use serde::{Deserialize, Serialize};

use crate::signals::{BusControlLines, BusRequestInputs, MachineCycleKind, TState};

/// Controller state: one entry per T-state shape of each cycle kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BusState {
    Reset,
    /// No cycle requested.
    Idle,

    FetchT1,
    FetchT2,
    /// First refresh T-state.
    FetchT3,
    /// Second refresh T-state.
    FetchT4,
    FetchExtended,

    ReadT1,
    ReadT2,
    ReadT3,
    ReadExtended,

    WriteT1,
    WriteT2,
    /// Write strobe held while the device stretches the cycle.
    WriteWait,
    WriteT3,
    WriteExtended,

    IoReadT1,
    IoReadT2,
    /// Always entered once; repeats while WAIT is held.
    IoReadWait,
    IoReadT3,
    IoReadExtended,

    IoWriteT1,
    IoWriteT2,
    IoWriteWait,
    IoWriteT3,
    IoWriteExtended,

    Internal,

    BusRelease,
    /// Last tri-stated tick before the CPU drives the bus again.
    BusTake,
}

impl BusState {
    /// The machine-cycle kind this state belongs to.
    #[must_use]
    pub const fn kind(self) -> MachineCycleKind {
        match self {
            Self::Reset | Self::Idle => MachineCycleKind::None,
            Self::FetchT1 | Self::FetchT2 | Self::FetchT3 | Self::FetchT4 | Self::FetchExtended => {
                MachineCycleKind::OpcodeFetch
            }
            Self::ReadT1 | Self::ReadT2 | Self::ReadT3 | Self::ReadExtended => MachineCycleKind::MemRead,
            Self::WriteT1 | Self::WriteT2 | Self::WriteWait | Self::WriteT3 | Self::WriteExtended => {
                MachineCycleKind::MemWrite
            }
            Self::IoReadT1 | Self::IoReadT2 | Self::IoReadWait | Self::IoReadT3 | Self::IoReadExtended => {
                MachineCycleKind::IoRead
            }
            Self::IoWriteT1 | Self::IoWriteT2 | Self::IoWriteWait | Self::IoWriteT3 | Self::IoWriteExtended => {
                MachineCycleKind::IoWrite
            }
            Self::Internal => MachineCycleKind::Internal,
            Self::BusRelease | Self::BusTake => MachineCycleKind::BusRelease,
        }
    }

    /// First state of a cycle of the given kind.
    #[must_use]
    pub const fn first_of(kind: MachineCycleKind) -> Self {
        match kind {
            MachineCycleKind::None => Self::Idle,
            MachineCycleKind::OpcodeFetch => Self::FetchT1,
            MachineCycleKind::MemRead => Self::ReadT1,
            MachineCycleKind::MemWrite => Self::WriteT1,
            MachineCycleKind::IoRead => Self::IoReadT1,
            MachineCycleKind::IoWrite => Self::IoWriteT1,
            MachineCycleKind::Internal => Self::Internal,
            MachineCycleKind::BusRelease => Self::BusRelease,
        }
    }

    /// Extra T-state appended to a cycle of the given kind.
    #[must_use]
    pub const fn extension_of(kind: MachineCycleKind) -> Option<Self> {
        match kind {
            MachineCycleKind::OpcodeFetch => Some(Self::FetchExtended),
            MachineCycleKind::MemRead => Some(Self::ReadExtended),
            MachineCycleKind::MemWrite => Some(Self::WriteExtended),
            MachineCycleKind::IoRead => Some(Self::IoReadExtended),
            MachineCycleKind::IoWrite => Some(Self::IoWriteExtended),
            MachineCycleKind::Internal => Some(Self::Internal),
            MachineCycleKind::None | MachineCycleKind::BusRelease => None,
        }
    }

    /// States that honour a sampled WAIT by stalling.
    #[must_use]
    pub const fn samples_wait(self) -> bool {
        matches!(
            self,
            Self::FetchT2 | Self::ReadT2 | Self::WriteT2 | Self::WriteWait | Self::IoReadWait | Self::IoWriteWait
        )
    }

    /// T1 of a bus transfer: the address/data shadows follow the request.
    #[must_use]
    pub const fn opens_shadow(self) -> bool {
        matches!(
            self,
            Self::FetchT1 | Self::ReadT1 | Self::WriteT1 | Self::IoReadT1 | Self::IoWriteT1
        )
    }

    /// States in which the CPU floats its outputs.
    #[must_use]
    pub const fn is_high_impedance(self) -> bool {
        matches!(self, Self::Reset | Self::BusRelease | Self::BusTake)
    }
}

/// What the sequencer wants from the controller this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleRequest {
    /// Cycle to start when the current one ends.
    pub kind: MachineCycleKind,
    /// Append one T-state to the current cycle instead of ending it.
    pub extend: bool,
    /// Live address request, captured during T1.
    pub address: u16,
    /// Live write data, captured during T1.
    pub data: u8,
    /// Live refresh address, captured during the first refresh T-state.
    pub refresh_address: u16,
}

/// Registered-state view for one half-tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerStatus {
    pub state: BusState,
    pub kind: MachineCycleKind,
    pub t_state: TState,
    /// Action committed: the sequencer may advance and write this tick.
    pub act: bool,
    /// Byte presented to the data path.
    pub read_data: u8,
}

/// Lines and transition decided for one half-tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerOutputs {
    pub lines: BusControlLines,
    /// State after the coming rising edge.
    pub next: BusState,
    /// This tick ends a machine cycle. Only meaningful in the Low half.
    pub cycle_done: bool,
}

/// The bus-cycle state machine and its sampling registers.
#[derive(Debug, Clone)]
pub struct BusCycleController {
    state: BusState,
    t_state: TState,
    /// Wait ticks inserted into the current cycle.
    wait_ticks: u16,

    // === Shadows ===
    address_shadow: u16,
    data_shadow: u8,
    refresh_shadow: u16,
    /// Last byte captured from the bus.
    read_latch: u8,
    /// Cycle to start once a bus release ends.
    pending: MachineCycleKind,

    // === Input samples ===
    /// WAIT at the last falling edge.
    wait_sampled: bool,
    /// Data bus at the last falling edge.
    data_sampled: u8,
    /// BUSREQ at the last rising edge.
    bus_requested: bool,
}

impl Default for BusCycleController {
    fn default() -> Self {
        Self::new()
    }
}

impl BusCycleController {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: BusState::Reset,
            t_state: TState::T1,
            wait_ticks: 0,
            address_shadow: 0xFFFF,
            data_shadow: 0xFF,
            refresh_shadow: 0xFFFF,
            read_latch: 0xFF,
            pending: MachineCycleKind::None,
            wait_sampled: false,
            data_sampled: 0xFF,
            bus_requested: false,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    #[must_use]
    pub const fn state(&self) -> BusState {
        self.state
    }

    #[must_use]
    pub const fn t_state(&self) -> TState {
        self.t_state
    }

    #[must_use]
    pub const fn wait_ticks(&self) -> u16 {
        self.wait_ticks
    }

    /// True while BUSREQ is registered and the bus is, or will be, released.
    #[must_use]
    pub const fn bus_requested(&self) -> bool {
        self.bus_requested
    }

    /// Registered-state outputs for one half-tick.
    ///
    /// `data_in` is the data bus as currently driven by the device. It only
    /// matters in M1 T2, where the opcode byte passes straight through to
    /// the opcode latch.
    #[must_use]
    pub fn status(&self, data_in: u8) -> ControllerStatus {
        let stalled = self.state.samples_wait() && self.wait_sampled;
        let read_data = match self.state {
            BusState::FetchT2 => data_in,
            BusState::ReadT3 | BusState::IoReadT3 => self.data_sampled,
            _ => self.read_latch,
        };
        ControllerStatus {
            state: self.state,
            kind: self.state.kind(),
            t_state: self.t_state,
            act: !self.state.is_high_impedance() && !stalled,
            read_data,
        }
    }

    /// Drive the pins and decide the transition for one half-tick.
    #[must_use]
    pub fn evaluate(&self, phase: ClockPhase, request: &CycleRequest) -> ControllerOutputs {
        let lines = self.drive(phase, request);
        let (next, cycle_done) = self.transition(request);
        ControllerOutputs {
            lines,
            next,
            cycle_done: cycle_done && (phase.is_low() || self.state == BusState::Reset),
        }
    }

    fn drive(&self, phase: ClockPhase, request: &CycleRequest) -> BusControlLines {
        let c = phase.is_high();
        let (address, data_out) = if self.state.opens_shadow() {
            (request.address, request.data)
        } else {
            (self.address_shadow, self.data_shadow)
        };
        let at = |address: u16| BusControlLines {
            address,
            ..BusControlLines::default()
        };
        let writing = BusControlLines {
            data_out,
            data_direction: true,
            ..at(address)
        };

        match self.state {
            BusState::Reset | BusState::BusRelease | BusState::BusTake => BusControlLines {
                high_impedance: true,
                bus_ack: match self.state {
                    BusState::BusRelease => true,
                    BusState::BusTake => c,
                    _ => false,
                },
                ..BusControlLines::default()
            },
            BusState::Idle | BusState::Internal => BusControlLines::default(),

            BusState::FetchT1 => BusControlLines {
                opcode_fetch: true,
                mem_request: !c,
                read: !c,
                ..at(address)
            },
            BusState::FetchT2 => BusControlLines {
                opcode_fetch: true,
                mem_request: true,
                read: true,
                ..at(address)
            },
            BusState::FetchT3 => BusControlLines {
                refresh: true,
                mem_request: !c,
                ..at(request.refresh_address)
            },
            BusState::FetchT4 => BusControlLines {
                refresh: true,
                mem_request: c,
                ..at(self.refresh_shadow)
            },
            BusState::FetchExtended => at(self.refresh_shadow),

            BusState::ReadT1 => BusControlLines {
                mem_request: !c,
                read: !c,
                ..at(address)
            },
            BusState::ReadT2 => BusControlLines {
                mem_request: true,
                read: true,
                ..at(address)
            },
            BusState::ReadT3 => BusControlLines {
                mem_request: c,
                read: c,
                ..at(address)
            },
            BusState::ReadExtended | BusState::IoReadT1 | BusState::IoReadExtended => at(address),

            BusState::WriteT1 => BusControlLines {
                data_direction: !c,
                mem_request: !c,
                ..writing
            },
            BusState::WriteT2 => BusControlLines {
                mem_request: true,
                write: !c,
                ..writing
            },
            BusState::WriteWait => BusControlLines {
                mem_request: true,
                write: true,
                ..writing
            },
            BusState::WriteT3 => BusControlLines {
                mem_request: c,
                write: c,
                ..writing
            },
            BusState::WriteExtended | BusState::IoWriteExtended => BusControlLines {
                data_out,
                ..at(address)
            },

            BusState::IoReadT2 | BusState::IoReadWait => BusControlLines {
                io_request: true,
                read: true,
                ..at(address)
            },
            BusState::IoReadT3 => BusControlLines {
                io_request: c,
                read: c,
                ..at(address)
            },

            BusState::IoWriteT1 => BusControlLines {
                data_direction: !c,
                ..writing
            },
            BusState::IoWriteT2 | BusState::IoWriteWait => BusControlLines {
                io_request: true,
                write: true,
                ..writing
            },
            BusState::IoWriteT3 => BusControlLines {
                io_request: c,
                write: c,
                ..writing
            },
        }
    }

    /// Next state, and whether this tick ends a machine cycle.
    fn transition(&self, request: &CycleRequest) -> (BusState, bool) {
        let waited = self.wait_sampled;
        let next = match self.state {
            BusState::Reset
            | BusState::Idle
            | BusState::Internal
            | BusState::FetchT4
            | BusState::FetchExtended
            | BusState::ReadT3
            | BusState::ReadExtended
            | BusState::WriteT3
            | BusState::WriteExtended
            | BusState::IoReadT3
            | BusState::IoReadExtended
            | BusState::IoWriteT3
            | BusState::IoWriteExtended
            | BusState::BusTake => return self.end_cycle(request),

            BusState::FetchT1 => BusState::FetchT2,
            BusState::FetchT2 if waited => BusState::FetchT2,
            BusState::FetchT2 => BusState::FetchT3,
            BusState::FetchT3 => BusState::FetchT4,

            BusState::ReadT1 => BusState::ReadT2,
            BusState::ReadT2 if waited => BusState::ReadT2,
            BusState::ReadT2 => BusState::ReadT3,

            BusState::WriteT1 => BusState::WriteT2,
            BusState::WriteT2 | BusState::WriteWait if waited => BusState::WriteWait,
            BusState::WriteT2 | BusState::WriteWait => BusState::WriteT3,

            BusState::IoReadT1 => BusState::IoReadT2,
            BusState::IoReadT2 => BusState::IoReadWait,
            BusState::IoReadWait if waited => BusState::IoReadWait,
            BusState::IoReadWait => BusState::IoReadT3,

            BusState::IoWriteT1 => BusState::IoWriteT2,
            BusState::IoWriteT2 => BusState::IoWriteWait,
            BusState::IoWriteWait if waited => BusState::IoWriteWait,
            BusState::IoWriteWait => BusState::IoWriteT3,

            BusState::BusRelease if self.bus_requested => BusState::BusRelease,
            BusState::BusRelease => BusState::BusTake,
        };
        (next, false)
    }

    fn end_cycle(&self, request: &CycleRequest) -> (BusState, bool) {
        if request.extend {
            if let Some(extended) = BusState::extension_of(self.state.kind()) {
                return (extended, false);
            }
        }
        if self.bus_requested {
            (BusState::BusRelease, true)
        } else {
            (BusState::first_of(self.upcoming(request)), true)
        }
    }

    /// The cycle that starts after this one: the parked request when
    /// coming back from a bus release, otherwise the live one.
    fn upcoming(&self, request: &CycleRequest) -> MachineCycleKind {
        if self.state == BusState::BusTake {
            self.pending
        } else {
            request.kind
        }
    }

    /// Falling edge: sample WAIT and the data bus.
    pub fn falling_edge(&mut self, inputs: &BusRequestInputs) {
        self.wait_sampled = inputs.wait;
        self.data_sampled = inputs.data_in;
    }

    /// Rising edge: capture shadows and read data, sample BUSREQ, move on.
    ///
    /// `outputs` must come from the Low-half evaluation of this tick, with
    /// the same `request`.
    pub fn rising_edge(&mut self, outputs: &ControllerOutputs, request: &CycleRequest, inputs: &BusRequestInputs) {
        let next = outputs.next;

        if self.state.opens_shadow() {
            self.address_shadow = request.address;
            self.data_shadow = request.data;
        }
        match self.state {
            BusState::FetchT3 => self.refresh_shadow = request.refresh_address,
            BusState::FetchT2 if next != BusState::FetchT2 => self.read_latch = inputs.data_in,
            BusState::ReadT3 | BusState::IoReadT3 => self.read_latch = self.data_sampled,
            _ => {}
        }

        if next == BusState::BusRelease && self.state != BusState::BusRelease {
            self.pending = self.upcoming(request);
            log::debug!("releasing bus, {} pending", self.pending);
        } else if self.state == BusState::BusTake && next != BusState::BusRelease {
            log::debug!("bus taken back, resuming {}", self.pending);
        }

        let stalled = self.state.samples_wait() && self.wait_sampled;
        if outputs.cycle_done {
            self.t_state = TState::T1;
            self.wait_ticks = 0;
        } else if stalled {
            self.wait_ticks = self.wait_ticks.saturating_add(1);
        } else if self.state != BusState::BusRelease {
            self.t_state = self.t_state.next();
        }

        log::trace!("{:?} {} -> {:?}", self.state, self.t_state, next);
        self.state = next;
        self.bus_requested = inputs.bus_request;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One tick with a fixed request. Returns both halves' lines, the Low
    /// status and the Low outputs.
    fn tick(
        ctrl: &mut BusCycleController,
        request: &CycleRequest,
        inputs: BusRequestInputs,
    ) -> ([BusControlLines; 2], ControllerStatus, ControllerOutputs) {
        let high = ctrl.evaluate(ClockPhase::High, request);
        ctrl.falling_edge(&inputs);
        let status = ctrl.status(inputs.data_in);
        let low = ctrl.evaluate(ClockPhase::Low, request);
        ctrl.rising_edge(&low, request, &inputs);
        ([high.lines, low.lines], status, low)
    }

    fn request(kind: MachineCycleKind) -> CycleRequest {
        CycleRequest {
            kind,
            address: 0x1234,
            data: 0x5A,
            refresh_address: 0x0007,
            ..CycleRequest::default()
        }
    }

    fn quiet() -> BusRequestInputs {
        BusRequestInputs::default()
    }

    /// Leave Reset into the first cycle of `kind`.
    fn started(kind: MachineCycleKind) -> BusCycleController {
        let mut ctrl = BusCycleController::new();
        tick(&mut ctrl, &request(kind), quiet());
        assert_eq!(ctrl.state(), BusState::first_of(kind));
        ctrl
    }

    #[test]
    fn reset_floats_and_starts_requested_cycle() {
        let mut ctrl = BusCycleController::new();
        let ([high, low], status, out) = tick(&mut ctrl, &request(MachineCycleKind::OpcodeFetch), quiet());
        assert!(high.high_impedance && low.high_impedance);
        assert!(!status.act);
        assert!(out.cycle_done);
        assert_eq!(ctrl.state(), BusState::FetchT1);
        assert_eq!(ctrl.t_state(), TState::T1);
    }

    #[test]
    fn opcode_fetch_waveform() {
        let req = request(MachineCycleKind::OpcodeFetch);
        let mut ctrl = started(MachineCycleKind::OpcodeFetch);

        let ([h, l], ..) = tick(&mut ctrl, &req, quiet());
        assert!(h.opcode_fetch && !h.mem_request && !h.read);
        assert!(l.opcode_fetch && l.mem_request && l.read);
        assert_eq!(l.address, 0x1234);

        let data = BusRequestInputs {
            data_in: 0x0E,
            ..quiet()
        };
        let ([h, l], status, _) = tick(&mut ctrl, &req, data);
        assert!(h.mem_request && h.read && l.mem_request && l.read);
        assert_eq!(status.read_data, 0x0E);
        assert!(status.act);

        let ([h, l], status, _) = tick(&mut ctrl, &req, quiet());
        assert!(h.refresh && !h.mem_request && l.refresh && l.mem_request);
        assert!(!h.opcode_fetch && !l.read);
        assert_eq!(l.address, 0x0007);
        assert_eq!(status.read_data, 0x0E);

        let ([h, l], _, out) = tick(&mut ctrl, &req, quiet());
        assert!(h.refresh && h.mem_request && !l.mem_request);
        assert!(out.cycle_done);
        assert_eq!(ctrl.state(), BusState::FetchT1);
    }

    #[test]
    fn wait_stalls_t2_and_gates_act() {
        let req = request(MachineCycleKind::MemRead);
        let mut ctrl = started(MachineCycleKind::MemRead);
        tick(&mut ctrl, &req, quiet());
        assert_eq!(ctrl.state(), BusState::ReadT2);

        let wait = BusRequestInputs { wait: true, ..quiet() };
        for n in 1..=3 {
            let (_, status, _) = tick(&mut ctrl, &req, wait);
            assert!(!status.act);
            assert_eq!(ctrl.state(), BusState::ReadT2);
            assert_eq!(ctrl.wait_ticks(), n);
            assert_eq!(ctrl.t_state(), TState(2));
        }
        let (_, status, _) = tick(&mut ctrl, &req, quiet());
        assert!(status.act);
        assert_eq!(ctrl.state(), BusState::ReadT3);
        assert_eq!(ctrl.t_state(), TState(3));
    }

    #[test]
    fn wait_outside_sampling_state_is_ignored() {
        let req = request(MachineCycleKind::MemRead);
        let mut ctrl = started(MachineCycleKind::MemRead);
        let wait = BusRequestInputs { wait: true, ..quiet() };
        let (_, status, _) = tick(&mut ctrl, &req, wait);
        assert!(status.act);
        assert_eq!(ctrl.state(), BusState::ReadT2);
    }

    #[test]
    fn mem_read_latches_at_falling_edge_of_t3() {
        let req = request(MachineCycleKind::MemRead);
        let mut ctrl = started(MachineCycleKind::MemRead);
        tick(&mut ctrl, &req, quiet());
        tick(&mut ctrl, &req, quiet());
        let data = BusRequestInputs {
            data_in: 0xAB,
            ..quiet()
        };
        let ([h, l], status, out) = tick(&mut ctrl, &req, data);
        assert!(h.mem_request && h.read);
        assert!(!l.mem_request && !l.read);
        assert_eq!(status.read_data, 0xAB);
        assert!(out.cycle_done);
        assert_eq!(ctrl.status(0).read_data, 0xAB);
    }

    #[test]
    fn write_wait_holds_strobe() {
        let req = request(MachineCycleKind::MemWrite);
        let mut ctrl = started(MachineCycleKind::MemWrite);
        let ([h, l], ..) = tick(&mut ctrl, &req, quiet());
        assert!(!h.data_direction && !h.mem_request);
        assert!(l.data_direction && l.mem_request && !l.write);
        assert_eq!(l.data_out, 0x5A);

        let wait = BusRequestInputs { wait: true, ..quiet() };
        let ([h, l], status, _) = tick(&mut ctrl, &req, wait);
        assert!(h.mem_request && !h.write && l.write);
        assert!(!status.act);
        assert_eq!(ctrl.state(), BusState::WriteWait);

        let ([h, l], status, _) = tick(&mut ctrl, &req, quiet());
        assert!(h.write && l.write);
        assert!(status.act);
        assert_eq!(ctrl.state(), BusState::WriteT3);

        let ([h, l], _, out) = tick(&mut ctrl, &req, quiet());
        assert!(h.write && !l.write && h.data_direction);
        assert!(out.cycle_done);
    }

    #[test]
    fn io_read_always_inserts_one_wait() {
        let req = request(MachineCycleKind::IoRead);
        let mut ctrl = started(MachineCycleKind::IoRead);
        let mut states = vec![ctrl.state()];
        let mut done = false;
        while !done {
            let (_, _, out) = tick(
                &mut ctrl,
                &req,
                BusRequestInputs {
                    data_in: 0x99,
                    ..quiet()
                },
            );
            done = out.cycle_done;
            if !done {
                states.push(ctrl.state());
            }
        }
        assert_eq!(
            states,
            [BusState::IoReadT1, BusState::IoReadT2, BusState::IoReadWait, BusState::IoReadT3]
        );
        assert_eq!(ctrl.status(0).read_data, 0x99);
    }

    #[test]
    fn io_write_uses_io_request() {
        let req = request(MachineCycleKind::IoWrite);
        let mut ctrl = started(MachineCycleKind::IoWrite);
        tick(&mut ctrl, &req, quiet());
        let ([h, l], ..) = tick(&mut ctrl, &req, quiet());
        assert!(h.io_request && h.write && !h.mem_request);
        assert!(l.io_request && l.write);
        assert_eq!(l.address, 0x1234);
        assert_eq!(l.data_out, 0x5A);
    }

    #[test]
    fn shadow_holds_after_t1() {
        let mut req = request(MachineCycleKind::MemRead);
        let mut ctrl = started(MachineCycleKind::MemRead);
        tick(&mut ctrl, &req, quiet());
        req.address = 0xBEEF;
        let ([_, l], ..) = tick(&mut ctrl, &req, quiet());
        assert_eq!(l.address, 0x1234);
    }

    #[test]
    fn extend_appends_t_states() {
        let mut req = request(MachineCycleKind::MemRead);
        let mut ctrl = started(MachineCycleKind::MemRead);
        tick(&mut ctrl, &req, quiet());
        tick(&mut ctrl, &req, quiet());
        req.extend = true;
        let (_, _, out) = tick(&mut ctrl, &req, quiet());
        assert!(!out.cycle_done);
        assert_eq!(ctrl.state(), BusState::ReadExtended);
        assert_eq!(ctrl.t_state(), TState(4));
        let ([_, l], _, _) = tick(&mut ctrl, &req, quiet());
        assert_eq!(l.address, 0x1234);
        assert!(!l.mem_request);
        assert_eq!(ctrl.t_state(), TState(5));
        req.extend = false;
        let (_, _, out) = tick(&mut ctrl, &req, quiet());
        assert!(out.cycle_done);
        assert_eq!(ctrl.state(), BusState::ReadT1);
    }

    #[test]
    fn internal_counts_extension_ticks() {
        let mut req = request(MachineCycleKind::Internal);
        req.extend = true;
        let mut ctrl = started(MachineCycleKind::Internal);
        for expected in 2..=5 {
            let ([h, l], ..) = tick(&mut ctrl, &req, quiet());
            assert_eq!(h, BusControlLines::default());
            assert_eq!(l, BusControlLines::default());
            assert_eq!(ctrl.t_state(), TState(expected));
        }
    }

    #[test]
    fn bus_request_waits_for_cycle_boundary() {
        let req = request(MachineCycleKind::MemRead);
        let mut ctrl = started(MachineCycleKind::MemRead);
        let busreq = BusRequestInputs {
            bus_request: true,
            ..quiet()
        };
        tick(&mut ctrl, &req, busreq);
        assert_eq!(ctrl.state(), BusState::ReadT2);
        tick(&mut ctrl, &req, busreq);
        assert_eq!(ctrl.state(), BusState::ReadT3);
        let (_, _, out) = tick(&mut ctrl, &request(MachineCycleKind::MemWrite), busreq);
        assert!(out.cycle_done);
        assert_eq!(ctrl.state(), BusState::BusRelease);

        let ([h, l], status, _) = tick(&mut ctrl, &request(MachineCycleKind::None), busreq);
        assert!(h.high_impedance && h.bus_ack && l.bus_ack);
        assert!(!status.act);
        assert_eq!(ctrl.state(), BusState::BusRelease);

        tick(&mut ctrl, &request(MachineCycleKind::None), quiet());
        assert_eq!(ctrl.state(), BusState::BusRelease);
        tick(&mut ctrl, &request(MachineCycleKind::None), quiet());
        assert_eq!(ctrl.state(), BusState::BusTake);

        let ([h, l], _, out) = tick(&mut ctrl, &request(MachineCycleKind::None), quiet());
        assert!(h.high_impedance && h.bus_ack && !l.bus_ack);
        assert!(out.cycle_done);
        // The parked write resumes, not the live request.
        assert_eq!(ctrl.state(), BusState::WriteT1);
    }

    #[test]
    fn every_state_obeys_line_invariants() {
        let kinds = [
            MachineCycleKind::OpcodeFetch,
            MachineCycleKind::MemRead,
            MachineCycleKind::MemWrite,
            MachineCycleKind::IoRead,
            MachineCycleKind::IoWrite,
            MachineCycleKind::Internal,
        ];
        for kind in kinds {
            let mut ctrl = BusCycleController::new();
            let mut req = request(kind);
            for n in 0..12 {
                req.extend = n % 5 == 4;
                let inputs = BusRequestInputs {
                    wait: n % 3 == 1,
                    bus_request: n == 6,
                    ..quiet()
                };
                let (lines, ..) = tick(&mut ctrl, &req, inputs);
                for half in lines {
                    assert_eq!(half.check_invariants(), Ok(()), "{kind:?} tick {n}");
                }
            }
        }
    }
}
