//! Pin-level bus interface.

use crate::ClockPhase;

/// A device wired to a CPU's pins.
///
/// The CPU presents its output lines once per clock half and the device
/// answers with the input lines it drives back. Devices see every half, so
/// strobes that only pulse for half a T-state are visible to them.
///
/// `O` is the set of lines the CPU drives, `I` the set it samples.
pub trait PinBus<O, I> {
    /// Respond to the CPU's output lines for one clock half.
    fn respond(&mut self, outputs: &O, phase: ClockPhase) -> I;
}
