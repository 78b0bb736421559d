//! CPU core trait.

use crate::PinBus;

/// A CPU core clocked one T-state at a time.
///
/// The CPU does not own its bus. Each tick it drives its output pins and
/// lets the device on the other side answer, once per clock half.
pub trait Cpu {
    /// The type used for register inspection.
    type Registers;
    /// Lines the CPU drives.
    type Outputs;
    /// Lines the CPU samples.
    type Inputs;

    /// Advance the CPU by one T-state.
    fn tick<B: PinBus<Self::Outputs, Self::Inputs>>(&mut self, bus: &mut B);

    /// Returns the current program counter, zero-extended.
    fn pc(&self) -> u32;

    /// Returns a snapshot of all registers for inspection.
    fn registers(&self) -> Self::Registers;

    /// Returns true if the CPU has stopped issuing bus cycles on its own.
    fn is_halted(&self) -> bool;

    /// Reset the CPU to its initial state.
    fn reset(&mut self);
}
