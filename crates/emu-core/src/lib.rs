//! Core traits and types for T-state accurate CPU models.
//!
//! One tick is one clock period. Each tick has a High and a Low half, and
//! registered state only changes at the rising edge that ends the tick.

mod bus;
mod clock;
mod cpu;
mod observable;
mod ticks;

pub use bus::PinBus;
pub use clock::ClockPhase;
pub use cpu::Cpu;
pub use observable::{Observable, Value};
pub use ticks::Ticks;
