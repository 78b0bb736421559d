//! Clock sub-phases.

/// Half of a clock period.
///
/// A tick starts just after a rising edge with the clock High, crosses the
/// falling edge into the Low half, and ends on the next rising edge.
/// Components that sample at the falling edge see the High-half values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ClockPhase {
    High,
    Low,
}

impl ClockPhase {
    /// Both halves in the order they occur within a tick.
    pub const BOTH: [Self; 2] = [Self::High, Self::Low];

    #[must_use]
    pub const fn is_high(self) -> bool {
        matches!(self, Self::High)
    }

    #[must_use]
    pub const fn is_low(self) -> bool {
        matches!(self, Self::Low)
    }
}
