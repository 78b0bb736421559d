//! Level-sensitive latch.

use serde::{Deserialize, Serialize};

/// A transparent latch.
///
/// While enabled the output follows the input. The held value is updated at
/// each rising edge the latch is enabled for, so disabling it freezes the
/// last value that was passing through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransparentLatch<T> {
    held: T,
    enabled: bool,
}

impl<T: Copy> TransparentLatch<T> {
    #[must_use]
    pub const fn new(initial: T) -> Self {
        Self {
            held: initial,
            enabled: true,
        }
    }

    /// The value held from the last enabled rising edge.
    #[must_use]
    pub const fn held(&self) -> T {
        self.held
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// State after the coming rising edge.
    #[must_use]
    pub fn clocked(&self, input: T, enable_next: bool) -> Self {
        Self {
            held: if self.enabled { input } else { self.held },
            enabled: enable_next,
        }
    }
}
