//! Per-tick trace records and machine-cycle summaries.

use std::collections::VecDeque;

use serde::Serialize;

use crate::controller::BusState;
use crate::sequencer::SequencerState;
use crate::signals::{BusControlLines, BusRequestInputs, MachineCycleKind, TState};

/// Everything observable about one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TickRecord {
    pub tick: u64,
    /// High then Low sub-phase.
    pub lines: [BusControlLines; 2],
    pub inputs: [BusRequestInputs; 2],
    pub bus_state: BusState,
    pub kind: MachineCycleKind,
    pub t_state: TState,
    pub act: bool,
    pub cycle_done: bool,
    /// BUSREQ as registered at the start of the tick.
    pub bus_requested: bool,
    pub seq_state: SequencerState,
}

impl TickRecord {
    /// A tick where the controller held its T-state for WAIT.
    #[must_use]
    pub const fn is_wait(&self) -> bool {
        !self.act && !self.bus_state.is_high_impedance()
    }
}

/// Bounded ring of the most recent ticks.
#[derive(Debug, Clone, Default)]
pub struct TraceBuffer {
    records: VecDeque<TickRecord>,
    capacity: usize,
}

impl TraceBuffer {
    /// A buffer keeping at most `capacity` records. Zero disables tracing.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, record: TickRecord) {
        if self.capacity == 0 {
            return;
        }
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The most recent tick.
    #[must_use]
    pub fn latest(&self) -> Option<&TickRecord> {
        self.records.back()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &TickRecord> {
        self.records.iter()
    }

    /// Oldest first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<TickRecord> {
        self.records.iter().copied().collect()
    }
}

/// One completed machine cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    pub kind: MachineCycleKind,
    /// T-states, not counting wait ticks.
    pub t_states: u32,
    pub wait_ticks: u32,
}

impl CycleSummary {
    /// Length in ticks including waits.
    #[must_use]
    pub const fn ticks(&self) -> u32 {
        self.t_states + self.wait_ticks
    }
}

/// Group ticks into machine cycles, split at each `cycle_done`.
///
/// Idle and reset ticks are dropped, as is a trailing unfinished cycle.
#[must_use]
pub fn machine_cycles(records: &[TickRecord]) -> Vec<CycleSummary> {
    let mut cycles = Vec::new();
    let mut current: Option<CycleSummary> = None;

    for record in records {
        let summary = current.get_or_insert(CycleSummary {
            kind: record.kind,
            t_states: 0,
            wait_ticks: 0,
        });
        if record.is_wait() {
            summary.wait_ticks += 1;
        } else {
            summary.t_states += 1;
        }
        if record.cycle_done {
            if let Some(done) = current.take() {
                if done.kind != MachineCycleKind::None {
                    cycles.push(done);
                }
            }
        }
    }
    cycles
}
