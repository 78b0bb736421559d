//! Error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// A pair of bus lines asserted together that must never be.
///
/// These are modelling defects, not runtime conditions. They show up in
/// debug assertions and property tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("read and write asserted together")]
    ReadAndWrite,
    #[error("memory and I/O request asserted together")]
    MemAndIoRequest,
    #[error("data bus driven while tri-stated")]
    FloatingWhileDriving,
    #[error("read or write strobe asserted while tri-stated")]
    FloatingWhileStrobing,
    #[error("opcode fetch and refresh asserted together")]
    FetchAndRefresh,
    #[error("bus acknowledge without releasing the bus")]
    AckWithoutRelease,
}

/// Why execution could not continue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    #[error("undefined opcode {opcode:#04X} fetched at {pc:#06X}")]
    UndefinedOpcode { opcode: u8, pc: u16 },
    #[error("still running after {ticks} ticks")]
    TickLimit { ticks: u64 },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config JSON: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
    #[error("trace_depth {depth} exceeds the maximum of {max}")]
    TraceDepthTooLarge { depth: usize, max: usize },
}
