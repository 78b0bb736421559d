//! Run a Z80 program on a flat 64K bus and print every tick.
//!
//! Usage:
//!   z80-trace program.bin --ticks 40
//!   z80-trace --hex "DD 36 05 AB 76" --wait 3 --bus-request 9 --bus-request 10

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::Parser;
use emu_core::{Cpu, Observable};
use env_logger::Env;
use z80_mcycle::{MAX_TRACE_DEPTH, SimpleBus, TickRecord, Z80, Z80Config, machine_cycles};

/// Registers shown in the closing summary.
const SUMMARY_PATHS: &[&str] = &[
    "a", "b", "c", "d", "e", "h", "l", "ix", "iy", "sp", "pc", "i", "r", "wz", "tmp",
];

#[derive(Debug, Parser)]
#[command(version, about = "Tick-by-tick bus trace of a Z80 program")]
struct Args {
    /// Program binary, loaded at address 0
    #[arg(required_unless_present = "hex", conflicts_with = "hex")]
    program: Option<PathBuf>,

    /// Program as hex bytes, e.g. "0E AB 76"
    #[arg(long)]
    hex: Option<String>,

    /// Number of ticks to run
    #[arg(short, long, default_value_t = 64)]
    ticks: u64,

    /// Hold WAIT for the whole of this tick (repeatable)
    #[arg(long = "wait", value_name = "TICK")]
    waits: Vec<u64>,

    /// Hold BUSREQ for the whole of this tick (repeatable)
    #[arg(long = "bus-request", value_name = "TICK")]
    bus_requests: Vec<u64>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print one JSON object per tick instead of a table
    #[arg(long)]
    json: bool,
}

fn parse_hex(text: &str) -> anyhow::Result<Vec<u8>> {
    text.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|token| !token.is_empty())
        .map(|token| {
            let digits = token.trim_start_matches("0x").trim_start_matches("0X");
            u8::from_str_radix(digits, 16).with_context(|| format!("invalid hex byte '{token}'"))
        })
        .collect()
}

fn load_program(args: &Args) -> anyhow::Result<Vec<u8>> {
    let program = match (&args.program, &args.hex) {
        (_, Some(hex)) => parse_hex(hex)?,
        (Some(path), None) => {
            fs::read(path).with_context(|| format!("failed to read {}", path.display()))?
        }
        (None, None) => bail!("no program given"),
    };
    if program.len() > 0x10000 {
        bail!("program is {} bytes, larger than the 64K address space", program.len());
    }
    Ok(program)
}

fn print_row(out: &mut impl Write, record: &TickRecord) -> io::Result<()> {
    let [high, low] = record.lines;
    let data = if low.data_direction {
        low.data_out
    } else {
        record.inputs[1].data_in
    };
    let state = format!("{:?}", record.bus_state);
    let seq = format!("{:?}", record.seq_state);
    writeln!(
        out,
        "{:>6}  {state:<14} {:>3}/{:<2} {:04X} {data:02X}  {} {}  {}{}  {seq}",
        record.tick,
        record.kind.to_string(),
        record.t_state.to_string(),
        low.address,
        high.strobe_string(),
        low.strobe_string(),
        if record.act { ' ' } else { '*' },
        if record.cycle_done { '|' } else { ' ' },
    )
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let program = load_program(&args)?;

    let mut config = match &args.config {
        Some(path) => Z80Config::load(path)?,
        None => Z80Config::default(),
    };
    if config.trace_depth == 0 {
        log::warn!("trace_depth 0 disables tracing; using 1");
        config.trace_depth = 1;
    }
    config.trace_depth = config.trace_depth.min(MAX_TRACE_DEPTH);

    let mut bus = SimpleBus::with_program(&program)
        .with_wait(args.waits.iter().copied())
        .with_bus_request(args.bus_requests.iter().copied());
    let mut cpu: Z80 = Z80::with_config(config);

    log::info!("{} byte program, {} ticks", program.len(), args.ticks);

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    if !args.json {
        writeln!(
            out,
            "{:>6}  {:<14} {:>6} {:<4} {:<3} {:<9} {:<9} {:<2}  seq",
            "tick", "state", "kind/T", "addr", "dat", "high", "low", "w"
        )?;
    }

    let mut records = Vec::new();
    for _ in 0..args.ticks {
        cpu.tick(&mut bus);
        let Some(record) = cpu.trace().latest().copied() else {
            continue;
        };
        if args.json {
            serde_json::to_writer(&mut out, &record)?;
            writeln!(out)?;
        } else {
            print_row(&mut out, &record)?;
        }
        records.push(record);
        if cpu.sequencer().trapped_opcode().is_some() {
            break;
        }
    }

    if !args.json {
        writeln!(out)?;
        for path in SUMMARY_PATHS {
            if let Some(value) = cpu.query(path) {
                write!(out, "{path}={value} ")?;
            }
        }
        writeln!(out)?;

        writeln!(out)?;
        for cycle in machine_cycles(&records) {
            write!(out, "{}:{}", cycle.kind, cycle.t_states)?;
            if cycle.wait_ticks > 0 {
                write!(out, "+{}w", cycle.wait_ticks)?;
            }
            write!(out, " ")?;
        }
        writeln!(out)?;

        for write in bus.writes() {
            writeln!(out, "write {:04X} <- {:02X} at tick {}", write.address, write.value, write.tick)?;
        }
        if cpu.is_halted() {
            writeln!(out, "halted after {} ticks", cpu.total_ticks())?;
        }
    }
    out.flush()?;
    drop(out);

    if cpu.invariant_violations() > 0 {
        log::error!("{} line invariant violations", cpu.invariant_violations());
    }
    cpu.check().context("program stopped")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("z80-trace").chain(extra.iter().copied()))
            .expect("valid arguments")
    }

    #[test]
    fn hex_accepts_spaces_commas_and_prefixes() {
        assert_eq!(parse_hex("0E AB 76").unwrap(), vec![0x0E, 0xAB, 0x76]);
        assert_eq!(parse_hex("0x0e,0XAB, 76\n").unwrap(), vec![0x0E, 0xAB, 0x76]);
        assert!(parse_hex("").unwrap().is_empty());
    }

    #[test]
    fn hex_rejects_bad_tokens() {
        let err = parse_hex("0E ZZ 76").unwrap_err();
        assert!(err.to_string().contains("'ZZ'"));
        assert!(parse_hex("100").is_err());
    }

    #[test]
    fn program_from_hex() {
        let args = args(&["--hex", "DD 36 05 AB 76", "--ticks", "30", "--wait", "3", "--wait", "4"]);
        assert_eq!(load_program(&args).unwrap(), vec![0xDD, 0x36, 0x05, 0xAB, 0x76]);
        assert_eq!(args.ticks, 30);
        assert_eq!(args.waits, vec![3, 4]);
    }

    #[test]
    fn program_larger_than_address_space_is_rejected() {
        let hex = "00 ".repeat(0x10001);
        let err = load_program(&args(&["--hex", &hex])).unwrap_err();
        assert!(err.to_string().contains("larger than the 64K"));

        let hex = "00 ".repeat(0x10000);
        assert_eq!(load_program(&args(&["--hex", &hex])).unwrap().len(), 0x10000);
    }

    #[test]
    fn program_path_or_hex_required() {
        assert!(Args::try_parse_from(["z80-trace"]).is_err());
        assert!(Args::try_parse_from(["z80-trace", "prog.bin", "--hex", "00"]).is_err());
    }

    #[test]
    fn missing_program_file_names_the_path() {
        let err = load_program(&args(&["/nonexistent/prog.bin"])).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/prog.bin"));
    }
}
