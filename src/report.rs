//! C7's half of the reporting story: the event log record format and the
//! sink it is written to (spec §6 "Log record format", §4.7).
//!
//! Grounded in the teacher's `profiler.rs` `ProfileReceiver` pattern: a
//! small trait the session hands records to, with a `StderrReceiver`-style
//! default and a file-backed alternative, rather than hard-coding
//! `eprintln!` calls throughout the injectors.

use std::fmt;
use std::fs::File;
use std::io::{
    self,
    Write,
};

use crate::config::{
    Command,
    TriggerType,
};
use crate::counters::Counters;
use crate::host::Addr;

/// One complete log event: a header plus a free-form body line produced by
/// whichever component fired it (spec §6 "an event-specific body line").
#[derive(Debug, Clone)]
pub struct Record {
    pub ip: Addr,
    pub counters: Counters,
    pub thread: u64,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub body: String,
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let location = match (self.file.as_deref(), self.line) {
            (Some(file), Some(line)) => format!("{file}:{line:>5}"),
            (Some(file), None) => format!("{file}:?"),
            (None, _) => "??:?".to_string(),
        };
        writeln!(
            f,
            "[{location}, IP = {:#x}, i = {}, wa = {}, ra = {}, rr = {}, wr = {}, it = {}, t = {}]",
            self.ip,
            self.counters.instr,
            self.counters.waddr,
            self.counters.raddr,
            self.counters.rreg,
            self.counters.wreg,
            self.counters.iter,
            self.thread,
        )?;
        writeln!(f, "\t{}", self.body)
    }
}

/// Final per-run summary (spec §4.7): all six counters plus the
/// configuration fields that shaped this run and the elapsed wall time.
#[derive(Debug, Clone)]
pub struct Summary {
    pub counters: Counters,
    pub trigger: u64,
    pub ttype: TriggerType,
    pub cmd: Command,
    pub sel: i64,
    pub seed: u64,
    pub mask: u64,
    pub target_thread: u64,
    pub elapsed: std::time::Duration,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "**********************")?;
        writeln!(f, "INSTR   = {}", self.counters.instr)?;
        writeln!(f, "WADDR   = {}", self.counters.waddr)?;
        writeln!(f, "RADDR   = {}", self.counters.raddr)?;
        writeln!(f, "RREG    = {}", self.counters.rreg)?;
        writeln!(f, "WREG    = {}", self.counters.wreg)?;
        writeln!(f, "ITER    = {}", self.counters.iter)?;
        writeln!(f, "TRIGGER = {}", self.trigger)?;
        writeln!(f, "TTYPE   = {}", self.ttype)?;
        writeln!(f, "COMMAND = {}", self.cmd)?;
        writeln!(f, "SEL     = {}", self.sel)?;
        writeln!(f, "SEED    = {}", self.seed)?;
        writeln!(f, "MASK    = {:#x}", self.mask)?;
        writeln!(f, "THREAD  = {}", self.target_thread)?;
        writeln!(f, "ELAPSED = {:.2}s", self.elapsed.as_secs_f64())
    }
}

/// Where event records and the final summary are written (spec §6 `log`
/// option: a file path, or stderr when unset/"NONE").
pub enum Sink {
    File(File),
    Stderr,
}

impl Sink {
    /// Open `path` for the `log` option, or fall back to stderr when `path`
    /// is `None` or the literal `"NONE"` (spec §6 table).
    pub fn open(path: Option<&str>) -> io::Result<Self> {
        match path {
            None => Ok(Sink::Stderr),
            Some(p) if p.eq_ignore_ascii_case("NONE") => Ok(Sink::Stderr),
            Some(p) => Ok(Sink::File(File::create(p)?)),
        }
    }

    /// Write a formatted record or summary to this sink.
    pub fn write_display(&mut self, value: &impl fmt::Display) -> io::Result<()> {
        match self {
            Sink::File(file) => write!(file, "{value}"),
            Sink::Stderr => write!(io::stderr(), "{value}"),
        }
    }
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sink::File(_) => f.write_str("Sink::File(..)"),
            Sink::Stderr => f.write_str("Sink::Stderr"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_renders_header_and_body() {
        let record = Record {
            ip: 0x4005a0,
            counters: Counters {
                instr: 10,
                waddr: 2,
                raddr: 3,
                rreg: 1,
                wreg: 0,
                iter: 0,
            },
            thread: 0,
            file: Some("main.c".to_string()),
            line: Some(42),
            body: "ip = 0x1, ip' = 0x2".to_string(),
        };
        let rendered = record.to_string();
        assert!(rendered.starts_with("[main.c:   42, IP = 0x4005a0"));
        assert!(rendered.contains("i = 10"));
        assert!(rendered.contains("wa = 2"));
        assert!(rendered.ends_with("ip = 0x1, ip' = 0x2\n"));
    }

    #[test]
    fn record_handles_unresolved_symbol() {
        let record = Record {
            ip: 0x1,
            counters: Counters::new(),
            thread: 0,
            file: None,
            line: None,
            body: "x".to_string(),
        };
        assert!(record.to_string().starts_with("[??:?, IP = 0x1"));
    }

    #[test]
    fn summary_renders_all_fields() {
        let summary = Summary {
            counters: Counters::new(),
            trigger: 1000,
            ttype: TriggerType::Instr,
            cmd: Command::Rreg,
            sel: 0,
            seed: 0xDEAD_BEEF,
            mask: 0x04,
            target_thread: 0,
            elapsed: std::time::Duration::from_millis(1500),
        };
        let rendered = summary.to_string();
        assert!(rendered.contains("TRIGGER = 1000"));
        assert!(rendered.contains("MASK    = 0x4"));
        assert!(rendered.contains("ELAPSED = 1.50s"));
    }
}
