//! Immutable startup configuration (spec §3 "Configuration").
//!
//! `Command` and `TriggerType` use `strum`'s derives the way the teacher
//! crate's `fuel-asm` leans on `strum` for its opcode-like enums — it gives
//! us `FromStr`/`Display` for free instead of hand-rolling the `cmd_select`/
//! `ttype_select` string switches from the original tool.

use std::fmt;

use strum::{
    Display,
    EnumString,
};

use crate::error::ConfigError;

/// Which injector (or the read-only finder) to run once the trigger fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Command {
    /// No command: counters still advance, nothing is ever injected.
    None,
    /// Control-flow: XOR the instruction pointer with `mask`.
    Cf,
    /// Flip a word at the effective address of a read-side memory operand.
    Rval,
    /// Flip a word at the effective address of a write-side memory operand.
    Wval,
    /// Rewrite the effective address of a read-side memory operand.
    Raddr,
    /// Rewrite the effective address of a write-side memory operand.
    Waddr,
    /// Flip a read register's value.
    Rreg,
    /// Flip a write register's value.
    Wreg,
    /// Flip a byte in a copy of the instruction's own encoding.
    Txt,
    /// Non-destructive: report matches, optionally without terminating.
    Find,
}

impl Default for Command {
    fn default() -> Self {
        Command::None
    }
}

/// Which counter the trigger predicate (`C2`) consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum TriggerType {
    /// Instructions retired (`counters.instr`).
    #[strum(serialize = "IN")]
    Instr,
    /// Memory-operand reads (`counters.raddr`).
    #[strum(serialize = "RA")]
    ReadAddr,
    /// Memory-operand writes (`counters.waddr`).
    #[strum(serialize = "WA")]
    WriteAddr,
    /// Register reads (`counters.rreg`).
    #[strum(serialize = "RR")]
    ReadReg,
    /// Register writes (`counters.wreg`).
    #[strum(serialize = "WR")]
    WriteReg,
    /// Occurrences of `tip` (`counters.iter`); requires `tip != 0`.
    #[strum(serialize = "IT")]
    Iteration,
}

impl Default for TriggerType {
    fn default() -> Self {
        TriggerType::Instr
    }
}

/// Immutable configuration, built once at startup and never mutated
/// afterwards (spec §3 "Entity: Configuration").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Command to execute once the trigger fires.
    pub cmd: Command,
    /// Which counter the trigger predicate consults.
    pub ttype: TriggerType,
    /// Threshold on the chosen counter. `0` means "not set", and is invalid
    /// for every command except `FIND` in address-scan mode.
    pub trigger: u64,
    /// Optional target instruction address. `0` means "any address".
    pub tip: u64,
    /// Bit-mask XORed into the victim bits.
    pub mask: u64,
    /// PRNG seed for operand/byte selection. `0` disables randomness (index
    /// 0 is used unconditionally).
    pub seed: u64,
    /// If `>= 0`, overrides `seed` and pins the operand/register index.
    pub sel: i64,
    /// Worker id whose instructions are the only ones eligible.
    pub target_thread: u64,
    /// Detach from the host once the one injection completes.
    pub detach: bool,
    /// Function names delimiting an activation window. Empty means
    /// "always enabled".
    pub funcs: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            cmd: Command::None,
            ttype: TriggerType::Instr,
            trigger: 0,
            tip: 0,
            mask: 0x01,
            seed: 0xDEAD_BEEF,
            sel: -1,
            target_thread: 0,
            detach: false,
            funcs: Vec::new(),
        }
    }
}

impl Config {
    /// Validate this configuration per spec §4.3 "Configuration errors at
    /// planning time". Must be called (and must succeed) before the target
    /// begins executing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ttype == TriggerType::Iteration && self.tip == 0 {
            return Err(ConfigError::IterationTriggerNeedsTip);
        }

        // FIND is the only command allowed to run with trigger == 0, and
        // only when it is scanning for a specific address instead.
        let find_by_address = self.cmd == Command::Find && self.tip != 0;
        if self.trigger == 0 && self.cmd != Command::None && !find_by_address {
            return Err(ConfigError::MissingTrigger { cmd: self.cmd });
        }

        if matches!(self.cmd, Command::Raddr | Command::Waddr)
            && !matches!(self.ttype, TriggerType::Instr | TriggerType::Iteration)
        {
            return Err(ConfigError::AddrTriggerTypeUnsupported {
                cmd: self.cmd,
                ttype: self.ttype,
            });
        }

        Ok(())
    }

    /// `true` if function-gated activation is configured (spec §4.6).
    pub fn has_function_monitor(&self) -> bool {
        !self.funcs.is_empty()
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cmd={} ttype={} trigger={} tip=0x{:x} mask=0x{:x} seed=0x{:x} sel={} thread={} detach={}",
            self.cmd,
            self.ttype,
            self.trigger,
            self.tip,
            self.mask,
            self.seed,
            self.sel,
            self.target_thread,
            self.detach,
        )
    }
}
