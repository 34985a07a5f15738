//! Command-line configuration surface (spec §6 table, §4.10).
//!
//! Grounded in the pack's `intercept-bounce` xtask CLI:
//! [`clap::Parser`] derive plus an `anyhow`-returning conversion into the
//! library's own config type, rather than hand-rolling argument parsing the
//! way the original tool's `KNOB` macros do.

use std::str::FromStr;

use clap::Parser;

use crate::config::{
    Command,
    Config,
    TriggerType,
};

/// Command-line arguments mirroring spec §6's configuration table
/// one-to-one.
#[derive(Debug, Parser)]
#[command(name = "bfi", about = "Binary fault-injection engine")]
pub struct Args {
    /// Path to write event records and the final summary to. Omit, or pass
    /// the literal `NONE`, to write to stderr.
    #[arg(long)]
    pub log: Option<String>,

    /// Threshold on the counter selected by `--ttype`. Required for every
    /// command except `FIND` used in address-scan mode (`--ip` given, no
    /// `--trigger`).
    #[arg(long, default_value_t = 0)]
    pub trigger: u64,

    /// Which counter the trigger predicate consults: IN, RA, WA, RR, WR, IT.
    #[arg(long, default_value = "IN")]
    pub ttype: String,

    /// Which injector (or the read-only finder) to run: CF, RVAL, WVAL,
    /// RADDR, WADDR, RREG, WREG, TXT, FIND.
    #[arg(long, default_value = "NONE")]
    pub cmd: String,

    /// Function name delimiting an activation window. Repeatable.
    #[arg(short = 'm', long = "method")]
    pub methods: Vec<String>,

    /// Target instruction address. Required when `--ttype IT`.
    #[arg(long, default_value_t = 0)]
    pub ip: u64,

    /// Worker thread id whose instructions are eligible.
    #[arg(long, default_value_t = 0)]
    pub thread: u64,

    /// Detach from the host once the one injection completes.
    #[arg(long, default_value_t = false)]
    pub detach: bool,

    /// PRNG seed for operand/byte selection. `0` disables randomness.
    #[arg(long, default_value_t = 0xDEAD_BEEF)]
    pub seed: u64,

    /// Bit-mask XORed into the victim bits.
    #[arg(long, default_value_t = 0x01)]
    pub mask: u64,

    /// Pin the operand/register/byte index, overriding `--seed`.
    #[arg(long, default_value_t = -1)]
    pub sel: i64,
}

impl Args {
    /// Convert parsed arguments into a validated [`Config`] (spec §4.10).
    pub fn into_config(self) -> anyhow::Result<Config> {
        let cmd = Command::from_str(&self.cmd)
            .map_err(|_| crate::error::ConfigError::UnknownCommand(self.cmd.clone()))?;
        let ttype = TriggerType::from_str(&self.ttype)
            .map_err(|_| crate::error::ConfigError::UnknownTriggerType(self.ttype.clone()))?;

        let config = Config {
            cmd,
            ttype,
            trigger: self.trigger,
            tip: self.ip,
            mask: self.mask,
            seed: self.seed,
            sel: self.sel,
            target_thread: self.thread,
            detach: self.detach,
            funcs: self.methods,
        };
        config.validate()?;
        Ok(config)
    }
}
