//! Error taxonomy for the fault-injection engine.
//!
//! Three variants, matching the policy of the design: configuration errors
//! and resource errors are both fatal (the process exits), candidate
//! mismatches are not errors at all (the planner just skips the
//! instruction, see [`crate::planner`]).

use crate::config::{
    Command,
    TriggerType,
};

/// Errors detected while validating a [`crate::config::Config`], before the
/// target begins executing. All of these are fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// `trigger == 0` on a command that requires one (every command except
    /// `FIND` used in address-scan mode).
    #[error("command {cmd:?} requires a non-zero trigger")]
    MissingTrigger {
        /// The command that was missing a trigger.
        cmd: Command,
    },

    /// `ttype == IT` but no target instruction address (`tip`) was given.
    #[error("trigger type IT requires a target instruction address (--ip)")]
    IterationTriggerNeedsTip,

    /// `cmd` is `RADDR`/`WADDR` and `ttype` is not `IN` or `IT`; the
    /// operand-rewrite re-check guard (see `inject::addr`) only understands
    /// those two trigger types.
    #[error("{cmd:?} only supports trigger types IN and IT, got {ttype:?}")]
    AddrTriggerTypeUnsupported {
        /// The offending command.
        cmd: Command,
        /// The unsupported trigger type.
        ttype: TriggerType,
    },

    /// An unrecognized `--cmd` string was supplied on the configuration
    /// surface.
    #[error("unknown command {0:?}")]
    UnknownCommand(String),

    /// An unrecognized `--ttype` string was supplied on the configuration
    /// surface.
    #[error("unknown trigger type {0:?}")]
    UnknownTriggerType(String),
}

/// Errors that can occur while the target is running. Both variants are
/// fatal: the tool cannot silently "miss" its injection without confusing
/// the caller (see spec §4.4).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResourceError {
    /// The host's scratch-register pool is exhausted; `RADDR`/`WADDR` could
    /// not claim a register to hold the rewritten effective address.
    #[error("scratch register pool exhausted")]
    ScratchRegistersExhausted,
}

/// Top-level error type, unioning the two fatal taxonomies above. This is
/// the error type surfaced to a host backend or to the `cli` binary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BfiError {
    /// A configuration error, detected before the target starts.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A resource error, detected while the target is running.
    #[error(transparent)]
    Resource(#[from] ResourceError),
}
