//! C1: per-thread-filtered event tallies (spec §3 "Entity: Counters",
//! §4.1).
//!
//! Kept as plain `u64` fields rather than atomics: spec §5 states that a
//! single designated worker thread is the only one ever permitted to
//! advance them, so a conformant implementation "may keep counters in
//! plain memory on that assumption". Broadening that contract (accepting
//! increments from more than one thread) is explicitly out of scope here
//! (spec §5, "undefined in this version").

/// The six monotone tallies described in spec §3.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    /// Instructions retired.
    pub instr: u64,
    /// Memory-operand read occurrences.
    pub raddr: u64,
    /// Memory-operand write occurrences.
    pub waddr: u64,
    /// Register-operand read occurrences.
    pub rreg: u64,
    /// Register-operand write occurrences.
    pub wreg: u64,
    /// Occurrences of the target address `tip`, if configured.
    pub iter: u64,
}

impl Counters {
    /// All counters at zero.
    pub const fn new() -> Self {
        Counters {
            instr: 0,
            raddr: 0,
            waddr: 0,
            rreg: 0,
            wreg: 0,
            iter: 0,
        }
    }

    /// Read the counter selected by `ttype` (spec §4.2's `counters.<ttype>`).
    pub const fn get(&self, ttype: crate::config::TriggerType) -> u64 {
        use crate::config::TriggerType::*;
        match ttype {
            Instr => self.instr,
            ReadAddr => self.raddr,
            WriteAddr => self.waddr,
            ReadReg => self.rreg,
            WriteReg => self.wreg,
            Iteration => self.iter,
        }
    }

    /// `instr` always dominates the other five counters (spec §8 universal
    /// invariant). Used by property tests and by the final summary's
    /// internal consistency check.
    pub const fn is_consistent(&self) -> bool {
        self.instr >= self.raddr
            && self.instr >= self.waddr
            && self.instr >= self.rreg
            && self.instr >= self.wreg
            && self.instr >= self.iter
    }
}

/// Which tally a given planner-attached counting callback advances
/// (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterKind {
    /// Advances `instr`, unconditionally attached to every instruction.
    Instr,
    /// Advances `raddr`, once per matching read memory operand.
    ReadAddr,
    /// Advances `waddr`, once per matching write memory operand.
    WriteAddr,
    /// Advances `rreg`, once per read register (fall-through only).
    ReadReg,
    /// Advances `wreg`, once per write register (fall-through only).
    WriteReg,
    /// Advances `iter`, when the instruction address equals `tip`.
    Iteration,
}

impl Counters {
    /// Advance the tally named by `kind`.
    pub fn advance(&mut self, kind: CounterKind) {
        match kind {
            CounterKind::Instr => self.instr += 1,
            CounterKind::ReadAddr => self.raddr += 1,
            CounterKind::WriteAddr => self.waddr += 1,
            CounterKind::ReadReg => self.rreg += 1,
            CounterKind::WriteReg => self.wreg += 1,
            CounterKind::Iteration => self.iter += 1,
        }
    }
}
