//! C3: the instrumentation planner (spec §4.3).
//!
//! `build_plan` runs exactly once per newly observed instruction address —
//! the engine memoizes the result by address, the same "plan once, dispatch
//! a direct call at runtime" move spec §9 asks for. Operand/register/byte
//! selection follows two distinct rules recovered from `bfi.cpp`:
//! `sel`/`seed`/PRNG for TXT, RVAL/WVAL and RADDR/WADDR, but a PRNG-less
//! `sel`-or-zero rule for RREG/WREG — the original's `instrument_rreg`/
//! `instrument_wreg` never call `rand_r`.

use rand::RngCore;

use crate::config::{
    Command,
    Config,
};
use crate::error::BfiError;
use crate::host::{
    Addr,
    Host,
    InstructionView,
    RegId,
};
use crate::state::RuntimeState;
use crate::trigger::Predicate;

/// Pick an operand/byte index for TXT, RVAL/WVAL, RADDR/WADDR (spec §4.3 TXT
/// step 4, mirrored for the other commands by `bfi.cpp`'s `instrument_addr`):
/// `sel` if set, else `0` when `seed == 0`, else a PRNG draw.
fn select_with_prng(sel: i64, seed: u64, rng: &mut impl RngCore) -> u64 {
    if sel >= 0 {
        sel as u64
    } else if seed == 0 {
        0
    } else {
        rng.next_u64()
    }
}

/// Pick a register index for RREG/WREG (spec §4.3): `sel` if set, else `0`.
/// No PRNG fallback, unlike every other command.
fn select_fixed(sel: i64) -> u64 {
    if sel >= 0 {
        sel as u64
    } else {
        0
    }
}

/// How many times each counter advances for one execution of this
/// instruction (spec §4.1). Only the counter matching the active `ttype` is
/// ever non-zero besides `instr`, which always advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CounterPlan {
    pub raddr: u32,
    pub waddr: u32,
    pub rreg: u32,
    pub wreg: u32,
    pub iter: bool,
}

impl CounterPlan {
    fn build(config: &Config, view: &InstructionView) -> Self {
        use crate::config::TriggerType::*;

        let read_ops = view
            .memory_operands
            .iter()
            .filter(|op| op.access.read)
            .count() as u32;
        let write_ops = view
            .memory_operands
            .iter()
            .filter(|op| op.access.write)
            .count() as u32;

        CounterPlan {
            raddr: if config.ttype == ReadAddr { read_ops } else { 0 },
            waddr: if config.ttype == WriteAddr { write_ops } else { 0 },
            rreg: if config.ttype == ReadReg && view.has_fallthrough {
                view.read_registers.len() as u32
            } else {
                0
            },
            wreg: if config.ttype == WriteReg && view.has_fallthrough {
                view.write_registers.len() as u32
            } else {
                0
            },
            iter: config.tip != 0 && view.address == config.tip,
        }
    }

    /// Advance `counters` by this plan's amounts, for one execution.
    pub fn advance(&self, counters: &mut crate::counters::Counters) {
        use crate::counters::CounterKind;
        counters.advance(CounterKind::Instr);
        for _ in 0..self.raddr {
            counters.advance(CounterKind::ReadAddr);
        }
        for _ in 0..self.waddr {
            counters.advance(CounterKind::WriteAddr);
        }
        for _ in 0..self.rreg {
            counters.advance(CounterKind::ReadReg);
        }
        for _ in 0..self.wreg {
            counters.advance(CounterKind::WriteReg);
        }
        if self.iter {
            counters.advance(CounterKind::Iteration);
        }
    }
}

/// The command-specific step the planner attached, if any (spec §4.3's
/// "exactly one of the routines below").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannedAction {
    /// C5: report, terminating only when triggered by a counter threshold
    /// rather than a bare address scan.
    Find { terminate: bool },
    /// Flip the instruction pointer.
    Cf,
    /// Flip one byte of a copied instruction, running it from the
    /// text-patching scratch buffer.
    Txt {
        address: Addr,
        next_address: Addr,
        size: u8,
    },
    /// Flip the 64-bit word at a read-side memory operand's effective
    /// address, before the instruction executes.
    Rval { operand_index: usize },
    /// Flip the 64-bit word at a write-side memory operand's effective
    /// address, after the instruction executes.
    Wval { operand_index: usize },
    /// Rewrite a read-side memory operand's effective address.
    Raddr {
        operand_index: usize,
        scratch: RegId,
    },
    /// Rewrite a write-side memory operand's effective address.
    Waddr {
        operand_index: usize,
        scratch: RegId,
    },
    /// Flip a read register's value, before the instruction executes.
    Rreg { reg_index: usize },
    /// Flip a write register's value, after the instruction executes.
    Wreg { reg_index: usize },
}

/// Everything the engine needs to drive one instruction address forever
/// after the first time it is observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstructionPlan {
    pub address: Addr,
    pub counters: CounterPlan,
    pub predicate: Predicate,
    pub action: Option<PlannedAction>,
}

/// Build the plan for one newly observed instruction (spec §4.3). The
/// counter plan is always built, even when `NoCandidate` (spec §7) leaves
/// `action` as `None` — an eligible-operand/register count of zero for the
/// active command is not an error, just silent non-instrumentation of the
/// command-specific step.
pub fn build_plan(
    config: &Config,
    state: &mut RuntimeState,
    rng: &mut impl RngCore,
    host: &mut impl Host,
    view: &InstructionView,
) -> Result<InstructionPlan, BfiError> {
    let counters = CounterPlan::build(config, view);
    let predicate = Predicate::new(config);

    let action = match config.cmd {
        Command::None => None,

        Command::Find => Some(PlannedAction::Find {
            terminate: config.trigger != 0,
        }),

        Command::Cf => Some(PlannedAction::Cf),

        Command::Txt => Some(PlannedAction::Txt {
            address: view.address,
            next_address: view.next_address,
            size: view.size,
        }),

        Command::Rval => {
            let read_count = view.memory_operands.iter().filter(|o| o.access.read).count();
            if read_count == 0 {
                None
            } else {
                let idx = select_with_prng(config.sel, config.seed, rng) as usize % read_count;
                Some(PlannedAction::Rval { operand_index: idx })
            }
        }

        Command::Wval => {
            let write_count = view.memory_operands.iter().filter(|o| o.access.write).count();
            if write_count == 0 {
                None
            } else {
                let idx = select_with_prng(config.sel, config.seed, rng) as usize % write_count;
                Some(PlannedAction::Wval { operand_index: idx })
            }
        }

        Command::Raddr => {
            let read_count = view.memory_operands.iter().filter(|o| o.access.read).count();
            if read_count == 0 {
                None
            } else {
                let idx = select_with_prng(config.sel, config.seed, rng) as usize % read_count;
                let scratch = state.scratch_reg(idx, host)?;
                host.rewrite_memory_operand(view.address, idx, scratch);
                Some(PlannedAction::Raddr {
                    operand_index: idx,
                    scratch,
                })
            }
        }

        Command::Waddr => {
            let write_count = view.memory_operands.iter().filter(|o| o.access.write).count();
            if write_count == 0 {
                None
            } else {
                let idx = select_with_prng(config.sel, config.seed, rng) as usize % write_count;
                let scratch = state.scratch_reg(idx, host)?;
                host.rewrite_memory_operand(view.address, idx, scratch);
                Some(PlannedAction::Waddr {
                    operand_index: idx,
                    scratch,
                })
            }
        }

        Command::Rreg => {
            let count = view.read_registers.len();
            if count == 0 {
                None
            } else {
                let idx = select_fixed(config.sel) as usize % count;
                Some(PlannedAction::Rreg { reg_index: idx })
            }
        }

        Command::Wreg => {
            if !view.has_fallthrough || view.write_registers.is_empty() {
                None
            } else {
                let count = view.write_registers.len();
                let idx = select_fixed(config.sel) as usize % count;
                Some(PlannedAction::Wreg { reg_index: idx })
            }
        }
    };

    Ok(InstructionPlan {
        address: view.address,
        counters,
        predicate,
        action,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{
        fake::FakeHost,
        Access,
        MemoryOperand,
    };
    use rand::SeedableRng;

    fn view_with_ops(address: Addr, ops: Vec<MemoryOperand>) -> InstructionView {
        InstructionView {
            address,
            next_address: address + 4,
            size: 4,
            has_fallthrough: true,
            memory_operands: ops,
            read_registers: vec![],
            write_registers: vec![],
            raw_bytes: [0; 8],
        }
    }

    #[test]
    fn rval_skips_instructions_with_no_read_operand() {
        let config = Config {
            cmd: Command::Rval,
            trigger: 1,
            ..Config::default()
        };
        let mut state = RuntimeState::new();
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        let mut host = FakeHost::new();
        let view = view_with_ops(0x1000, vec![]);

        let plan = build_plan(&config, &mut state, &mut rng, &mut host, &view).unwrap();
        assert!(plan.action.is_none());
    }

    #[test]
    fn raddr_claims_a_scratch_register_and_rewrites_the_operand() {
        let config = Config {
            cmd: Command::Raddr,
            ttype: crate::config::TriggerType::Instr,
            trigger: 1,
            sel: 0,
            ..Config::default()
        };
        let mut state = RuntimeState::new();
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        let mut host = FakeHost::new();
        let view = view_with_ops(
            0x2000,
            vec![MemoryOperand {
                effective_addr: 0x5000,
                size: 8,
                access: Access {
                    read: true,
                    write: false,
                },
                base_reg: None,
            }],
        );

        let plan = build_plan(&config, &mut state, &mut rng, &mut host, &view).unwrap();
        match plan.action {
            Some(PlannedAction::Raddr { operand_index, .. }) => assert_eq!(operand_index, 0),
            other => panic!("unexpected action: {other:?}"),
        }
        assert_eq!(host.rewritten_operands().len(), 1);
        assert_eq!(state.scratch_reg_count(), 1);
    }

    #[test]
    fn rreg_selection_never_consumes_the_prng() {
        // sel == -1 with a non-zero seed: RREG/WREG must still pick index 0
        // rather than drawing from the PRNG (unlike TXT/VAL/ADDR).
        let config = Config {
            cmd: Command::Rreg,
            trigger: 1,
            sel: -1,
            seed: 0x1234,
            ..Config::default()
        };
        let mut state = RuntimeState::new();
        let mut rng = rand::rngs::StdRng::seed_from_u64(config.seed);
        let mut host = FakeHost::new();
        let mut view = view_with_ops(0x3000, vec![]);
        view.read_registers = vec![RegId(1), RegId(2)];

        let plan = build_plan(&config, &mut state, &mut rng, &mut host, &view).unwrap();
        assert_eq!(plan.action, Some(PlannedAction::Rreg { reg_index: 0 }));
    }

    #[test]
    fn wreg_requires_fallthrough_and_write_registers() {
        let config = Config {
            cmd: Command::Wreg,
            trigger: 1,
            ..Config::default()
        };
        let mut state = RuntimeState::new();
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        let mut host = FakeHost::new();
        let mut view = view_with_ops(0x3000, vec![]);
        view.has_fallthrough = false;
        view.write_registers = vec![RegId(1)];

        let plan = build_plan(&config, &mut state, &mut rng, &mut host, &view).unwrap();
        assert!(plan.action.is_none());
    }

    #[test]
    fn iter_counter_only_matches_configured_tip() {
        let config = Config {
            tip: 0x4000,
            ..Config::default()
        };
        let mut state = RuntimeState::new();
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        let mut host = FakeHost::new();

        let matching = view_with_ops(0x4000, vec![]);
        let other = view_with_ops(0x4004, vec![]);

        let plan_a = build_plan(&config, &mut state, &mut rng, &mut host, &matching).unwrap();
        let plan_b = build_plan(&config, &mut state, &mut rng, &mut host, &other).unwrap();
        assert!(plan_a.counters.iter);
        assert!(!plan_b.counters.iter);
    }
}
