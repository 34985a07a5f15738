//! C2: the trigger predicate (spec §4.2).
//!
//! The original tool selects one of twelve named C functions
//! (`find_instr`, `find_waddr`, …, `find_ip_iter`) at startup, one pair per
//! `TriggerType` crossed with "any address" vs. "specific address". Since
//! every pair differs only in which counter it reads and whether it also
//! compares the instruction pointer, this crate builds one [`Predicate`]
//! value at planning time instead — a tagged variant the planner binds
//! once, the same dispatch-at-planning-time move the teacher crate makes
//! for its instruction handlers.

use crate::config::{
    Config,
    TriggerType,
};
use crate::counters::Counters;
use crate::host::Addr;

/// A pure, side-effect-free predicate over `(thread, ip, counters)`,
/// equivalent to one of the original's twelve `find_*` functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Predicate {
    ttype: TriggerType,
    /// `0` means "any address".
    tip: Addr,
    trigger: u64,
    target_thread: u64,
}

impl Predicate {
    /// Build the predicate for this configuration (spec §4.2). Callers must
    /// have already run [`Config::validate`] — this constructor does not
    /// re-check the `IT`-needs-`tip` invariant.
    pub fn new(config: &Config) -> Self {
        Predicate {
            ttype: config.ttype,
            tip: config.tip,
            trigger: config.trigger,
            target_thread: config.target_thread,
        }
    }

    /// Evaluate the predicate. `false` whenever `thread != target_thread`,
    /// regardless of everything else (spec §4.2 "All twelve predicates gate
    /// on thread == target_thread first").
    pub fn evaluate(&self, thread: u64, ip: Addr, counters: &Counters) -> bool {
        if thread != self.target_thread {
            return false;
        }
        let threshold_met = self.trigger <= counters.get(self.ttype);
        if self.tip == 0 {
            threshold_met
        } else {
            ip == self.tip && threshold_met
        }
    }

    /// The counter this predicate consults.
    pub fn ttype(&self) -> TriggerType {
        self.ttype
    }

    /// The configured target address, or `0` for "any address".
    pub fn tip(&self) -> Addr {
        self.tip
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Command;
    use crate::counters::CounterKind;
    use rstest::rstest;

    fn counters_with(kind: CounterKind, n: u64) -> Counters {
        let mut c = Counters::new();
        for _ in 0..n {
            c.advance(kind);
        }
        c
    }

    #[rstest]
    #[case(TriggerType::Instr, CounterKind::Instr)]
    #[case(TriggerType::ReadAddr, CounterKind::ReadAddr)]
    #[case(TriggerType::WriteAddr, CounterKind::WriteAddr)]
    #[case(TriggerType::ReadReg, CounterKind::ReadReg)]
    #[case(TriggerType::WriteReg, CounterKind::WriteReg)]
    fn fires_on_threshold_without_tip(#[case] ttype: TriggerType, #[case] kind: CounterKind) {
        let config = Config {
            cmd: Command::Cf,
            ttype,
            trigger: 5,
            tip: 0,
            ..Config::default()
        };
        let pred = Predicate::new(&config);

        assert!(!pred.evaluate(0, 0, &counters_with(kind, 4)));
        assert!(pred.evaluate(0, 0, &counters_with(kind, 5)));
        assert!(pred.evaluate(0, 0x1234, &counters_with(kind, 5)));
    }

    #[test]
    fn iteration_requires_tip_match_too() {
        let config = Config {
            cmd: Command::Cf,
            ttype: TriggerType::Iteration,
            trigger: 3,
            tip: 0x4005a0,
            ..Config::default()
        };
        let pred = Predicate::new(&config);
        let counters = counters_with(CounterKind::Iteration, 3);

        assert!(pred.evaluate(0, 0x4005a0, &counters));
        assert!(!pred.evaluate(0, 0x4005a1, &counters));
    }

    #[test]
    fn non_target_thread_never_fires() {
        let config = Config {
            cmd: Command::Cf,
            trigger: 1,
            target_thread: 2,
            ..Config::default()
        };
        let pred = Predicate::new(&config);
        let counters = counters_with(CounterKind::Instr, 100);

        assert!(!pred.evaluate(0, 0, &counters));
        assert!(!pred.evaluate(1, 0, &counters));
        assert!(pred.evaluate(2, 0, &counters));
    }

    #[test]
    fn threshold_is_crossed_not_just_equaled() {
        let config = Config {
            cmd: Command::Cf,
            trigger: 10,
            ..Config::default()
        };
        let pred = Predicate::new(&config);

        assert!(pred.evaluate(0, 0, &counters_with(CounterKind::Instr, 11)));
        assert!(pred.evaluate(0, 0, &counters_with(CounterKind::Instr, 10)));
        assert!(!pred.evaluate(0, 0, &counters_with(CounterKind::Instr, 9)));
    }
}
