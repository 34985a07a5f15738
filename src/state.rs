//! Mutable runtime state (spec §3 "Entity: Runtime State").
//!
//! Grounded in the teacher's `state/debugger.rs` pattern of a small owned
//! struct threaded through the interpreter that tracks one-shot/stepping
//! state; here it tracks the one-shot injection flag, the scratch-register
//! pool, and the text-patching scratch buffer instead of breakpoint steps.

use std::sync::atomic::{
    AtomicBool,
    Ordering,
};

use crate::host::{
    Addr,
    RegId,
};

/// Size of the executable scratch region backing the TXT injector (spec §3,
/// §9 "pre-allocate at startup").
pub const TEXT_BUFFER_LEN: usize = 256;

/// Mutable state shared by every planned instruction for the lifetime of one
/// host attachment (spec §3 "Entity: Runtime State", §9 "single process-wide
/// tool-state object owned by the session").
#[derive(Debug)]
pub struct RuntimeState {
    /// One-shot flag: false until the first (and only) injection commits.
    /// An `AtomicBool` flipped with `compare_exchange` rather than the plain
    /// bool spec §5 says "suffices" under the single-worker contract — see
    /// `try_mark_injected`.
    injected: AtomicBool,
    /// Host-claimed tool-private registers, indexed by memory-operand
    /// ordinal and grown on demand (spec §3, §9 "deliberately not reset
    /// between instructions").
    scratch_regs: Vec<RegId>,
    /// Raw copy of the victim instruction plus its trampoline, executed in
    /// place after a TXT injection.
    text_buffer: [u8; TEXT_BUFFER_LEN],
    /// Address the host mapped `text_buffer` at, once armed.
    text_buffer_addr: Option<Addr>,
}

impl RuntimeState {
    /// A fresh state: nothing injected, no scratch registers claimed, no
    /// text buffer armed yet.
    pub fn new() -> Self {
        RuntimeState {
            injected: AtomicBool::new(false),
            scratch_regs: Vec::new(),
            text_buffer: [0u8; TEXT_BUFFER_LEN],
            text_buffer_addr: None,
        }
    }

    /// `true` once the one-shot injection has committed.
    pub fn is_injected(&self) -> bool {
        self.injected.load(Ordering::SeqCst)
    }

    /// Attempt to claim the one-shot injection. Returns `true` exactly once
    /// across the lifetime of this state, regardless of how many threads or
    /// instruction executions race to call it (spec §5 "one-shot
    /// discipline").
    pub fn try_mark_injected(&self) -> bool {
        self.injected
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// The scratch register reserved for memory-operand ordinal `ordinal`,
    /// claiming a fresh one from `host` the first time this ordinal is
    /// requested (spec §4.3 RADDR/WADDR step 1, §9 "indexed by
    /// memory-operand ordinal").
    pub fn scratch_reg(
        &mut self,
        ordinal: usize,
        host: &mut impl crate::host::Host,
    ) -> Result<RegId, crate::error::ResourceError> {
        while self.scratch_regs.len() <= ordinal {
            let reg = host.claim_register()?;
            self.scratch_regs.push(reg);
        }
        Ok(self.scratch_regs[ordinal])
    }

    /// Number of scratch registers claimed so far. Exposed for tests and
    /// summary diagnostics.
    pub fn scratch_reg_count(&self) -> usize {
        self.scratch_regs.len()
    }

    /// Arm the text buffer with `host`, recording the address it was mapped
    /// at. Idempotent: later calls are no-ops, matching the original's
    /// single startup-time allocation.
    pub fn arm_text_buffer(&mut self, host: &mut impl crate::host::Host) -> Addr {
        if let Some(addr) = self.text_buffer_addr {
            return addr;
        }
        let addr = host.arm_executable_scratch(&self.text_buffer);
        self.text_buffer_addr = Some(addr);
        addr
    }

    /// Mutable access to the text buffer's bytes, for the TXT injector to
    /// populate before control resumes there.
    pub fn text_buffer_mut(&mut self) -> &mut [u8; TEXT_BUFFER_LEN] {
        &mut self.text_buffer
    }

    /// The address the text buffer was armed at, if any.
    pub fn text_buffer_addr(&self) -> Option<Addr> {
        self.text_buffer_addr
    }
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::fake::FakeHost;

    #[test]
    fn injected_flips_exactly_once() {
        let state = RuntimeState::new();
        assert!(!state.is_injected());
        assert!(state.try_mark_injected());
        assert!(state.is_injected());
        assert!(!state.try_mark_injected());
    }

    #[test]
    fn scratch_regs_grow_monotonically_and_memoize_by_ordinal() {
        let mut state = RuntimeState::new();
        let mut host = FakeHost::new();

        let r0 = state.scratch_reg(0, &mut host).unwrap();
        let r1 = state.scratch_reg(1, &mut host).unwrap();
        let r0_again = state.scratch_reg(0, &mut host).unwrap();

        assert_eq!(r0, r0_again);
        assert_ne!(r0, r1);
        assert_eq!(state.scratch_reg_count(), 2);
    }

    #[test]
    fn scratch_reg_exhaustion_surfaces_resource_error() {
        let mut state = RuntimeState::new();
        let mut host = FakeHost::new().with_register_limit(1);

        assert!(state.scratch_reg(0, &mut host).is_ok());
        assert!(state.scratch_reg(1, &mut host).is_err());
    }

    #[test]
    fn arm_text_buffer_is_idempotent() {
        let mut state = RuntimeState::new();
        let mut host = FakeHost::new();

        let a = state.arm_text_buffer(&mut host);
        let b = state.arm_text_buffer(&mut host);
        assert_eq!(a, b);
    }
}
