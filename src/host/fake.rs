//! An in-memory [`Host`] used to drive this crate's own tests end-to-end,
//! the way `fuel-vm`'s `MemoryStorage` stands in for a production key-value
//! store in its test suite. Not a production DBI backend.

use std::collections::HashMap;

use super::{
    Addr,
    FunctionSite,
    Host,
    Memory,
    RegId,
    RegisterContext,
    SourceLocation,
};
use crate::error::ResourceError;

/// A minimal register file + memory image, playing the role of the host's
/// per-callback `CONTEXT*` and the target's address space.
#[derive(Debug, Default, Clone)]
pub struct FakeContext {
    registers: HashMap<RegId, u64>,
    memory: HashMap<Addr, u64>,
    ip: Addr,
}

impl FakeContext {
    /// Build a context with the instruction pointer at `ip`.
    pub fn new(ip: Addr) -> Self {
        FakeContext {
            registers: HashMap::new(),
            memory: HashMap::new(),
            ip,
        }
    }

    /// Seed a register's initial value (test setup helper).
    pub fn set_reg(&mut self, reg: RegId, value: u64) {
        self.registers.insert(reg, value);
    }

    /// Seed a memory word's initial value (test setup helper).
    pub fn set_mem(&mut self, addr: Addr, value: u64) {
        self.memory.insert(addr, value);
    }
}

impl RegisterContext for FakeContext {
    fn read_reg(&self, reg: RegId) -> u64 {
        *self.registers.get(&reg).unwrap_or(&0)
    }

    fn write_reg(&mut self, reg: RegId, value: u64) {
        self.registers.insert(reg, value);
    }

    fn ip(&self) -> Addr {
        self.ip
    }

    fn set_ip(&mut self, addr: Addr) {
        self.ip = addr;
    }
}

impl Memory for FakeContext {
    fn read_u64(&mut self, addr: Addr) -> u64 {
        *self.memory.get(&addr).unwrap_or(&0)
    }

    fn write_u64(&mut self, addr: Addr, value: u64) {
        self.memory.insert(addr, value);
    }
}

/// A single recorded breakpoint notification, kept for assertions in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    /// Thread that hit the breakpoint.
    pub thread: u64,
    /// Instruction pointer at the time.
    pub ip: Addr,
    /// Host-supplied reason string.
    pub reason: String,
}

/// In-memory fake implementing [`Host`].
#[derive(Debug, Default)]
pub struct FakeHost {
    next_reg: u32,
    register_limit: Option<u32>,
    rewritten_operands: Vec<(Addr, usize, RegId)>,
    executable_scratch: Option<Addr>,
    functions: HashMap<String, FunctionSite>,
    detached: bool,
    breakpoints: Vec<Breakpoint>,
    symbols: HashMap<Addr, SourceLocation>,
}

impl FakeHost {
    /// A fresh host with an unbounded register pool.
    pub fn new() -> Self {
        FakeHost::default()
    }

    /// Cap the number of scratch registers this host will ever hand out,
    /// to exercise `ResourceError::ScratchRegistersExhausted`.
    pub fn with_register_limit(mut self, limit: u32) -> Self {
        self.register_limit = Some(limit);
        self
    }

    /// Register a resolvable function name with its entry/exit addresses.
    pub fn with_function(mut self, name: &str, site: FunctionSite) -> Self {
        self.functions.insert(name.to_string(), site);
        self
    }

    /// Register a known file:line for an address.
    pub fn with_symbol(mut self, addr: Addr, file: &str, line: u32) -> Self {
        self.symbols.insert(
            addr,
            SourceLocation {
                file: Some(file.to_string()),
                line: Some(line),
            },
        );
        self
    }

    /// `true` once `detach()` has been called.
    pub fn is_detached(&self) -> bool {
        self.detached
    }

    /// Breakpoint notifications recorded so far.
    pub fn breakpoints(&self) -> &[Breakpoint] {
        &self.breakpoints
    }

    /// Operand rewrites recorded so far (address, operand index, scratch
    /// register).
    pub fn rewritten_operands(&self) -> &[(Addr, usize, RegId)] {
        &self.rewritten_operands
    }
}

impl Host for FakeHost {
    fn claim_register(&mut self) -> Result<RegId, ResourceError> {
        if let Some(limit) = self.register_limit {
            if self.next_reg >= limit {
                return Err(ResourceError::ScratchRegistersExhausted);
            }
        }
        let id = RegId(self.next_reg);
        self.next_reg += 1;
        Ok(id)
    }

    fn rewrite_memory_operand(&mut self, address: Addr, operand_index: usize, reg: RegId) {
        self.rewritten_operands.push((address, operand_index, reg));
    }

    fn arm_executable_scratch(&mut self, buffer: &[u8; 256]) -> Addr {
        // A fake address far outside any real operand range, just needs to
        // be stable and distinguishable in tests.
        let addr = 0xF00D_0000 + buffer.as_ptr() as u64 % 4096;
        self.executable_scratch = Some(addr);
        addr
    }

    fn trampoline_register(&self) -> RegId {
        RegId(13)
    }

    fn resolve_functions(&mut self, names: &[String]) -> Vec<Option<FunctionSite>> {
        names
            .iter()
            .map(|name| self.functions.get(name).copied())
            .collect()
    }

    fn detach(&mut self) {
        self.detached = true;
    }

    fn notify_breakpoint(&mut self, thread: u64, ip: Addr, reason: &str) {
        self.breakpoints.push(Breakpoint {
            thread,
            ip,
            reason: reason.to_string(),
        });
    }

    fn symbolize(&mut self, ip: Addr) -> Option<SourceLocation> {
        self.symbols.get(&ip).cloned()
    }
}
