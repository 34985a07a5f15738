//! C4/C5: the five injector variants plus the read-only finder (spec
//! §4.4/§4.5).
//!
//! Every function here assumes its caller (`crate::engine::Engine`) has
//! already evaluated the [`Predicate`](crate::trigger::Predicate) for this
//! execution and found it `true` — that is the host's "if"-guard from spec
//! §4.3, already encoded once at planning time. What happens here is the
//! "then"-callback: claim the one-shot injection via
//! [`RuntimeState::try_mark_injected`], mutate architectural state exactly
//! once, and describe what happened for the event log.
//!
//! RADDR/WADDR are the one exception (see [`addr`]): the host's if/then
//! mechanism cannot express an operand rewrite, so that callback runs
//! unconditionally every execution and re-evaluates the predicate itself
//! (spec §4.3 RADDR/WADDR step 2).

use crate::host::{
    Access,
    Addr,
    Host,
    Memory,
    RegId,
    RegisterContext,
};
use crate::state::RuntimeState;
use crate::trigger::Predicate;

/// What an injector did, for the event log (spec §6 "event-specific body
/// line"). `None` from an injector function means the one-shot race was
/// lost (already injected) or, for ADDR, that the recheck failed this call.
#[derive(Debug, Clone)]
pub struct InjectionEvent {
    pub ip: Addr,
    pub body: String,
}

/// `jmp r13` — resumes execution at the fall-through address after the
/// corrupted copy runs from the scratch buffer (spec §9 "%r13 trampoline
/// register").
pub const TRAMPOLINE: [u8; 3] = [0x41, 0xff, 0xe5];

fn maybe_detach(detach: bool, host: &mut impl Host) {
    if detach {
        host.detach();
    }
}

/// CF: XOR the instruction pointer and resume there (spec §4.3 CF).
pub fn cf(
    state: &RuntimeState,
    mask: u64,
    detach: bool,
    ctx: &mut impl RegisterContext,
    host: &mut impl Host,
) -> Option<InjectionEvent> {
    if !state.try_mark_injected() {
        return None;
    }
    maybe_detach(detach, host);

    let ip = ctx.ip();
    let ip_prime = ip ^ mask;
    ctx.set_ip(ip_prime);

    Some(InjectionEvent {
        ip,
        body: format!("ip = {ip:#x}, ip' = {ip_prime:#x}"),
    })
}

/// TXT: copy the victim instruction into the armed scratch buffer, flip one
/// byte of it, and resume execution there (spec §4.3 TXT).
///
/// Unlike every other command, byte-index selection and mask narrowing
/// happen here, at injection time, rather than at planning time — the
/// original only consumes its PRNG draw inside `inject_txt`, which runs at
/// most once.
pub fn txt(
    state: &mut RuntimeState,
    mask: u64,
    sel: i64,
    seed: u64,
    rng: &mut impl rand::RngCore,
    address: Addr,
    next_address: Addr,
    size: u8,
    raw_bytes: &[u8; 8],
    trampoline: &[u8; 3],
    detach: bool,
    ctx: &mut impl RegisterContext,
    host: &mut impl Host,
) -> Option<InjectionEvent> {
    if !state.try_mark_injected() {
        return None;
    }
    maybe_detach(detach, host);

    let size = size as usize;
    debug_assert!(size <= 8);

    // Narrow the mask to fit the instruction (spec §4.3 TXT step 3).
    let narrowed = mask % (1u64 << size.min(63));
    let mask_prime = if narrowed == 0 && mask != 0 { 1 } else { narrowed };

    // Select the victim byte (spec §4.3 TXT step 4).
    let idx = if sel >= 0 {
        sel as u64
    } else if seed == 0 {
        0
    } else {
        rng.next_u64()
    } as usize
        % size;

    let buffer = state.text_buffer_mut();
    buffer[..size].copy_from_slice(&raw_bytes[..size]);
    buffer[size..size + 3].copy_from_slice(trampoline);

    let original_byte = buffer[idx];
    let corrupted_byte = original_byte ^ (mask_prime as u8);
    buffer[idx] = corrupted_byte;

    // Load the trampoline register with the fall-through address so the
    // copied instruction's `jmp` returns to the right place (spec §4.3 TXT
    // step 6).
    let trampoline_reg = host.trampoline_register();
    ctx.write_reg(trampoline_reg, next_address);

    let scratch_addr = state.text_buffer_addr().unwrap_or(0);
    ctx.set_ip(scratch_addr);

    Some(InjectionEvent {
        ip: address,
        body: format!(
            "ip' = {next_address:#x}, size = {size}, mask = {mask_prime:#x}, idx = {idx}, byte = {original_byte:#x}, byte' = {corrupted_byte:#x}"
        ),
    })
}

/// RVAL/WVAL: XOR `mask` into the 64-bit word at a memory operand's
/// effective address (spec §4.3 RVAL/WVAL).
pub fn val(
    state: &RuntimeState,
    mask: u64,
    ip: Addr,
    effective_addr: Addr,
    size: u8,
    access: Access,
    operand_index: usize,
    detach: bool,
    mem: &mut impl Memory,
    host: &mut impl Host,
) -> Option<InjectionEvent> {
    if !state.try_mark_injected() {
        return None;
    }
    maybe_detach(detach, host);

    let correct = mem.read_u64(effective_addr);
    let corrupted = correct ^ mask;
    mem.write_u64(effective_addr, corrupted);

    Some(InjectionEvent {
        ip,
        body: format!(
            "access = {access}, size = {size}, value = {correct}, value' = {corrupted}, addr = {effective_addr:#x}, op = {operand_index}"
        ),
    })
}

/// RREG/WREG: XOR `mask` into a register's value and resume at the mutated
/// context (spec §4.3 RREG/WREG).
pub fn reg(
    state: &RuntimeState,
    mask: u64,
    ip: Addr,
    target: RegId,
    detach: bool,
    ctx: &mut impl RegisterContext,
    host: &mut impl Host,
) -> Option<InjectionEvent> {
    if !state.try_mark_injected() {
        return None;
    }
    maybe_detach(detach, host);

    let value = ctx.read_reg(target);
    let value_prime = value ^ mask;
    ctx.write_reg(target, value_prime);

    Some(InjectionEvent {
        ip,
        body: format!(
            "at ip {ip:#x}, {target:?} = {value:#x}, {target:?}' = {value_prime:#x}"
        ),
    })
}

/// RADDR/WADDR: runs unconditionally every execution (spec §4.3 step 2),
/// re-checking the predicate itself, and always writes a value into
/// `scratch` — the original address on every non-firing call, the corrupted
/// one exactly once.
///
/// Returns `(scratch_value, event)`: `event` is `Some` only on the call that
/// actually commits the one-shot injection.
pub fn addr(
    thread: u64,
    ip: Addr,
    predicate: &Predicate,
    counters: &crate::counters::Counters,
    state: &RuntimeState,
    mask: u64,
    original_addr: Addr,
    size: u8,
    access: Access,
    operand_index: usize,
    detach: bool,
    host: &mut impl Host,
) -> (Addr, Option<InjectionEvent>) {
    let eligible = predicate.evaluate(thread, ip, counters);
    if !eligible || !state.try_mark_injected() {
        return (original_addr, None);
    }
    maybe_detach(detach, host);

    let addr_prime = original_addr ^ mask;
    let event = InjectionEvent {
        ip,
        body: format!(
            "access = {access}, size = {size}, addr = {original_addr:#x}, addr' = {addr_prime:#x}, op = {operand_index}"
        ),
    };
    (addr_prime, Some(event))
}

/// Purely informational post-instruction breakpoint for RADDR/WADDR (spec
/// §4.3 step 4). Fires whenever the predicate holds, independent of whether
/// this call is the one that committed the injection.
pub fn addr_notify_breakpoint(
    thread: u64,
    ip: Addr,
    predicate: &Predicate,
    counters: &crate::counters::Counters,
    host: &mut impl Host,
) {
    if predicate.evaluate(thread, ip, counters) {
        host.notify_breakpoint(thread, ip, "fault injected");
    }
}

/// C5: read-only finder. Never touches `injected`; logs every match (spec
/// §4.5).
pub fn find(
    ip: Addr,
    raddr: u32,
    waddr: u32,
    rreg: u32,
    wreg: u32,
    terminate: bool,
) -> InjectionEvent {
    InjectionEvent {
        ip,
        body: format!("raddr = {raddr}, waddr = {waddr}, rreg = {rreg}, wreg = {wreg}, terminate = {terminate}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::fake::{
        FakeContext,
        FakeHost,
    };
    use rand::SeedableRng;

    #[test]
    fn cf_flips_ip_and_is_one_shot() {
        let state = RuntimeState::new();
        let mut ctx = FakeContext::new(0x1000);
        let mut host = FakeHost::new();

        let first = cf(&state, 0x1, false, &mut ctx, &mut host);
        assert!(first.is_some());
        assert_eq!(ctx.ip(), 0x1001);

        ctx.set_ip(0x2000);
        let second = cf(&state, 0x1, false, &mut ctx, &mut host);
        assert!(second.is_none());
        assert_eq!(ctx.ip(), 0x2000, "second call must not mutate state");
    }

    #[test]
    fn cf_detaches_when_configured() {
        let state = RuntimeState::new();
        let mut ctx = FakeContext::new(0x1000);
        let mut host = FakeHost::new();

        cf(&state, 0x1, true, &mut ctx, &mut host);
        assert!(host.is_detached());
    }

    #[test]
    fn val_xors_the_word_at_the_effective_address() {
        let state = RuntimeState::new();
        let mut ctx = FakeContext::new(0x1000);
        ctx.set_mem(0x5000, 0b1010);
        let mut host = FakeHost::new();

        let event = val(
            &state,
            0b0110,
            0x1000,
            0x5000,
            8,
            Access {
                read: true,
                write: false,
            },
            0,
            false,
            &mut ctx,
            &mut host,
        );
        assert!(event.is_some());
        assert_eq!(ctx.read_u64(0x5000), 0b1100);
    }

    #[test]
    fn txt_narrows_mask_and_flips_one_byte() {
        let mut state = RuntimeState::new();
        let mut host = FakeHost::new();
        state.arm_text_buffer(&mut host);
        let mut ctx = FakeContext::new(0x2000);
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);

        let event = txt(
            &mut state,
            0xFF,
            0,
            0,
            &mut rng,
            0x2000,
            0x2002,
            2,
            &[0xAB, 0xCD, 0, 0, 0, 0, 0, 0],
            &[0x41, 0xff, 0xe5],
            false,
            &mut ctx,
            &mut host,
        )
        .unwrap();

        assert!(event.body.contains("mask = 0x3"));
        assert_eq!(state.text_buffer_mut()[0], 0xAB ^ 0x03);
        assert_eq!(&state.text_buffer_mut()[2..5], &[0x41, 0xff, 0xe5]);
        assert_eq!(ctx.read_reg(host.trampoline_register()), 0x2002);
    }

    #[test]
    fn addr_identity_rewrite_when_predicate_fails() {
        let config = crate::config::Config {
            cmd: crate::config::Command::Raddr,
            trigger: 1000,
            ..crate::config::Config::default()
        };
        let predicate = Predicate::new(&config);
        let counters = crate::counters::Counters::new(); // far below threshold
        let state = RuntimeState::new();
        let mut host = FakeHost::new();

        let (value, event) = addr(
            0,
            0x3000,
            &predicate,
            &counters,
            &state,
            0x1,
            0x9000,
            8,
            Access {
                read: true,
                write: false,
            },
            0,
            false,
            &mut host,
        );
        assert_eq!(value, 0x9000);
        assert!(event.is_none());
    }

    #[test]
    fn addr_commits_once_predicate_holds() {
        let config = crate::config::Config {
            cmd: crate::config::Command::Waddr,
            trigger: 1,
            ..crate::config::Config::default()
        };
        let predicate = Predicate::new(&config);
        let mut counters = crate::counters::Counters::new();
        counters.instr = 1;
        let state = RuntimeState::new();
        let mut host = FakeHost::new();

        let (value, event) = addr(
            0,
            0x3000,
            &predicate,
            &counters,
            &state,
            0x1,
            0x9000,
            8,
            Access {
                read: false,
                write: true,
            },
            0,
            false,
            &mut host,
        );
        assert_eq!(value, 0x9000 ^ 0x1);
        assert!(event.is_some());

        let (value_again, event_again) = addr(
            0,
            0x3000,
            &predicate,
            &counters,
            &state,
            0x1,
            0x9000,
            8,
            Access {
                read: false,
                write: true,
            },
            0,
            false,
            &mut host,
        );
        assert_eq!(value_again, 0x9000, "subsequent calls are identity");
        assert!(event_again.is_none());
    }
}
