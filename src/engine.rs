//! The per-execution dispatch loop tying C1–C7 together.
//!
//! A production host backend owns one [`Engine`] per attached process and
//! calls [`Engine::on_instruction`] from its instruction-instrumentation
//! callback, [`Engine::on_function_enter`]/[`Engine::on_function_exit`] from
//! its routine-level hooks, and [`Engine::finish`] from its at-exit hook
//! (spec §6 interfaces (a), (h), (j)).

use std::collections::HashMap;

use rand::SeedableRng;

use crate::config::Config;
use crate::error::BfiError;
use crate::host::{
    Addr,
    Host,
    InstructionView,
    Memory,
    RegisterContext,
};
use crate::inject;
use crate::planner::{
    self,
    InstructionPlan,
    PlannedAction,
};
use crate::report::Sink;
use crate::session::Session;

/// Owns the session, the memoized per-address plans, and the PRNG stream
/// shared across every TXT/RVAL/WVAL/RADDR/WADDR selection (spec §9's
/// "global mutable ... PRNG seed", now scoped to this object instead of a
/// module-level static).
pub struct Engine {
    session: Session,
    plans: HashMap<Addr, InstructionPlan>,
    rng: rand::rngs::StdRng,
}

impl Engine {
    /// Build an engine against an already-attached `host`: validates
    /// `config`, resolves any monitored function names (spec §6 interface
    /// (h)), and pre-arms the text-patching scratch buffer when `cmd ==
    /// TXT` (spec §9 "pre-allocate at startup").
    pub fn new(config: Config, sink: Sink, host: &mut impl Host) -> Result<Self, BfiError> {
        config.validate()?;

        let sites = host.resolve_functions(&config.funcs);
        let is_txt = config.cmd == crate::config::Command::Txt;
        let rng = rand::rngs::StdRng::seed_from_u64(config.seed);

        let mut session = Session::new(config, sites, sink);
        if is_txt {
            session.state_mut().arm_text_buffer(host);
        }

        Ok(Engine {
            session,
            plans: HashMap::new(),
            rng,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Called by the host on entry to a monitored function (spec §4.6,
    /// §6 interface (h)).
    pub fn on_function_enter(&mut self, host: &mut impl Host, thread: u64, ip: Addr) {
        if thread != self.session.config().target_thread {
            return;
        }
        if let Some((name, iteration)) = self.session.monitor_mut().enter(ip) {
            self.session.log_event(
                host,
                ip,
                thread,
                format!("enter {name} iteration = {iteration}"),
            );
        }
    }

    /// Called by the host on return from a monitored function.
    pub fn on_function_exit(&mut self, host: &mut impl Host, thread: u64, ip: Addr) {
        if thread != self.session.config().target_thread {
            return;
        }
        if let Some(name) = self.session.monitor_mut().leave(ip) {
            self.session.log_event(host, ip, thread, format!("leave {name}"));
        }
    }

    /// Called by the host on every dynamic execution of `view` (spec §2
    /// flow: "each target-thread instruction first advances C1, then — if
    /// gated — evaluates C2 ..."). `ctx` is the saved register context for
    /// this execution; it also implements [`Memory`] for RVAL/WVAL.
    pub fn on_instruction(
        &mut self,
        host: &mut impl Host,
        ctx: &mut (impl RegisterContext + Memory),
        thread: u64,
        view: &InstructionView,
    ) -> Result<(), BfiError> {
        if !self.plans.contains_key(&view.address) {
            let config = self.session.config().clone();
            let plan = planner::build_plan(
                &config,
                self.session.state_mut(),
                &mut self.rng,
                host,
                view,
            )?;
            self.plans.insert(view.address, plan);
        }
        let plan = *self.plans.get(&view.address).expect("just inserted");

        if self.session.is_active(thread) {
            plan.counters.advance(self.session.counters_mut());
        }

        let Some(action) = plan.action else {
            return Ok(());
        };

        let ip = view.address;
        let detach = self.session.config().detach;
        let counters = *self.session.counters();
        let fires = plan.predicate.evaluate(thread, ip, &counters);

        match action {
            PlannedAction::Find { terminate } => {
                if fires {
                    let read = view.memory_operands.iter().filter(|o| o.access.read).count() as u32;
                    let write = view.memory_operands.iter().filter(|o| o.access.write).count() as u32;
                    let event = inject::find(
                        ip,
                        read,
                        write,
                        view.read_registers.len() as u32,
                        view.write_registers.len() as u32,
                        terminate,
                    );
                    self.session.log_event(host, event.ip, thread, event.body);
                    if terminate {
                        host.detach();
                    }
                }
            }

            PlannedAction::Cf => {
                if fires {
                    if let Some(event) =
                        inject::cf(self.session.state(), self.session.config().mask, detach, ctx, host)
                    {
                        self.session.log_event(host, event.ip, thread, event.body);
                    }
                }
            }

            PlannedAction::Txt {
                address,
                next_address,
                size,
            } => {
                if fires {
                    let mask = self.session.config().mask;
                    let sel = self.session.config().sel;
                    let seed = self.session.config().seed;
                    if let Some(event) = inject::txt(
                        self.session.state_mut(),
                        mask,
                        sel,
                        seed,
                        &mut self.rng,
                        address,
                        next_address,
                        size,
                        &view.raw_bytes,
                        &inject::TRAMPOLINE,
                        detach,
                        ctx,
                        host,
                    ) {
                        self.session.log_event(host, event.ip, thread, event.body);
                    }
                }
            }

            PlannedAction::Rval { operand_index } => {
                if fires {
                    if let Some(op) = view
                        .memory_operands
                        .iter()
                        .filter(|o| o.access.read)
                        .nth(operand_index)
                    {
                        let mask = self.session.config().mask;
                        if let Some(event) = inject::val(
                            self.session.state(),
                            mask,
                            ip,
                            op.effective_addr,
                            op.size,
                            op.access,
                            operand_index,
                            detach,
                            ctx,
                            host,
                        ) {
                            self.session.log_event(host, event.ip, thread, event.body);
                        }
                    }
                }
            }

            PlannedAction::Wval { operand_index } => {
                if fires {
                    if let Some(op) = view
                        .memory_operands
                        .iter()
                        .filter(|o| o.access.write)
                        .nth(operand_index)
                    {
                        let mask = self.session.config().mask;
                        if let Some(event) = inject::val(
                            self.session.state(),
                            mask,
                            ip,
                            op.effective_addr,
                            op.size,
                            op.access,
                            operand_index,
                            detach,
                            ctx,
                            host,
                        ) {
                            self.session.log_event(host, event.ip, thread, event.body);
                        }
                    }
                }
            }

            PlannedAction::Raddr {
                operand_index,
                scratch,
            }
            | PlannedAction::Waddr {
                operand_index,
                scratch,
            } => {
                let side_is_read = matches!(action, PlannedAction::Raddr { .. });
                if let Some(op) = view
                    .memory_operands
                    .iter()
                    .filter(|o| if side_is_read { o.access.read } else { o.access.write })
                    .nth(operand_index)
                {
                    let mask = self.session.config().mask;
                    let (value, event) = inject::addr(
                        thread,
                        ip,
                        &plan.predicate,
                        &counters,
                        self.session.state(),
                        mask,
                        op.effective_addr,
                        op.size,
                        op.access,
                        operand_index,
                        detach,
                        host,
                    );
                    ctx.write_reg(scratch, value);
                    if let Some(event) = event {
                        self.session.log_event(host, event.ip, thread, event.body);
                    }
                    inject::addr_notify_breakpoint(thread, ip, &plan.predicate, &counters, host);
                }
            }

            PlannedAction::Rreg { reg_index } => {
                if fires {
                    if let Some(&target) = view.read_registers.get(reg_index) {
                        let mask = self.session.config().mask;
                        if let Some(event) =
                            inject::reg(self.session.state(), mask, ip, target, detach, ctx, host)
                        {
                            self.session.log_event(host, event.ip, thread, event.body);
                        }
                    }
                }
            }

            PlannedAction::Wreg { reg_index } => {
                if fires {
                    if let Some(&target) = view.write_registers.get(reg_index) {
                        let mask = self.session.config().mask;
                        if let Some(event) =
                            inject::reg(self.session.state(), mask, ip, target, detach, ctx, host)
                        {
                            self.session.log_event(host, event.ip, thread, event.body);
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Emit the final summary (spec §4.7, §6 interface (j) at-exit hook).
    pub fn finish(&mut self) {
        self.session.finish();
    }
}
