//! C7: session state and the event-record half of reporting (spec §4.7).
//!
//! `Session` owns everything that exists once per tool attachment and
//! outlives any single instruction: the immutable configuration, the six
//! counters, the function monitor, the one-shot runtime state, the output
//! sink, and the start time used for the final `ELAPSED` line. `Engine`
//! (the per-instruction dispatch loop) borrows it every call.

use std::time::Instant;

use crate::config::Config;
use crate::counters::Counters;
use crate::host::{
    Addr,
    Host,
};
use crate::monitor::FunctionMonitor;
use crate::report::{
    Record,
    Sink,
    Summary,
};
use crate::state::RuntimeState;

/// Everything the session needs to exist once, for the lifetime of one host
/// attachment (spec §9 "a single process-wide tool-state object owned by
/// the session").
pub struct Session {
    config: Config,
    counters: Counters,
    monitor: FunctionMonitor,
    state: RuntimeState,
    sink: Sink,
    start: Instant,
}

impl Session {
    /// Build a session. `function_sites` is the result of resolving
    /// `config.funcs` against the running image (spec §6 interface (h)),
    /// already performed by the caller since only the host can do it.
    pub fn new(
        config: Config,
        function_sites: Vec<Option<crate::host::FunctionSite>>,
        sink: Sink,
    ) -> Self {
        let monitor = FunctionMonitor::new(&config.funcs, &function_sites);
        Session {
            config,
            counters: Counters::new(),
            monitor,
            state: RuntimeState::new(),
            sink,
            start: Instant::now(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn counters_mut(&mut self) -> &mut Counters {
        &mut self.counters
    }

    pub fn monitor(&self) -> &FunctionMonitor {
        &self.monitor
    }

    pub fn monitor_mut(&mut self) -> &mut FunctionMonitor {
        &mut self.monitor
    }

    pub fn state(&self) -> &RuntimeState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut RuntimeState {
        &mut self.state
    }

    /// `true` iff counting/injection should be evaluated for this thread
    /// right now: the thread matches `target_thread` and, if any functions
    /// are monitored, execution is currently inside one of them (spec §3
    /// "Entity: Counters" invariant, §4.6).
    pub fn is_active(&self, thread: u64) -> bool {
        thread == self.config.target_thread && self.monitor.enabled()
    }

    /// Write one event record, resolving its source location through
    /// `host` (spec §6 interface (g); degrades to unknown file/line on
    /// failure per §7 `TransientHostError`).
    pub fn log_event(&mut self, host: &mut impl Host, ip: Addr, thread: u64, body: String) {
        let location = host.symbolize(ip);
        let record = Record {
            ip,
            counters: self.counters,
            thread,
            file: location.as_ref().and_then(|l| l.file.clone()),
            line: location.and_then(|l| l.line),
            body,
        };
        let _ = self.sink.write_display(&record);
    }

    /// Emit the final summary (spec §4.7), called once at process exit.
    pub fn finish(&mut self) {
        let summary = Summary {
            counters: self.counters,
            trigger: self.config.trigger,
            ttype: self.config.ttype,
            cmd: self.config.cmd,
            sel: self.config.sel,
            seed: self.config.seed,
            mask: self.config.mask,
            target_thread: self.config.target_thread,
            elapsed: self.start.elapsed(),
        };
        let _ = self.sink.write_display(&summary);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::fake::FakeHost;

    #[test]
    fn is_active_gates_on_resolved_function_span() {
        let config = Config {
            target_thread: 1,
            funcs: vec!["work".to_string()],
            ..Config::default()
        };
        let sites = vec![Some(crate::host::FunctionSite {
            entry: 0x1000,
            exit: 0x1100,
        })];
        let mut session = Session::new(config, sites, Sink::Stderr);
        assert!(!session.is_active(1), "not yet inside the monitored function");

        session.monitor_mut().enter(0x1000);
        assert!(session.is_active(1));
    }

    #[test]
    fn is_active_with_no_monitors_follows_thread_only() {
        let config = Config {
            target_thread: 2,
            ..Config::default()
        };
        let session = Session::new(config, vec![], Sink::Stderr);
        assert!(session.is_active(2));
        assert!(!session.is_active(0));
    }

    #[test]
    fn log_event_degrades_gracefully_without_symbols() {
        let mut session = Session::new(Config::default(), vec![], Sink::Stderr);
        let mut host = FakeHost::new();
        session.log_event(&mut host, 0x1000, 0, "test".to_string());
    }
}
