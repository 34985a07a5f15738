//! C6: function-gated activation (spec §4.6).
//!
//! The original tracks a single global `bool enabled`, which spec §9 calls
//! out as wrong for nested/recursive monitored functions: a nested `leave`
//! clears `enabled` while the outer call is still active. This crate
//! resolves that Open Question with a saturating nesting-depth counter
//! instead (see DESIGN.md) — `enabled()` is `depth > 0`, `enter`
//! increments, `leave` decrements with a floor of zero.

use crate::host::{
    Addr,
    FunctionSite,
};

/// One configured function the monitor watches, resolved to an
/// entry/exit address pair at image load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitoredFunction {
    site: FunctionSite,
    /// Number of times this function has been entered, for the log
    /// record's "iteration = N" field (spec's `func_enter` message).
    entries: u64,
}

/// Gates C1 activation to the union of the configured functions' spans
/// (spec §4.6). With no functions configured, counting is always enabled.
#[derive(Debug, Default)]
pub struct FunctionMonitor {
    functions: Vec<(String, MonitoredFunction)>,
    /// Current nesting depth across all monitored functions combined.
    depth: u32,
}

impl FunctionMonitor {
    /// Build a monitor from the configured function names and their
    /// resolved sites. Names the host could not resolve are dropped
    /// (spec §6 interface (h), "silently ignored").
    pub fn new(names: &[String], sites: &[Option<FunctionSite>]) -> Self {
        let functions = names
            .iter()
            .zip(sites.iter())
            .filter_map(|(name, site)| {
                site.map(|site| {
                    (
                        name.clone(),
                        MonitoredFunction {
                            site,
                            entries: 0,
                        },
                    )
                })
            })
            .collect();
        FunctionMonitor {
            functions,
            depth: 0,
        }
    }

    /// `true` iff counting should advance right now: no functions
    /// configured at all, or currently nested inside at least one.
    pub fn enabled(&self) -> bool {
        self.functions.is_empty() || self.depth > 0
    }

    /// Current nesting depth, exposed for diagnostics and tests.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Does `addr` match a configured function's entry point? Returns the
    /// function name and its post-increment entry count for the log record.
    pub fn enter(&mut self, addr: Addr) -> Option<(&str, u64)> {
        for (name, f) in &mut self.functions {
            if f.site.entry == addr {
                f.entries += 1;
                self.depth = self.depth.saturating_add(1);
                return Some((name.as_str(), f.entries));
            }
        }
        None
    }

    /// Does `addr` match a configured function's exit point?
    pub fn leave(&mut self, addr: Addr) -> Option<&str> {
        for (name, f) in &self.functions {
            if f.site.exit == addr {
                self.depth = self.depth.saturating_sub(1);
                return Some(name.as_str());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(entry: Addr, exit: Addr) -> FunctionSite {
        FunctionSite { entry, exit }
    }

    #[test]
    fn no_functions_configured_is_always_enabled() {
        let monitor = FunctionMonitor::new(&[], &[]);
        assert!(monitor.enabled());
    }

    #[test]
    fn disabled_until_first_entry_then_enabled_until_matching_leave() {
        let mut monitor = FunctionMonitor::new(
            &["work".to_string()],
            &[Some(site(0x1000, 0x1100))],
        );
        assert!(!monitor.enabled());

        assert_eq!(monitor.enter(0x1000), Some(("work", 1)));
        assert!(monitor.enabled());

        assert_eq!(monitor.leave(0x1100), Some("work"));
        assert!(!monitor.enabled());
    }

    #[test]
    fn nested_entries_stay_enabled_until_every_leave_unwinds() {
        let mut monitor = FunctionMonitor::new(
            &["work".to_string()],
            &[Some(site(0x1000, 0x1100))],
        );

        monitor.enter(0x1000);
        monitor.enter(0x1000); // recursive call
        assert_eq!(monitor.depth(), 2);
        assert!(monitor.enabled());

        monitor.leave(0x1100);
        assert!(monitor.enabled(), "outer call is still active");

        monitor.leave(0x1100);
        assert!(!monitor.enabled());
    }

    #[test]
    fn leave_never_underflows_depth() {
        let mut monitor = FunctionMonitor::new(
            &["work".to_string()],
            &[Some(site(0x1000, 0x1100))],
        );
        monitor.leave(0x1100);
        monitor.leave(0x1100);
        assert_eq!(monitor.depth(), 0);
        assert!(!monitor.enabled());
    }

    #[test]
    fn unresolved_functions_are_dropped_silently() {
        let monitor = FunctionMonitor::new(&["missing".to_string()], &[None]);
        assert!(monitor.enabled(), "no resolved functions means always-on");
    }
}
