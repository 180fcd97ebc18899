//! In-memory call accounting for the probe currently running.

use std::collections::HashMap;

/// Per-subsystem call counters plus the diagnostic cache.
///
/// Counters exist only in the process executing the workload and are reset at
/// the start of every probe; durable search state never includes them. The
/// diagnostic cache holds caller-supplied context for call ordinals near the
/// bisection boundary and is cleared by the same reset.
#[derive(Debug, Default)]
pub struct CallCounters {
    counts: HashMap<String, u64>,
    diagnostics: HashMap<u64, String>,
}

impl CallCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one guarded call and return its 0-based ordinal.
    pub fn record_call(&mut self, subsystem: &str) -> u64 {
        let count = self.counts.entry(subsystem.to_string()).or_insert(0);
        let ordinal = *count;
        *count += 1;
        ordinal
    }

    /// Calls recorded for `subsystem` so far in this probe.
    pub fn call_count(&self, subsystem: &str) -> u64 {
        self.counts.get(subsystem).copied().unwrap_or(0)
    }

    /// Zero every counter and drop cached diagnostics.
    pub fn reset(&mut self) {
        self.counts.clear();
        self.diagnostics.clear();
    }

    pub fn record_diagnostic(&mut self, ordinal: u64, text: String) {
        self.diagnostics.insert(ordinal, text);
    }

    pub fn diagnostic(&self, ordinal: u64) -> Option<&str> {
        self.diagnostics.get(&ordinal).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_call_returns_zero_based_ordinals() {
        let mut counters = CallCounters::new();
        assert_eq!(counters.record_call("lowerings"), 0);
        assert_eq!(counters.record_call("lowerings"), 1);
        assert_eq!(counters.record_call("lowerings"), 2);
        assert_eq!(counters.call_count("lowerings"), 3);
    }

    #[test]
    fn subsystems_count_independently() {
        let mut counters = CallCounters::new();
        counters.record_call("a");
        counters.record_call("a");
        assert_eq!(counters.record_call("b"), 0);
        assert_eq!(counters.call_count("a"), 2);
        assert_eq!(counters.call_count("b"), 1);
    }

    #[test]
    fn call_count_does_not_mutate() {
        let counters = CallCounters::new();
        assert_eq!(counters.call_count("never_seen"), 0);
        assert_eq!(counters.call_count("never_seen"), 0);
    }

    /// One reset must clear both counters and diagnostics; a stale diagnostic
    /// from a previous probe would be attributed to the wrong call.
    #[test]
    fn reset_clears_counts_and_diagnostics() {
        let mut counters = CallCounters::new();
        counters.record_call("a");
        counters.record_diagnostic(0, "node: add_3".to_string());
        counters.reset();
        assert_eq!(counters.call_count("a"), 0);
        assert!(counters.diagnostic(0).is_none());
    }

    #[test]
    fn diagnostics_are_keyed_by_ordinal() {
        let mut counters = CallCounters::new();
        counters.record_diagnostic(4, "node: relu_4".to_string());
        assert_eq!(counters.diagnostic(4), Some("node: relu_4"));
        assert!(counters.diagnostic(3).is_none());
    }
}
